// Copyright 2026 The Lemonade Stand Project
// SPDX-License-Identifier: Apache-2.0

// Blocking policy
//
// Decides per detection event whether the turn must be suppressed.

use super::types::BlockDecision;
use crate::event::{DetectionEvent, DetectorId, Direction};

pub const NON_ENGLISH_REASON: &str = "non-English response detected";
pub const EMPTY_CHOICES_REASON: &str = "API returned empty choices";

/// Evaluates one parsed event. Injected into the processor so tests and
/// deployments can swap the rule set.
pub trait BlockingPolicy: Send + Sync {
    fn evaluate(&self, event: &DetectionEvent) -> BlockDecision;
}

/// Warnings gate the detector check: only directions named by an
/// `UNSUITABLE_INPUT`/`UNSUITABLE_OUTPUT` warning are inspected.
///
/// Inside an inspected direction, a critical detector blocks regardless of
/// score, and `language_detection` blocks on output above the threshold.
/// Every matching result overwrites the reason, so the last match is
/// reported. Independently, an event with warnings but no choices blocks.
#[derive(Debug, Clone, Copy)]
pub struct WarningGatedPolicy {
    /// Scores strictly above this block a non-English response.
    pub language_threshold: f64,
}

impl Default for WarningGatedPolicy {
    fn default() -> Self {
        Self {
            language_threshold: 0.8,
        }
    }
}

impl BlockingPolicy for WarningGatedPolicy {
    fn evaluate(&self, event: &DetectionEvent) -> BlockDecision {
        let mut reason: Option<String> = None;

        for warning in &event.warnings {
            let Some(direction) = warning.kind.direction() else {
                continue;
            };
            for group in event.detections.for_direction(direction) {
                for result in &group.results {
                    match result.detector() {
                        Some(DetectorId::LanguageDetection)
                            if direction == Direction::Output
                                && result.score_or_zero() > self.language_threshold =>
                        {
                            reason = Some(NON_ENGLISH_REASON.to_string());
                        }
                        Some(detector) if detector.is_critical() => {
                            reason = Some(format!("{detector} detected"));
                        }
                        _ => {}
                    }
                }
            }
        }

        if event.choices.is_empty() && !event.warnings.is_empty() && reason.is_none() {
            reason = Some(EMPTY_CHOICES_REASON.to_string());
        }

        match reason {
            Some(reason) => BlockDecision::Block(reason),
            None => BlockDecision::Allow,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evaluate(payload: &str) -> BlockDecision {
        WarningGatedPolicy::default().evaluate(&DetectionEvent::parse(payload).unwrap())
    }

    #[test]
    fn non_english_output_blocks() {
        let decision = evaluate(
            r#"{"warnings":[{"type":"UNSUITABLE_OUTPUT"}],
                "detections":{"output":[{"results":[{"detector_id":"language_detection","score":0.95}]}]},
                "choices":[{"delta":{"content":"Hola"}}]}"#,
        );
        assert_eq!(decision, BlockDecision::Block(NON_ENGLISH_REASON.to_string()));
    }

    #[test]
    fn language_score_at_threshold_passes() {
        let decision = evaluate(
            r#"{"warnings":[{"type":"UNSUITABLE_OUTPUT"}],
                "detections":{"output":[{"results":[{"detector_id":"language_detection","score":0.8}]}]},
                "choices":[{"delta":{"content":"Hola"}}]}"#,
        );
        assert_eq!(decision, BlockDecision::Allow);
    }

    #[test]
    fn language_detection_on_input_never_blocks_by_itself() {
        let decision = evaluate(
            r#"{"warnings":[{"type":"UNSUITABLE_INPUT"}],
                "detections":{"input":[{"results":[{"detector_id":"language_detection","score":0.99}]}]},
                "choices":[{"delta":{"content":"ok"}}]}"#,
        );
        assert_eq!(decision, BlockDecision::Allow);
    }

    #[test]
    fn critical_detector_blocks_regardless_of_score() {
        let decision = evaluate(
            r#"{"warnings":[{"type":"UNSUITABLE_INPUT"}],
                "detections":{"input":[{"results":[{"detector_id":"hap","score":0.01}]}]},
                "choices":[{"delta":{"content":"x"}}]}"#,
        );
        assert_eq!(decision, BlockDecision::Block("hap detected".to_string()));
    }

    #[test]
    fn last_matching_detector_wins() {
        let decision = evaluate(
            r#"{"warnings":[{"type":"UNSUITABLE_INPUT"}],
                "detections":{"input":[
                    {"results":[{"detector_id":"hap"},{"detector_id":"regex_competitor"}]},
                    {"results":[{"detector_id":"prompt_injection"},{"detector_id":"granite"}]}
                ]},
                "choices":[{"delta":{"content":"x"}}]}"#,
        );
        assert_eq!(
            decision,
            BlockDecision::Block("prompt_injection detected".to_string())
        );
    }

    #[test]
    fn warning_only_inspects_its_own_direction() {
        let decision = evaluate(
            r#"{"warnings":[{"type":"UNSUITABLE_OUTPUT"}],
                "detections":{"input":[{"results":[{"detector_id":"hap","score":0.99}]}]},
                "choices":[{"delta":{"content":"x"}}]}"#,
        );
        assert_eq!(decision, BlockDecision::Allow);
    }

    #[test]
    fn detections_without_warnings_never_block() {
        let decision = evaluate(
            r#"{"detections":{"input":[{"results":[{"detector_id":"hap","score":0.99}]}],
                              "output":[{"results":[{"detector_id":"language_detection","score":0.99}]}]},
                "choices":[{"delta":{"content":"x"}}]}"#,
        );
        assert_eq!(decision, BlockDecision::Allow);
    }

    #[test]
    fn empty_choices_with_warning_blocks() {
        let decision = evaluate(
            r#"{"warnings":[{"type":"UNSUITABLE_INPUT"}],
                "detections":{"input":[{"results":[{"detector_id":"granite","score":0.99}]}]},
                "choices":[]}"#,
        );
        assert_eq!(decision, BlockDecision::Block(EMPTY_CHOICES_REASON.to_string()));
    }

    #[test]
    fn empty_choices_trigger_ignores_warning_type() {
        let decision = evaluate(r#"{"warnings":[{"type":"SOMETHING_ELSE"}]}"#);
        assert_eq!(decision, BlockDecision::Block(EMPTY_CHOICES_REASON.to_string()));
    }

    #[test]
    fn detector_reason_takes_precedence_over_empty_choices() {
        let decision = evaluate(
            r#"{"warnings":[{"type":"UNSUITABLE_INPUT"}],
                "detections":{"input":[{"results":[{"detector_id":"regex_competitor","score":1.0}]}]},
                "choices":[]}"#,
        );
        assert_eq!(
            decision,
            BlockDecision::Block("regex_competitor detected".to_string())
        );
    }

    #[test]
    fn empty_choices_without_warnings_passes() {
        assert_eq!(evaluate(r#"{"choices":[]}"#), BlockDecision::Allow);
        assert_eq!(evaluate("{}"), BlockDecision::Allow);
    }

    #[test]
    fn threshold_is_configurable() {
        let policy = WarningGatedPolicy {
            language_threshold: 0.5,
        };
        let event = DetectionEvent::parse(
            r#"{"warnings":[{"type":"UNSUITABLE_OUTPUT"}],
                "detections":{"output":[{"results":[{"detector_id":"language_detection","score":0.6}]}]},
                "choices":[{"delta":{"content":"x"}}]}"#,
        )
        .unwrap();
        assert!(policy.evaluate(&event).is_block());
    }
}
