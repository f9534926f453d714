// Copyright 2026 The Lemonade Stand Project
// SPDX-License-Identifier: Apache-2.0

// Outbound detector configuration
//
// The `detectors` object of a completion request. Both directions run
// hap, regex_competitor and language_detection; prompt_injection only
// runs on input. The regex list is the compiled rule set in config order.

use serde::Serialize;

use crate::config::CompiledPattern;
use crate::event::Direction;

/// Marker for detectors that take no parameters (`{}` on the wire).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EmptyParams {}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegexParams {
    pub regex: Vec<String>,
}

/// Detectors enabled for one direction. Field order is wire order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DirectionDetectors {
    pub hap: EmptyParams,
    pub regex_competitor: RegexParams,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_injection: Option<EmptyParams>,
    pub language_detection: EmptyParams,
}

impl DirectionDetectors {
    fn for_direction(direction: Direction, patterns: &[String]) -> Self {
        Self {
            hap: EmptyParams {},
            regex_competitor: RegexParams {
                regex: patterns.to_vec(),
            },
            prompt_injection: match direction {
                Direction::Input => Some(EmptyParams {}),
                Direction::Output => None,
            },
            language_detection: EmptyParams {},
        }
    }
}

/// Two-sided detector configuration sent with every turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectorConfig {
    pub input: DirectionDetectors,
    pub output: DirectionDetectors,
}

impl DetectorConfig {
    /// Build the configuration from compiled rules. Built once at startup
    /// and shared by every turn.
    pub fn from_rules(rules: &[CompiledPattern]) -> Self {
        let patterns: Vec<String> = rules.iter().map(|r| r.as_str().to_string()).collect();
        Self {
            input: DirectionDetectors::for_direction(Direction::Input, &patterns),
            output: DirectionDetectors::for_direction(Direction::Output, &patterns),
        }
    }

    pub fn rule_count(&self) -> usize {
        self.input.regex_competitor.regex.len()
    }
}
