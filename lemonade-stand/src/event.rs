// Copyright 2026 The Lemonade Stand Project
// SPDX-License-Identifier: Apache-2.0

// Detection event model
//
// Typed view of one `data:` payload from the detection-augmented
// completion API. Decoding is lenient: unknown fields are ignored,
// missing or null collections become empty, a missing score reads as 0.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Direction
// ---------------------------------------------------------------------------

/// Which side of the conversation a detection applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// The user's message.
    Input,
    /// The model's generated response.
    Output,
}

impl Direction {
    /// Both directions, in exposition order.
    pub const ALL: [Direction; 2] = [Direction::Input, Direction::Output];

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Input => "input",
            Direction::Output => "output",
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Direction::Input => 0,
            Direction::Output => 1,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Known detectors
// ---------------------------------------------------------------------------

/// Detectors the relay configures upstream and counts in metrics.
///
/// Results carrying any other `detector_id` are still inspected by the
/// blocking policy but never counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DetectorId {
    Hap,
    RegexCompetitor,
    PromptInjection,
    LanguageDetection,
}

impl DetectorId {
    /// All known detectors, in exposition order.
    pub const ALL: [DetectorId; 4] = [
        DetectorId::Hap,
        DetectorId::RegexCompetitor,
        DetectorId::PromptInjection,
        DetectorId::LanguageDetection,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DetectorId::Hap => "hap",
            DetectorId::RegexCompetitor => "regex_competitor",
            DetectorId::PromptInjection => "prompt_injection",
            DetectorId::LanguageDetection => "language_detection",
        }
    }

    /// Look up a detector by its wire id. Returns `None` for unknown ids.
    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.as_str() == id)
    }

    /// Critical detectors suppress a flagged response regardless of score.
    pub fn is_critical(self) -> bool {
        matches!(
            self,
            DetectorId::Hap | DetectorId::PromptInjection | DetectorId::RegexCompetitor
        )
    }

    pub(crate) fn index(self) -> usize {
        match self {
            DetectorId::Hap => 0,
            DetectorId::RegexCompetitor => 1,
            DetectorId::PromptInjection => 2,
            DetectorId::LanguageDetection => 3,
        }
    }
}

impl fmt::Display for DetectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Event payload
// ---------------------------------------------------------------------------

/// One decoded upstream SSE payload.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DetectionEvent {
    #[serde(default, deserialize_with = "nullable")]
    pub warnings: Vec<Warning>,
    #[serde(default, deserialize_with = "nullable")]
    pub detections: Detections,
    #[serde(default, deserialize_with = "nullable")]
    pub choices: Vec<Choice>,
}

impl DetectionEvent {
    /// Decode a single `data:` payload.
    pub fn parse(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }
}

/// Detection groups keyed by direction.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Detections {
    #[serde(default, deserialize_with = "nullable")]
    pub input: Vec<DetectionGroup>,
    #[serde(default, deserialize_with = "nullable")]
    pub output: Vec<DetectionGroup>,
}

impl Detections {
    pub fn for_direction(&self, direction: Direction) -> &[DetectionGroup] {
        match direction {
            Direction::Input => &self.input,
            Direction::Output => &self.output,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DetectionGroup {
    #[serde(default, deserialize_with = "nullable")]
    pub results: Vec<DetectionResult>,
}

/// A single detector verdict inside a detection group.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DetectionResult {
    #[serde(default, deserialize_with = "nullable")]
    pub detector_id: String,
    #[serde(default)]
    pub score: Option<f64>,
}

impl DetectionResult {
    pub fn new(detector_id: impl Into<String>, score: Option<f64>) -> Self {
        Self {
            detector_id: detector_id.into(),
            score,
        }
    }

    /// The known detector this result came from, if any.
    pub fn detector(&self) -> Option<DetectorId> {
        DetectorId::from_id(&self.detector_id)
    }

    pub fn score_or_zero(&self) -> f64 {
        self.score.unwrap_or(0.0)
    }
}

/// Upstream warning attached to an event.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Warning {
    #[serde(rename = "type", default)]
    pub kind: WarningKind,
    #[serde(default, deserialize_with = "nullable")]
    pub message: String,
}

/// Warning type. Only the two "unsuitable" kinds gate the detector check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "Option<String>")]
pub enum WarningKind {
    UnsuitableInput,
    UnsuitableOutput,
    #[default]
    Unspecified,
    Other(String),
}

impl WarningKind {
    /// The direction whose detections explain this warning.
    pub fn direction(&self) -> Option<Direction> {
        match self {
            WarningKind::UnsuitableInput => Some(Direction::Input),
            WarningKind::UnsuitableOutput => Some(Direction::Output),
            _ => None,
        }
    }
}

impl From<Option<String>> for WarningKind {
    fn from(value: Option<String>) -> Self {
        match value.as_deref() {
            None | Some("") => WarningKind::Unspecified,
            Some("UNSUITABLE_INPUT") => WarningKind::UnsuitableInput,
            Some("UNSUITABLE_OUTPUT") => WarningKind::UnsuitableOutput,
            Some(other) => WarningKind::Other(other.to_string()),
        }
    }
}

/// One completion choice. Only the incremental delta text is used.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Choice {
    #[serde(default, deserialize_with = "nullable")]
    pub delta: Delta,
}

impl Choice {
    pub fn content(&self) -> &str {
        self.delta.content.as_deref().unwrap_or("")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Delta {
    #[serde(default)]
    pub content: Option<String>,
}

/// Treat an explicit JSON `null` like a missing field.
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
