// Copyright 2026 The Lemonade Stand Project
// SPDX-License-Identifier: Apache-2.0

// Stream types
//
// Block decisions, per-turn outcomes, the updates a moderation stream
// yields, turn failures and output pacing.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Caller-facing texts
// ---------------------------------------------------------------------------

/// Replaces all output of a suppressed turn.
pub const APOLOGY: &str =
    "I'm sorry I can't help with that. Is there anything else I can help you with?";

/// Shown when the upstream finished without content or a block.
pub const EMPTY_RESPONSE: &str = "No response received from the model.";

// ---------------------------------------------------------------------------
// Block decision
// ---------------------------------------------------------------------------

/// Verdict of the blocking policy for a single detection event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockDecision {
    Allow,
    /// Suppress the turn, with the reason logged and reported in the outcome.
    Block(String),
}

impl BlockDecision {
    pub fn is_block(&self) -> bool {
        matches!(self, BlockDecision::Block(_))
    }
}

// ---------------------------------------------------------------------------
// Turn failures
// ---------------------------------------------------------------------------

/// Why a turn failed before reaching a normal end. `Display` is the text
/// shown to the user after "Error: ".
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TurnError {
    #[error("Could not connect to the API at {endpoint}")]
    Connect { endpoint: String, detail: String },

    #[error("Request timed out")]
    Timeout(String),

    /// Upstream answered with a non-2xx status.
    #[error("{status} {detail}")]
    Status { status: u16, detail: String },

    #[error("{0}")]
    Transport(String),

    /// The response body broke off mid-stream.
    #[error("response stream interrupted: {0}")]
    Stream(String),
}

impl TurnError {
    /// Short machine-readable kind for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            TurnError::Connect { .. } => "connect",
            TurnError::Timeout(_) => "timeout",
            TurnError::Status { .. } => "status",
            TurnError::Transport(_) => "transport",
            TurnError::Stream(_) => "stream",
        }
    }
}

// ---------------------------------------------------------------------------
// Outcome and updates
// ---------------------------------------------------------------------------

/// Terminal result of one turn. Exactly one per turn.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamOutcome {
    Suppressed { reason: String },
    Completed(String),
    Empty,
    Failed(TurnError),
}

impl StreamOutcome {
    /// The string that replaces everything the caller has shown so far,
    /// or `None` when the last partial fragment already is the answer.
    pub fn terminal_fragment(&self) -> Option<String> {
        match self {
            StreamOutcome::Suppressed { .. } => Some(APOLOGY.to_string()),
            StreamOutcome::Completed(_) => None,
            StreamOutcome::Empty => Some(EMPTY_RESPONSE.to_string()),
            StreamOutcome::Failed(err) => Some(format!("Error: {err}")),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StreamOutcome::Suppressed { .. } => "suppressed",
            StreamOutcome::Completed(_) => "completed",
            StreamOutcome::Empty => "empty",
            StreamOutcome::Failed(_) => "failed",
        }
    }
}

/// One item of a moderation stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamUpdate {
    /// Full accumulated text so far.
    Partial(String),
    /// Always the last item.
    Finished(StreamOutcome),
}

impl StreamUpdate {
    /// The caller-visible string for this update, if any.
    pub fn fragment(&self) -> Option<String> {
        match self {
            StreamUpdate::Partial(text) => Some(text.clone()),
            StreamUpdate::Finished(outcome) => outcome.terminal_fragment(),
        }
    }
}

// ---------------------------------------------------------------------------
// Pacing
// ---------------------------------------------------------------------------

/// Delay applied before each typed character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pacing {
    per_char: Duration,
}

impl Pacing {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn per_char(delay: Duration) -> Self {
        Self { per_char: delay }
    }

    pub fn delay(&self) -> Duration {
        self.per_char
    }

    pub fn is_disabled(&self) -> bool {
        self.per_char.is_zero()
    }
}
