// Copyright 2026 The Lemonade Stand Project
// SPDX-License-Identifier: Apache-2.0

// Streaming moderation
//
// Responsibilities:
// - Frame the upstream SSE body into `data:` lines
// - Decode each event and count its detections
// - Ask the blocking policy whether the turn must be suppressed
// - Type out accepted content one character at a time
// - End every turn with exactly one outcome

mod policy;
mod processor;
mod types;

pub use policy::{BlockingPolicy, WarningGatedPolicy, EMPTY_CHOICES_REASON, NON_ENGLISH_REASON};
pub use processor::{ByteStream, ModerationProcessor};
pub use types::{
    BlockDecision, Pacing, StreamOutcome, StreamUpdate, TurnError, APOLOGY, EMPTY_RESPONSE,
};
