// Copyright 2026 The Lemonade Stand Project
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::time::Duration;

use crate::stream::Pacing;

use super::pattern::CompiledPattern;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Fully resolved relay configuration.
#[derive(Debug)]
pub struct Config {
    /// Where and how to reach the detection-augmented completion API.
    pub upstream: UpstreamConfig,
    /// System instruction sent ahead of every user message.
    pub system_prompt: String,
    /// Output pacing and message limits.
    pub streaming: StreamingConfig,
    /// Ordered detection rules for the regex_competitor detector.
    pub rules: Vec<CompiledPattern>,
    /// SHA256 fingerprint of `rules`: "sha256:{hex}".
    pub rules_hash: String,
}

// ---------------------------------------------------------------------------
// Upstream
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheme::Http => f.write_str("http"),
            Scheme::Https => f.write_str("https"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
    /// Request path, always starting with '/'.
    pub path: String,
    pub model: String,
    /// Bearer token. `None` means no Authorization header.
    pub api_key: Option<String>,
    /// When false, self-signed upstream certificates are accepted.
    pub verify_tls: bool,
    /// Connect and per-read timeout in milliseconds.
    pub timeout_ms: u64,
}

impl UpstreamConfig {
    pub fn endpoint(&self) -> String {
        format!("{}://{}:{}{}", self.scheme, self.host, self.port, self.path)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

// ---------------------------------------------------------------------------
// Streaming
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct StreamingConfig {
    /// Delay before each typed character. 0 disables pacing.
    pub char_delay_ms: u64,
    /// Messages longer than this many characters are refused.
    pub max_message_chars: Option<usize>,
}

impl StreamingConfig {
    pub fn pacing(&self) -> Pacing {
        Pacing::per_char(Duration::from_millis(self.char_delay_ms))
    }
}
