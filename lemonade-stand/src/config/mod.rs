// Copyright 2026 The Lemonade Stand Project
// SPDX-License-Identifier: Apache-2.0

// Relay configuration
//
// Loads the relay YAML (a file, or the embedded environment-driven
// default), resolves ${VAR} interpolation, validates the upstream
// address, resolves the system prompt and compiles detection rules.

mod defaults;
mod error;
mod interpolation;
mod loader;
mod pattern;
mod raw;
mod source;
mod types;

pub use defaults::{default_detection_rules, DEFAULT_CONFIG_YAML, DEFAULT_SYSTEM_PROMPT};
pub use error::ConfigError;
pub use interpolation::resolve_variables;
pub use loader::{load_config, load_system_prompt};
pub use pattern::{compile_rules, rules_fingerprint, CompiledPattern};
pub use source::{ConfigSource, EmbeddedSource, FileSource, StringSource};
pub use types::{Config, Scheme, StreamingConfig, UpstreamConfig};

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
