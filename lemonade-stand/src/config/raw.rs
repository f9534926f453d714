// Raw YAML deserialization types (internal)
// These are separate from the public Config structs because:
// 1. Interpolation and port parsing happen between raw and public
// 2. Detection rules are compiled into `CompiledPattern`, which is not Deserialize
// 3. Keeps the public API free of optional-everything fields

use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfig {
    pub upstream: RawUpstreamConfig,
    pub system_prompt_file: Option<String>,
    pub streaming: Option<RawStreamingConfig>,
    pub rules: Option<RawRulesConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawUpstreamConfig {
    pub scheme: Option<String>,
    pub host: String,
    pub port: RawPort,
    pub path: Option<String>,
    pub model: String,
    pub api_key: Option<String>,
    pub verify_tls: Option<bool>,
    pub timeout_ms: Option<u64>,
}

/// Ports may be written as a number or as an interpolated string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RawPort {
    Number(u64),
    Text(String),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawStreamingConfig {
    pub char_delay_ms: Option<u64>,
    pub max_message_chars: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawRulesConfig {
    /// If false, skip the embedded default rules. Default: true.
    pub use_default_rules: Option<bool>,
    #[serde(default)]
    pub extra_rules: Vec<String>,
}
