// Copyright 2026 The Lemonade Stand Project
// SPDX-License-Identifier: Apache-2.0

use std::path::Path;

use reqwest::header::HeaderValue;

use super::defaults::{default_detection_rules, DEFAULT_SYSTEM_PROMPT};
use super::error::ConfigError;
use super::interpolation::resolve_variables;
use super::pattern::{compile_rules, rules_fingerprint};
use super::raw;
use super::source::ConfigSource;
use super::types::*;

const DEFAULT_PATH: &str = "/api/v2/chat/completions-detection";
const DEFAULT_TIMEOUT_MS: u64 = 120_000;
const DEFAULT_CHAR_DELAY_MS: u64 = 5;

/// Load and validate the relay config from the given source.
///
/// Steps:
/// 1. Read raw YAML from source
/// 2. Parse YAML into raw deserialization types
/// 3. Resolve variable interpolation in string fields
/// 4. Validate upstream address, timeouts and credentials
/// 5. Resolve the system prompt (mounted file, else built-in default)
/// 6. Compile detection rules (defaults first, then extra rules)
/// 7. Build typed Config struct
pub fn load_config(source: &dyn ConfigSource) -> Result<Config, ConfigError> {
    let raw_yaml = source.load()?;
    let raw: raw::RawConfig = serde_yaml::from_str(&raw_yaml)?;

    let upstream = build_upstream(raw.upstream)?;

    let system_prompt = match raw.system_prompt_file {
        Some(path) => load_system_prompt(Path::new(&resolve_variables(&path)?))?,
        None => DEFAULT_SYSTEM_PROMPT.to_string(),
    };

    let streaming = raw
        .streaming
        .map(|s| StreamingConfig {
            char_delay_ms: s.char_delay_ms.unwrap_or(DEFAULT_CHAR_DELAY_MS),
            max_message_chars: s.max_message_chars,
        })
        .unwrap_or(StreamingConfig {
            char_delay_ms: DEFAULT_CHAR_DELAY_MS,
            max_message_chars: None,
        });
    if streaming.max_message_chars == Some(0) {
        return Err(ConfigError::Validation(
            "streaming.max_message_chars must be greater than 0".to_string(),
        ));
    }

    let (use_defaults, extra_rules) = match raw.rules {
        Some(r) => (r.use_default_rules != Some(false), r.extra_rules),
        None => (true, Vec::new()),
    };
    let mut rules = if use_defaults {
        default_detection_rules()
    } else {
        Vec::new()
    };
    rules.extend(compile_rules(&extra_rules)?);
    if rules.is_empty() {
        return Err(ConfigError::Validation(
            "no detection rules configured: enable use_default_rules or add extra_rules"
                .to_string(),
        ));
    }
    let rules_hash = rules_fingerprint(&rules);

    Ok(Config {
        upstream,
        system_prompt,
        streaming,
        rules,
        rules_hash,
    })
}

/// Read the system prompt file verbatim, or fall back to the built-in prompt
/// when the file does not exist.
pub fn load_system_prompt(path: &Path) -> Result<String, ConfigError> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "system prompt file not found, using default");
        return Ok(DEFAULT_SYSTEM_PROMPT.to_string());
    }
    std::fs::read_to_string(path).map_err(|source| ConfigError::SystemPrompt {
        path: path.to_path_buf(),
        source,
    })
}

fn build_upstream(raw: raw::RawUpstreamConfig) -> Result<UpstreamConfig, ConfigError> {
    let scheme = match raw.scheme.as_deref().map(resolve_variables).transpose()? {
        None => Scheme::Https,
        Some(s) => parse_scheme(&s)?,
    };

    let host = resolve_variables(&raw.host)?.trim().to_string();
    if host.is_empty() {
        return Err(ConfigError::Validation("upstream.host must not be empty".to_string()));
    }

    let port = parse_port(raw.port)?;

    let path = match raw.path {
        Some(p) => resolve_variables(&p)?,
        None => DEFAULT_PATH.to_string(),
    };
    if !path.starts_with('/') {
        return Err(ConfigError::Validation(format!(
            "upstream.path must start with '/', got \"{path}\""
        )));
    }

    let model = resolve_variables(&raw.model)?;
    if model.trim().is_empty() {
        return Err(ConfigError::Validation("upstream.model must not be empty".to_string()));
    }

    let api_key = match raw.api_key {
        Some(k) => Some(resolve_variables(&k)?).filter(|k| !k.is_empty()),
        None => None,
    };
    if let Some(key) = &api_key {
        if HeaderValue::from_str(&format!("Bearer {key}")).is_err() {
            return Err(ConfigError::Validation(
                "upstream.api_key contains characters not allowed in an HTTP header".to_string(),
            ));
        }
    }

    let timeout_ms = raw.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS);
    if timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "upstream.timeout_ms must be greater than 0".to_string(),
        ));
    }

    Ok(UpstreamConfig {
        scheme,
        host,
        port,
        path,
        model,
        api_key,
        verify_tls: raw.verify_tls.unwrap_or(true),
        timeout_ms,
    })
}

fn parse_scheme(s: &str) -> Result<Scheme, ConfigError> {
    match s {
        "http" => Ok(Scheme::Http),
        "https" => Ok(Scheme::Https),
        other => Err(ConfigError::Validation(format!(
            "invalid upstream.scheme \"{other}\": must be \"http\" or \"https\""
        ))),
    }
}

fn parse_port(raw: raw::RawPort) -> Result<u16, ConfigError> {
    let text = match raw {
        raw::RawPort::Number(n) => n.to_string(),
        raw::RawPort::Text(t) => resolve_variables(&t)?,
    };
    match text.trim().parse::<u16>() {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(ConfigError::Validation(format!(
            "invalid upstream.port \"{text}\": must be 1-65535"
        ))),
    }
}
