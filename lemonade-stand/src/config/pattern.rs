use std::fmt;

use regex::Regex;
use sha2::{Digest, Sha256};

use super::error::ConfigError;

/// A pre-compiled detection rule. Wraps `regex::Regex` with the original
/// pattern string preserved, since the upstream detector receives the
/// pattern text, not the compiled form.
#[derive(Clone)]
pub struct CompiledPattern {
    pub pattern: String,
    pub regex: Regex,
}

impl CompiledPattern {
    /// Compile a regex pattern, returning `ConfigError::InvalidRegex` on failure.
    pub fn compile(pattern: &str) -> Result<Self, ConfigError> {
        let regex = Regex::new(pattern).map_err(|e| ConfigError::InvalidRegex {
            pattern: pattern.to_string(),
            source: e,
        })?;
        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    #[cfg(test)]
    pub(crate) fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

impl fmt::Debug for CompiledPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledPattern")
            .field("pattern", &self.pattern)
            .finish()
    }
}

impl PartialEq for CompiledPattern {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern
    }
}

/// Compile an ordered list of rule strings, failing on the first bad one.
pub fn compile_rules<I, S>(patterns: I) -> Result<Vec<CompiledPattern>, ConfigError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    patterns
        .into_iter()
        .map(|p| CompiledPattern::compile(p.as_ref()))
        .collect()
}

/// Deterministic fingerprint of an ordered rule list: "sha256:{hex}".
pub fn rules_fingerprint(rules: &[CompiledPattern]) -> String {
    let mut hasher = Sha256::new();
    for rule in rules {
        hasher.update(rule.pattern.as_bytes());
        hasher.update(b"\n");
    }
    format!("sha256:{:x}", hasher.finalize())
}
