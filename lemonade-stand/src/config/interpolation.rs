use super::error::ConfigError;

/// Resolves `${VAR_NAME}` and `${VAR_NAME:-fallback}` references in a string
/// from environment variables.
///
/// A bare reference to an unset variable returns
/// `ConfigError::UndefinedVariable`; the `:-` form substitutes the fallback
/// when the variable is unset or empty.
pub fn resolve_variables(input: &str) -> Result<String, ConfigError> {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut reference = String::new();
            let mut found_close = false;
            for c in chars.by_ref() {
                if c == '}' {
                    found_close = true;
                    break;
                }
                reference.push(c);
            }
            if !found_close || reference.is_empty() {
                // Malformed interpolation -- treat literally
                result.push('$');
                result.push('{');
                result.push_str(&reference);
                continue;
            }
            result.push_str(&lookup(&reference)?);
        } else {
            result.push(ch);
        }
    }

    Ok(result)
}

fn lookup(reference: &str) -> Result<String, ConfigError> {
    match reference.split_once(":-") {
        Some((name, fallback)) => match std::env::var(name) {
            Ok(value) if !value.is_empty() => Ok(value),
            _ => Ok(fallback.to_string()),
        },
        None => std::env::var(reference).map_err(|_| ConfigError::UndefinedVariable {
            name: reference.to_string(),
        }),
    }
}
