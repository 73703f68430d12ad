//! Environment-variable parsing shared by the client and supervisor configs.
//!
//! Every config struct exposes `from_env()` for production and
//! `from_lookup()` for tests, so tests never mutate the process
//! environment.

use std::str::FromStr;

/// A configuration variable was present but could not be parsed.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} must be a valid {expected}, got {value:?}")]
    Invalid {
        var: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Read `var` through `lookup` and parse it, falling back to `default`
/// when unset or blank.
pub fn parse_or<T, F>(
    lookup: &F,
    var: &'static str,
    default: T,
    expected: &'static str,
) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        Some(raw) if !raw.trim().is_empty() => {
            raw.trim().parse().map_err(|_| ConfigError::Invalid {
                var,
                expected,
                value: raw,
            })
        }
        _ => Ok(default),
    }
}

/// Read a string variable, falling back to `default` when unset or blank.
pub fn string_or<F>(lookup: &F, var: &str, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(var)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Lookup function backed by the real process environment.
pub fn process_env(var: &str) -> Option<String> {
    std::env::var(var).ok()
}
