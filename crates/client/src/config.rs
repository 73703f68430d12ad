//! Client and tracker configuration loaded from environment variables.

use std::time::Duration;

use reqwest::Url;
use wmark_core::env::{parse_or, process_env, string_or, ConfigError};

use crate::api::DEFAULT_REQUEST_TIMEOUT;

/// Default interval between two status polls of the same job.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);

/// Where the export service lives and how long a request may take.
///
/// | Env var             | Default     |
/// |---------------------|-------------|
/// | `BACKEND_HOST`      | `127.0.0.1` |
/// | `BACKEND_PORT`      | `8080`      |
/// | `HTTP_TIMEOUT_SECS` | `30`        |
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: Url,
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&process_env)
    }

    /// Build the config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = string_or(lookup, "BACKEND_HOST", "127.0.0.1");
        let port: u16 = parse_or(lookup, "BACKEND_PORT", 8080, "port number")?;
        let timeout_secs: u64 = parse_or(
            lookup,
            "HTTP_TIMEOUT_SECS",
            DEFAULT_REQUEST_TIMEOUT.as_secs(),
            "number of seconds",
        )?;

        let raw = format!("http://{host}:{port}");
        let base_url = Url::parse(&raw).map_err(|_| ConfigError::Invalid {
            var: "BACKEND_HOST",
            expected: "host name or address",
            value: host,
        })?;

        Ok(Self {
            base_url,
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

/// Tracker timing.
///
/// | Env var                   | Default |
/// |---------------------------|---------|
/// | `EXPORT_POLL_INTERVAL_MS` | `2000`  |
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub poll_interval: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl TrackerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&process_env)
    }

    pub fn from_lookup<F>(lookup: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let ms: u64 = parse_or(lookup, "EXPORT_POLL_INTERVAL_MS", 2000, "number of milliseconds")?;
        if ms == 0 {
            return Err(ConfigError::Invalid {
                var: "EXPORT_POLL_INTERVAL_MS",
                expected: "positive number of milliseconds",
                value: ms.to_string(),
            });
        }
        Ok(Self {
            poll_interval: Duration::from_millis(ms),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_matches::assert_matches;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_point_at_local_backend() {
        let cfg = ClientConfig::from_lookup(&lookup_from(&[])).unwrap();
        assert_eq!(cfg.base_url.as_str(), "http://127.0.0.1:8080/");
        assert_eq!(cfg.timeout, DEFAULT_REQUEST_TIMEOUT);

        let tracker = TrackerConfig::from_lookup(&lookup_from(&[])).unwrap();
        assert_eq!(tracker.poll_interval, DEFAULT_POLL_INTERVAL);
    }

    #[test]
    fn overrides_are_applied() {
        let cfg = ClientConfig::from_lookup(&lookup_from(&[
            ("BACKEND_HOST", "localhost"),
            ("BACKEND_PORT", "9090"),
        ]))
        .unwrap();
        assert_eq!(cfg.base_url.as_str(), "http://localhost:9090/");
        assert_eq!(cfg.timeout, DEFAULT_REQUEST_TIMEOUT);

        let tracker =
            TrackerConfig::from_lookup(&lookup_from(&[("EXPORT_POLL_INTERVAL_MS", "250")])).unwrap();
        assert_eq!(tracker.poll_interval, Duration::from_millis(250));
    }

    #[test]
    fn bad_port_is_reported() {
        assert_matches!(
            ClientConfig::from_lookup(&lookup_from(&[("BACKEND_PORT", "70000")])),
            Err(ConfigError::Invalid { var: "BACKEND_PORT", .. })
        );
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        assert_matches!(
            TrackerConfig::from_lookup(&lookup_from(&[("EXPORT_POLL_INTERVAL_MS", "0")])),
            Err(ConfigError::Invalid { .. })
        );
    }
}
