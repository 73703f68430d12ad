//! Supervisor configuration loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use wmark_core::env::{parse_or, process_env, string_or, ConfigError};

/// Command users are told to run when no artifact exists.
pub const DEFAULT_BUILD_HINT: &str = "./mvnw clean package -DskipTests";

/// How long a terminated backend gets to exit before it is killed.
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(5);

/// Where the backend lives and how it is started.
///
/// All fields are loaded from environment variables with sensible
/// defaults:
///
/// | Env var                      | Default              |
/// |------------------------------|----------------------|
/// | `BACKEND_HOST`               | `127.0.0.1`          |
/// | `BACKEND_PORT`               | `8080`               |
/// | `BACKEND_DIR`                | `./backend`          |
/// | `BACKEND_TARGET_DIR`         | `$BACKEND_DIR/target`|
/// | `BACKEND_RUNTIME`            | `java`               |
/// | `BACKEND_ARTIFACT_FLAG`      | `-jar`               |
/// | `BACKEND_ARTIFACT_EXT`       | `jar`                |
/// | `BACKEND_PROBE_TIMEOUT_MS`   | `1000`               |
/// | `BACKEND_READY_TIMEOUT_SECS` | `60`                 |
/// | `BACKEND_READY_INTERVAL_MS`  | `500`                |
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub host: String,
    pub port: u16,
    /// Working directory of the spawned process.
    pub backend_dir: PathBuf,
    /// Directory searched for the runnable artifact.
    pub target_dir: PathBuf,
    /// Program that runs the artifact.
    pub runtime: String,
    /// Argument placed before the artifact path. Omitted when empty.
    pub artifact_flag: String,
    /// Artifact file extension, without the dot.
    pub artifact_ext: String,
    pub build_hint: String,
    pub probe_timeout: Duration,
    pub ready_timeout: Duration,
    pub ready_interval: Duration,
    pub stop_grace: Duration,
}

impl SupervisorConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&process_env)
    }

    pub fn from_lookup<F>(lookup: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend_dir = PathBuf::from(string_or(lookup, "BACKEND_DIR", "./backend"));
        let target_dir = match lookup("BACKEND_TARGET_DIR").filter(|v| !v.trim().is_empty()) {
            Some(dir) => PathBuf::from(dir.trim()),
            None => backend_dir.join("target"),
        };

        let probe_ms: u64 = parse_or(lookup, "BACKEND_PROBE_TIMEOUT_MS", 1000, "number of milliseconds")?;
        let ready_secs: u64 = parse_or(lookup, "BACKEND_READY_TIMEOUT_SECS", 60, "number of seconds")?;
        let interval_ms: u64 =
            parse_or(lookup, "BACKEND_READY_INTERVAL_MS", 500, "number of milliseconds")?;

        Ok(Self {
            host: string_or(lookup, "BACKEND_HOST", "127.0.0.1"),
            port: parse_or(lookup, "BACKEND_PORT", 8080, "port number")?,
            backend_dir,
            target_dir,
            runtime: string_or(lookup, "BACKEND_RUNTIME", "java"),
            artifact_flag: lookup("BACKEND_ARTIFACT_FLAG")
                .map(|v| v.trim().to_string())
                .unwrap_or_else(|| "-jar".to_string()),
            artifact_ext: string_or(lookup, "BACKEND_ARTIFACT_EXT", "jar")
                .trim_start_matches('.')
                .to_string(),
            build_hint: DEFAULT_BUILD_HINT.to_string(),
            probe_timeout: Duration::from_millis(probe_ms),
            ready_timeout: Duration::from_secs(ready_secs),
            ready_interval: Duration::from_millis(interval_ms.max(1)),
            stop_grace: DEFAULT_STOP_GRACE,
        })
    }

    /// `host:port`, for logs and error messages.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
