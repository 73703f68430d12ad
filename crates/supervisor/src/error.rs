use std::path::PathBuf;
use std::time::Duration;

/// Errors from bringing the backend up.
///
/// `BackendNotBuilt` and `BackendUnreachableTimeout` are fatal startup
/// conditions and are never retried.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("Backend executable not found in {}. Please run {build_hint} inside the backend directory first.", target_dir.display())]
    BackendNotBuilt {
        target_dir: PathBuf,
        build_hint: String,
    },

    #[error("Backend at {addr} did not become reachable within {}s", waited.as_secs())]
    BackendUnreachableTimeout { addr: String, waited: Duration },

    /// The spawned process exited before it became reachable.
    #[error("Backend process exited during startup with status {}", code.map_or_else(|| "signal".to_string(), |c| c.to_string()))]
    BackendExited { code: Option<i32> },

    #[error("Failed to spawn backend process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Failed to search for backend artifact: {0}")]
    Locate(#[source] std::io::Error),

    /// Shutdown was requested while the backend was starting.
    #[error("Supervisor is shutting down")]
    ShuttingDown,
}

impl SupervisorError {
    /// Title for the user-facing dialog of a fatal startup error.
    pub fn title(&self) -> &'static str {
        match self {
            Self::BackendNotBuilt { .. } => "Backend Not Built",
            Self::BackendUnreachableTimeout { .. } => "Backend Unreachable",
            Self::BackendExited { .. } => "Backend Stopped",
            Self::Spawn(_) | Self::Locate(_) => "Backend Failed to Start",
            Self::ShuttingDown => "Shutting Down",
        }
    }
}
