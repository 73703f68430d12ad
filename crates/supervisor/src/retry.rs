//! Retry loop for loading the UI once the backend is up.

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Delay between a failed load and the next attempt.
pub const DEFAULT_LOAD_BACKOFF: Duration = Duration::from_secs(1);

/// A failed attempt to load the window content.
#[derive(Debug, Clone, thiserror::Error)]
#[error("Load failed ({code}): {description}")]
pub struct LoadFailure {
    pub code: i32,
    pub description: String,
}

/// Something that can (re)load the main window content.
#[async_trait]
pub trait WindowLoader: Send + Sync {
    async fn load(&self) -> Result<(), LoadFailure>;
}

/// Retries a failing load after a fixed backoff, for as long as the
/// window lives.
#[derive(Debug, Clone)]
pub struct LoadRetry {
    backoff: Duration,
}

impl Default for LoadRetry {
    fn default() -> Self {
        Self::new(DEFAULT_LOAD_BACKOFF)
    }
}

impl LoadRetry {
    pub fn new(backoff: Duration) -> Self {
        Self { backoff }
    }

    /// Load until it succeeds or `window_closed` fires.
    ///
    /// Returns `true` once loaded, `false` if the window went away first.
    pub async fn run(&self, loader: &dyn WindowLoader, window_closed: &CancellationToken) -> bool {
        let mut attempt: u32 = 0;
        loop {
            if window_closed.is_cancelled() {
                return false;
            }
            attempt += 1;

            let result = tokio::select! {
                _ = window_closed.cancelled() => return false,
                result = loader.load() => result,
            };

            match result {
                Ok(()) => {
                    tracing::info!(attempt, "Window content loaded");
                    return true;
                }
                Err(e) => {
                    tracing::warn!(
                        attempt,
                        error = %e,
                        backoff_ms = self.backoff.as_millis() as u64,
                        "Window load failed, retrying",
                    );
                }
            }

            tokio::select! {
                _ = window_closed.cancelled() => return false,
                _ = tokio::time::sleep(self.backoff) => {}
            }
        }
    }
}
