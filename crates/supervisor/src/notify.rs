//! User-facing notifications and supervisor events.

use serde::Serialize;

/// Shows fatal conditions to the user.
pub trait Notifier: Send + Sync {
    fn fatal(&self, title: &str, message: &str);
}

/// Notifier that only logs. Used by the headless shell.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn fatal(&self, title: &str, message: &str) {
        tracing::error!(title, "{message}");
    }
}

/// Backend lifecycle changes, broadcast to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SupervisorEvent {
    /// The backend is usable.
    Ready { pid: Option<u32>, spawned_by_us: bool },

    /// The spawned backend exited on its own with a non-zero status (or
    /// was killed by a signal) after it had become ready.
    BackendCrashed { code: Option<i32> },

    /// The spawned backend exited on its own with status 0.
    BackendExited,
}
