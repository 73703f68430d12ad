//! Local backend process supervision.
//!
//! [`supervisor::BackendSupervisor`] guarantees a reachable backend: it
//! reuses one that is already listening, or locates the newest build
//! artifact, spawns it, waits for the port to accept connections, and
//! tears the whole process group down on shutdown. [`retry::LoadRetry`]
//! keeps retrying the UI load once the backend is up.

pub mod config;
pub mod error;
pub mod locator;
pub mod notify;
pub mod probe;
pub mod retry;
pub mod supervisor;

pub use config::SupervisorConfig;
pub use error::SupervisorError;
pub use notify::{LogNotifier, Notifier, SupervisorEvent};
pub use retry::{LoadFailure, LoadRetry, WindowLoader};
pub use supervisor::{BackendProcessHandle, BackendSupervisor, SupervisorState};
