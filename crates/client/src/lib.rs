//! Client side of the export service.
//!
//! [`api`] wraps the REST endpoints; [`tracker::ExportJobTracker`] sits on
//! top of the [`api::ExportApi`] trait and keeps a live view of every
//! export job, polling each non-terminal job on its own cancellable task.

pub mod api;
pub mod config;
pub mod events;
pub mod tracker;

pub use api::{ExportApi, ExportApiClient, ExportApiError, UploadFile};
pub use config::{ClientConfig, TrackerConfig};
pub use events::TrackerEvent;
pub use tracker::{ExportJobTracker, TrackerError};
