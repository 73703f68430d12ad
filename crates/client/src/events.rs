//! Events published by the export job tracker.
//!
//! The UI subscribes through [`ExportJobTracker::subscribe`] and re-renders
//! from these rather than polling the tracker itself.
//!
//! [`ExportJobTracker::subscribe`]: crate::tracker::ExportJobTracker::subscribe

use serde::Serialize;
use wmark_core::export::ExportJobView;
use wmark_core::types::JobId;

#[derive(Debug, Clone, Serialize)]
pub enum TrackerEvent {
    /// A fresh snapshot replaced the local copy of a job.
    JobUpdated { job: ExportJobView },

    /// The service no longer knows the job; it was dropped locally.
    JobExpired { job_id: JobId },

    /// A status poll failed. The last known snapshot is kept and polling
    /// for this job has stopped.
    PollFailed { job_id: JobId, error: String },

    /// The poll loop for a job ended (terminal status, cancel, expiry,
    /// failure or explicit stop).
    PollingStopped { job_id: JobId },
}
