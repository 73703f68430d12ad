//! Export job tracker.
//!
//! [`ExportJobTracker`] keeps the client-side view of every export job the
//! UI knows about. Each non-terminal job gets its own poll task holding a
//! child of the tracker's master [`CancellationToken`]; the task is keyed
//! by job id so there is never more than one loop per job.
//!
//! A poll loop ends when the job reaches a terminal status, when the
//! service answers 404 (the job expired), on the first failed poll, on
//! [`cancel`](ExportJobTracker::cancel), or on
//! [`dispose`](ExportJobTracker::dispose). State changes are published on
//! a broadcast channel; call [`ExportJobTracker::subscribe`] to receive
//! them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use wmark_core::config::ExportRequest;
use wmark_core::error::CoreError;
use wmark_core::export::ExportJobView;
use wmark_core::types::JobId;

use crate::api::{ExportApi, ExportApiError, UploadFile};
use crate::config::TrackerConfig;
use crate::events::TrackerEvent;

/// Broadcast channel capacity for tracker events.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// How long [`ExportJobTracker::dispose`] waits for each poll task.
const TASK_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors returned to callers of the tracker.
///
/// Poll failures and expiry are not errors at this level; they are
/// reported as [`TrackerEvent`]s.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    /// The service rejected the submission, or it never reached the
    /// service. Carries the message to show the user.
    #[error("Export submission failed: {0}")]
    Submission(String),

    /// The export configuration failed local validation.
    #[error(transparent)]
    Validation(#[from] CoreError),

    #[error("Failed to cancel export job: {0}")]
    Cancel(#[source] ExportApiError),

    #[error("Failed to refresh export jobs: {0}")]
    Refresh(#[source] ExportApiError),
}

/// Client-side view of export jobs with per-job polling.
///
/// Dropping the tracker cancels every poll loop.
pub struct ExportJobTracker {
    inner: Arc<TrackerInner>,
}

struct TrackerInner {
    api: Arc<dyn ExportApi>,
    poll_interval: Duration,
    state: RwLock<TrackerState>,
    event_tx: broadcast::Sender<TrackerEvent>,
    /// Master cancellation token, cancelled on dispose or drop.
    cancel: CancellationToken,
}

#[derive(Default)]
struct TrackerState {
    jobs: HashMap<JobId, ExportJobView>,
    pollers: HashMap<JobId, PollHandle>,
    active_job_id: Option<JobId>,
    next_generation: u64,
}

/// Bookkeeping for one running poll loop.
struct PollHandle {
    /// Distinguishes this loop from a later replacement for the same id.
    generation: u64,
    /// Child of the master token.
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl ExportJobTracker {
    pub fn new(api: Arc<dyn ExportApi>, config: TrackerConfig) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(TrackerInner {
                api,
                poll_interval: config.poll_interval,
                state: RwLock::new(TrackerState::default()),
                event_tx,
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// Subscribe to job updates.
    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.inner.event_tx.subscribe()
    }

    /// Upload `files` with `request` as one export job and start polling it.
    ///
    /// The returned job becomes the active job. Nothing is registered when
    /// the request is rejected locally or by the service.
    pub async fn submit(
        &self,
        files: Vec<UploadFile>,
        request: &ExportRequest,
    ) -> Result<ExportJobView, TrackerError> {
        if files.is_empty() {
            return Err(TrackerError::Submission(
                "No images selected for export".to_string(),
            ));
        }
        request.validate()?;

        let file_count = files.len();
        let job = self
            .inner
            .api
            .submit_export(request, files)
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, file_count, "Export submission failed");
                TrackerError::Submission(e.user_message())
            })?;

        tracing::info!(
            job_id = %job.id,
            status = %job.status,
            file_count,
            "Export job submitted",
        );

        {
            let mut state = self.inner.state.write().await;
            state.jobs.insert(job.id.clone(), job.clone());
            state.active_job_id = Some(job.id.clone());
            if !job.is_terminal() {
                self.inner.start_polling_locked(&mut state, &job.id);
            }
        }
        self.inner.publish(TrackerEvent::JobUpdated { job: job.clone() });

        Ok(job)
    }

    /// Ask the service to cancel a job.
    ///
    /// On success the local snapshot is replaced with the service's answer
    /// and polling stops, whatever status came back. A poll response that
    /// arrives afterwards is discarded.
    pub async fn cancel(&self, job_id: &str) -> Result<ExportJobView, TrackerError> {
        let job = match self.inner.api.cancel_job(job_id).await {
            Ok(job) => job,
            Err(e) => {
                tracing::warn!(job_id, error = %e, "Failed to cancel export job");
                return Err(TrackerError::Cancel(e));
            }
        };

        let stopped = {
            let mut state = self.inner.state.write().await;
            let stopped = release_poller(&mut state, job_id, None);
            state.jobs.insert(job_id.to_string(), job.clone());
            stopped
        };

        tracing::info!(job_id, status = %job.status, "Export job cancelled");
        if stopped {
            self.inner.publish(TrackerEvent::PollingStopped {
                job_id: job_id.to_string(),
            });
        }
        self.inner.publish(TrackerEvent::JobUpdated { job: job.clone() });

        Ok(job)
    }

    /// Replace the local collection with the service's job list and poll
    /// every non-terminal job again.
    pub async fn refresh(&self) -> Result<Vec<ExportJobView>, TrackerError> {
        let jobs = self.inner.api.list_jobs().await.map_err(|e| {
            tracing::warn!(error = %e, "Failed to refresh export jobs");
            TrackerError::Refresh(e)
        })?;

        let mut stopped = Vec::new();
        {
            let mut state = self.inner.state.write().await;

            let fresh: HashMap<JobId, ExportJobView> =
                jobs.iter().map(|j| (j.id.clone(), j.clone())).collect();

            let stale: Vec<JobId> = state
                .pollers
                .keys()
                .filter(|id| fresh.get(*id).map_or(true, |j| j.is_terminal()))
                .cloned()
                .collect();
            for id in stale {
                if release_poller(&mut state, &id, None) {
                    stopped.push(id);
                }
            }

            state.jobs = fresh;
            if let Some(active) = state.active_job_id.clone() {
                if !state.jobs.contains_key(&active) {
                    state.active_job_id = None;
                }
            }

            for job in jobs.iter().filter(|j| !j.is_terminal()) {
                self.inner.start_polling_locked(&mut state, &job.id);
            }
        }

        tracing::debug!(count = jobs.len(), "Export jobs refreshed");
        for job_id in stopped {
            self.inner.publish(TrackerEvent::PollingStopped { job_id });
        }
        for job in &jobs {
            self.inner.publish(TrackerEvent::JobUpdated { job: job.clone() });
        }

        Ok(jobs)
    }

    /// Start (or restart) the poll loop for `job_id`.
    ///
    /// Returns `false` without polling when the job is already known to
    /// be terminal or the tracker has been disposed.
    pub async fn start_polling(&self, job_id: &str) -> bool {
        let mut state = self.inner.state.write().await;
        if state.jobs.get(job_id).is_some_and(|j| j.is_terminal()) {
            tracing::debug!(job_id, "Not polling terminal export job");
            return false;
        }
        self.inner.start_polling_locked(&mut state, job_id)
    }

    /// Stop the poll loop for `job_id`, if any. The local snapshot is kept.
    pub async fn stop_polling(&self, job_id: &str) -> bool {
        let stopped = {
            let mut state = self.inner.state.write().await;
            release_poller(&mut state, job_id, None)
        };
        if stopped {
            self.inner.publish(TrackerEvent::PollingStopped {
                job_id: job_id.to_string(),
            });
        }
        stopped
    }

    /// Stop every poll loop and refuse to start new ones.
    ///
    /// Waits up to 5 seconds per task for a clean exit. Safe to call more
    /// than once.
    pub async fn dispose(&self) {
        self.inner.cancel.cancel();

        let handles: Vec<(JobId, PollHandle)> = {
            let mut state = self.inner.state.write().await;
            state.pollers.drain().collect()
        };
        if handles.is_empty() {
            return;
        }

        tracing::info!(count = handles.len(), "Stopping export poll tasks");
        for (job_id, handle) in handles {
            handle.cancel.cancel();
            if tokio::time::timeout(TASK_SHUTDOWN_TIMEOUT, handle.task)
                .await
                .is_err()
            {
                tracing::warn!(job_id = %job_id, "Poll task did not stop in time");
            }
            self.inner.publish(TrackerEvent::PollingStopped { job_id });
        }
    }

    /// All known jobs, in no particular order.
    pub async fn jobs(&self) -> Vec<ExportJobView> {
        self.inner.state.read().await.jobs.values().cloned().collect()
    }

    /// All known jobs, newest first.
    pub async fn latest_jobs(&self) -> Vec<ExportJobView> {
        let mut jobs = self.jobs().await;
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs
    }

    pub async fn job(&self, job_id: &str) -> Option<ExportJobView> {
        self.inner.state.read().await.jobs.get(job_id).cloned()
    }

    pub async fn active_job_id(&self) -> Option<JobId> {
        self.inner.state.read().await.active_job_id.clone()
    }

    /// Snapshot of the most recently submitted job, if it is still known.
    pub async fn active_job(&self) -> Option<ExportJobView> {
        let state = self.inner.state.read().await;
        state
            .active_job_id
            .as_ref()
            .and_then(|id| state.jobs.get(id))
            .cloned()
    }

    pub async fn is_polling(&self, job_id: &str) -> bool {
        self.inner.state.read().await.pollers.contains_key(job_id)
    }

    pub async fn active_poll_count(&self) -> usize {
        self.inner.state.read().await.pollers.len()
    }
}

impl Drop for ExportJobTracker {
    fn drop(&mut self) {
        self.inner.cancel.cancel();
    }
}

impl TrackerInner {
    fn publish(&self, event: TrackerEvent) {
        // No subscribers is fine.
        let _ = self.event_tx.send(event);
    }

    /// Replace any existing loop for `job_id` with a new one.
    ///
    /// Must be called with the state write lock held so the old loop is
    /// cancelled before the new one is registered.
    fn start_polling_locked(self: &Arc<Self>, state: &mut TrackerState, job_id: &str) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }

        release_poller(state, job_id, None);

        state.next_generation += 1;
        let generation = state.next_generation;
        let cancel = self.cancel.child_token();

        let inner = Arc::clone(self);
        let task_cancel = cancel.clone();
        let task_job_id = job_id.to_string();
        let task = tokio::spawn(async move {
            tracing::debug!(job_id = %task_job_id, generation, "Export poll task started");
            inner
                .run_poll_loop(&task_job_id, generation, &task_cancel)
                .await;
            tracing::debug!(job_id = %task_job_id, generation, "Export poll task exited");
        });

        state.pollers.insert(
            job_id.to_string(),
            PollHandle {
                generation,
                cancel,
                task,
            },
        );
        true
    }

    /// Poll `job_id` every interval until the loop decides to stop or the
    /// token is cancelled. The first poll happens one interval after start.
    async fn run_poll_loop(&self, job_id: &str, generation: u64, cancel: &CancellationToken) {
        let mut ticker =
            tokio::time::interval_at(Instant::now() + self.poll_interval, self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {}
            }

            let result = tokio::select! {
                _ = cancel.cancelled() => return,
                result = self.api.job_status(job_id) => result,
            };

            if !self.apply_poll_result(job_id, generation, cancel, result).await {
                return;
            }
        }
    }

    /// Apply one poll response. Returns whether the loop should continue.
    async fn apply_poll_result(
        &self,
        job_id: &str,
        generation: u64,
        cancel: &CancellationToken,
        result: Result<ExportJobView, ExportApiError>,
    ) -> bool {
        let mut state = self.state.write().await;

        // Stopped while the request was in flight.
        if cancel.is_cancelled() {
            tracing::debug!(job_id, "Discarding poll response for stopped job");
            return false;
        }

        match result {
            Ok(job) => {
                let terminal = job.is_terminal();
                state.jobs.insert(job_id.to_string(), job.clone());
                if terminal {
                    release_poller(&mut state, job_id, Some(generation));
                }
                drop(state);

                if terminal {
                    tracing::info!(
                        job_id,
                        status = %job.status,
                        success_count = job.success_count,
                        failure_count = job.failure_count,
                        "Export job finished",
                    );
                }
                self.publish(TrackerEvent::JobUpdated { job });
                if terminal {
                    self.publish(TrackerEvent::PollingStopped {
                        job_id: job_id.to_string(),
                    });
                }
                !terminal
            }
            Err(ExportApiError::NotFound) => {
                state.jobs.remove(job_id);
                if state.active_job_id.as_deref() == Some(job_id) {
                    state.active_job_id = None;
                }
                release_poller(&mut state, job_id, Some(generation));
                drop(state);

                tracing::info!(job_id, "Export job expired on the service");
                self.publish(TrackerEvent::JobExpired {
                    job_id: job_id.to_string(),
                });
                self.publish(TrackerEvent::PollingStopped {
                    job_id: job_id.to_string(),
                });
                false
            }
            Err(e) => {
                release_poller(&mut state, job_id, Some(generation));
                drop(state);

                tracing::warn!(job_id, error = %e, "Export status poll failed, polling stopped");
                self.publish(TrackerEvent::PollFailed {
                    job_id: job_id.to_string(),
                    error: e.to_string(),
                });
                self.publish(TrackerEvent::PollingStopped {
                    job_id: job_id.to_string(),
                });
                false
            }
        }
    }
}

/// Cancel and forget the poll loop for `job_id`.
///
/// With `Some(generation)` only that exact loop is released, so a loop
/// finishing on its own never removes its replacement. The task itself
/// is detached; it exits at its next cancellation check.
fn release_poller(state: &mut TrackerState, job_id: &str, generation: Option<u64>) -> bool {
    let matches = state
        .pollers
        .get(job_id)
        .is_some_and(|h| generation.map_or(true, |g| h.generation == g));
    if !matches {
        return false;
    }
    match state.pollers.remove(job_id) {
        Some(handle) => {
            handle.cancel.cancel();
            true
        }
        None => false,
    }
}
