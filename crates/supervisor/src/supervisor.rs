//! Backend process supervisor.
//!
//! Lifecycle:
//!
//! ```text
//! Absent -> Probing -> AlreadyRunning
//!                   -> Spawning -> AwaitingReady -> Ready
//! (shutdown) -> Terminating -> Absent
//! ```
//!
//! `AlreadyRunning` and `Ready` are usable states. Only a `Ready` backend
//! was started by this supervisor, and only that one is ever signalled.
//! The child runs in its own process group so the whole tree can be
//! terminated with one signal.

use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tokio::process::{Child, Command};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::SupervisorConfig;
use crate::error::SupervisorError;
use crate::locator::locate_artifact;
use crate::notify::{Notifier, SupervisorEvent};
use crate::probe::is_port_reachable;

/// Broadcast channel capacity for supervisor events.
const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Upper bound on waiting for a force-killed child to be reaped.
const KILL_WAIT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SupervisorState {
    Absent,
    Probing,
    AlreadyRunning,
    Spawning,
    AwaitingReady,
    Ready,
    Terminating,
}

impl SupervisorState {
    pub fn is_usable(self) -> bool {
        matches!(self, Self::AlreadyRunning | Self::Ready)
    }
}

/// The backend this run is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BackendProcessHandle {
    /// Known only for a process this run spawned.
    pub pid: Option<u32>,
    /// `false` for a backend that was already listening; such a process
    /// must never be torn down by this run.
    pub spawned_by_us: bool,
}

/// Exit status recorded by the monitor task. `code` is `None` when the
/// process was ended by a signal or its status could not be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ChildExit {
    code: Option<i32>,
}

/// Control side of a spawned child. The [`Child`] itself lives in the
/// monitor task.
struct ChildControl {
    pid: Option<u32>,
    exit_rx: watch::Receiver<Option<ChildExit>>,
    force_kill: CancellationToken,
    monitor: JoinHandle<()>,
}

struct Runtime {
    state: SupervisorState,
    handle: Option<BackendProcessHandle>,
    child: Option<ChildControl>,
}

struct SupervisorInner {
    config: SupervisorConfig,
    notifier: Arc<dyn Notifier>,
    runtime: Mutex<Runtime>,
    /// Serialises `ensure_backend` and `stop_backend`.
    lifecycle: tokio::sync::Mutex<()>,
    event_tx: broadcast::Sender<SupervisorEvent>,
    /// Cancelled once shutdown has been requested.
    shutdown: CancellationToken,
}

/// Owns the backend process for one application run.
///
/// Created once at startup; [`ensure_backend`](Self::ensure_backend) on
/// start and [`stop_backend`](Self::stop_backend) from every shutdown
/// path.
pub struct BackendSupervisor {
    inner: Arc<SupervisorInner>,
}

impl BackendSupervisor {
    pub fn new(config: SupervisorConfig, notifier: Arc<dyn Notifier>) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(SupervisorInner {
                config,
                notifier,
                runtime: Mutex::new(Runtime {
                    state: SupervisorState::Absent,
                    handle: None,
                    child: None,
                }),
                lifecycle: tokio::sync::Mutex::new(()),
                event_tx,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.inner.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.inner.event_tx.subscribe()
    }

    pub fn state(&self) -> SupervisorState {
        self.inner.lock_runtime().state
    }

    pub fn handle(&self) -> Option<BackendProcessHandle> {
        self.inner.lock_runtime().handle
    }

    /// Make sure a backend is reachable, starting one if needed.
    ///
    /// Returns the usable state reached: `AlreadyRunning` when something
    /// was listening already, `Ready` when this call spawned it. Calling
    /// it again while usable returns immediately.
    pub async fn ensure_backend(&self) -> Result<SupervisorState, SupervisorError> {
        let _lifecycle = self.inner.lifecycle.lock().await;
        if self.inner.shutdown.is_cancelled() {
            return Err(SupervisorError::ShuttingDown);
        }

        let current = self.state();
        if current.is_usable() {
            return Ok(current);
        }

        let config = &self.inner.config;
        let addr = config.addr();

        self.inner.set_state(SupervisorState::Probing);
        if is_port_reachable(&config.host, config.port, config.probe_timeout).await {
            tracing::info!(addr = %addr, "Backend already running, reusing it");
            let handle = BackendProcessHandle {
                pid: None,
                spawned_by_us: false,
            };
            {
                let mut rt = self.inner.lock_runtime();
                rt.state = SupervisorState::AlreadyRunning;
                rt.handle = Some(handle);
            }
            self.inner.publish(SupervisorEvent::Ready {
                pid: None,
                spawned_by_us: false,
            });
            return Ok(SupervisorState::AlreadyRunning);
        }

        let artifact = match locate_artifact(&config.target_dir, &config.artifact_ext) {
            Ok(Some(path)) => path,
            Ok(None) => {
                self.inner.set_state(SupervisorState::Absent);
                let err = SupervisorError::BackendNotBuilt {
                    target_dir: config.target_dir.clone(),
                    build_hint: config.build_hint.clone(),
                };
                tracing::error!(target_dir = %config.target_dir.display(), "No backend artifact found");
                return Err(self.inner.report_startup_failure(err));
            }
            Err(e) => {
                self.inner.set_state(SupervisorState::Absent);
                tracing::error!(target_dir = %config.target_dir.display(), error = %e, "Artifact search failed");
                return Err(self.inner.report_startup_failure(SupervisorError::Locate(e)));
            }
        };

        self.inner.set_state(SupervisorState::Spawning);
        let control = match self.inner.spawn_child(&artifact) {
            Ok(control) => control,
            Err(e) => {
                self.inner.set_state(SupervisorState::Absent);
                tracing::error!(runtime = %config.runtime, error = %e, "Failed to spawn backend");
                return Err(self.inner.report_startup_failure(SupervisorError::Spawn(e)));
            }
        };
        let pid = control.pid;
        let mut exit_rx = control.exit_rx.clone();
        {
            let mut rt = self.inner.lock_runtime();
            rt.state = SupervisorState::AwaitingReady;
            rt.handle = Some(BackendProcessHandle {
                pid,
                spawned_by_us: true,
            });
            rt.child = Some(control);
        }

        let outcome = self
            .inner
            .wait_until_ready(&mut exit_rx)
            .await
            .and_then(|()| self.inner.mark_ready(&exit_rx));

        match outcome {
            Ok(()) => {
                tracing::info!(addr = %addr, pid, "Backend ready");
                self.inner.publish(SupervisorEvent::Ready {
                    pid,
                    spawned_by_us: true,
                });
                Ok(SupervisorState::Ready)
            }
            Err(err) => {
                tracing::error!(addr = %addr, pid, error = %err, "Backend failed to start");
                self.inner.terminate_spawned().await;
                Err(self.inner.report_startup_failure(err))
            }
        }
    }

    /// Terminate the backend if this run spawned it.
    ///
    /// Sends SIGTERM to the child's process group, waits up to the grace
    /// period, then kills it. A backend that was already running is left
    /// alone. Safe to call repeatedly and concurrently.
    pub async fn stop_backend(&self) {
        self.inner.shutdown.cancel();
        let _lifecycle = self.inner.lifecycle.lock().await;

        let spawned = self
            .inner
            .lock_runtime()
            .handle
            .is_some_and(|h| h.spawned_by_us);
        if spawned {
            self.inner.terminate_spawned().await;
        } else {
            let mut rt = self.inner.lock_runtime();
            if rt.handle.is_some() {
                tracing::info!("Leaving externally started backend running");
            }
            rt.state = SupervisorState::Absent;
            rt.handle = None;
        }
    }
}

impl SupervisorInner {
    fn lock_runtime(&self) -> MutexGuard<'_, Runtime> {
        self.runtime.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: SupervisorState) {
        self.lock_runtime().state = state;
    }

    fn publish(&self, event: SupervisorEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Show a startup failure to the user. Shutdown and a clean exit are
    /// not failures the user needs to act on.
    fn report_startup_failure(&self, err: SupervisorError) -> SupervisorError {
        let silent = matches!(
            err,
            SupervisorError::ShuttingDown | SupervisorError::BackendExited { code: Some(0) }
        );
        if !silent {
            self.notifier.fatal(err.title(), &err.to_string());
        }
        err
    }

    /// Spawn `<runtime> [flag] <artifact> --server.port=<port>` and hand
    /// the child to a monitor task.
    fn spawn_child(self: &Arc<Self>, artifact: &std::path::Path) -> std::io::Result<ChildControl> {
        let config = &self.config;

        let mut cmd = Command::new(&config.runtime);
        if !config.artifact_flag.is_empty() {
            cmd.arg(&config.artifact_flag);
        }
        cmd.arg(artifact)
            .arg(format!("--server.port={}", config.port))
            .current_dir(&config.backend_dir)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd.spawn()?;
        let pid = child.id();
        tracing::info!(
            pid,
            runtime = %config.runtime,
            artifact = %artifact.display(),
            port = config.port,
            "Backend process spawned",
        );

        let (exit_tx, exit_rx) = watch::channel(None);
        let force_kill = CancellationToken::new();
        let monitor = tokio::spawn(monitor_child(
            Arc::clone(self),
            child,
            pid,
            exit_tx,
            force_kill.clone(),
        ));

        Ok(ChildControl {
            pid,
            exit_rx,
            force_kill,
            monitor,
        })
    }

    /// Probe the port every `ready_interval` until it accepts connections.
    ///
    /// Fails early when the child exits or shutdown is requested.
    async fn wait_until_ready(
        &self,
        exit_rx: &mut watch::Receiver<Option<ChildExit>>,
    ) -> Result<(), SupervisorError> {
        let config = &self.config;
        let started = Instant::now();
        let deadline = started + config.ready_timeout;

        loop {
            if let Some(exit) = *exit_rx.borrow() {
                return Err(SupervisorError::BackendExited { code: exit.code });
            }
            if is_port_reachable(&config.host, config.port, config.probe_timeout).await {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(SupervisorError::BackendUnreachableTimeout {
                    addr: config.addr(),
                    waited: started.elapsed(),
                });
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => return Err(SupervisorError::ShuttingDown),
                _ = exit_rx.changed() => {}
                _ = tokio::time::sleep(config.ready_interval) => {}
            }
        }
    }

    /// Switch to `Ready` unless the child has already exited. The monitor
    /// records exits under the same lock, so a crash is never missed.
    fn mark_ready(
        &self,
        exit_rx: &watch::Receiver<Option<ChildExit>>,
    ) -> Result<(), SupervisorError> {
        let mut rt = self.lock_runtime();
        let exited = *exit_rx.borrow();
        match exited {
            Some(exit) => Err(SupervisorError::BackendExited { code: exit.code }),
            None => {
                rt.state = SupervisorState::Ready;
                Ok(())
            }
        }
    }

    /// Stop the spawned child (if it is still running) and reset to
    /// `Absent`.
    async fn terminate_spawned(&self) {
        let control = {
            let mut rt = self.lock_runtime();
            rt.state = SupervisorState::Terminating;
            rt.child.take()
        };

        if let Some(control) = control {
            self.terminate_child(control).await;
        }

        let mut rt = self.lock_runtime();
        rt.state = SupervisorState::Absent;
        rt.handle = None;
    }

    async fn terminate_child(&self, control: ChildControl) {
        let ChildControl {
            pid,
            mut exit_rx,
            force_kill,
            monitor,
        } = control;

        if exit_rx.borrow().is_none() {
            match pid {
                Some(pid) => {
                    tracing::info!(pid, "Sending SIGTERM to backend process group");
                    if let Err(e) = signal_process_group(pid, GroupSignal::Terminate) {
                        tracing::warn!(pid, error = %e, "Failed to signal backend process group");
                        force_kill.cancel();
                    }
                }
                None => force_kill.cancel(),
            }

            let exited = tokio::time::timeout(self.config.stop_grace, exit_rx.wait_for(Option::is_some))
                .await
                .is_ok();
            if !exited {
                tracing::warn!(
                    pid,
                    grace_secs = self.config.stop_grace.as_secs(),
                    "Backend ignored SIGTERM, killing it",
                );
                force_kill.cancel();
            }
        }

        if tokio::time::timeout(KILL_WAIT_TIMEOUT, monitor).await.is_err() {
            tracing::error!(pid, "Backend process could not be reaped");
        } else {
            tracing::info!(pid, "Backend process stopped");
        }
    }
}

/// Wait for the child to exit, or kill it when `force_kill` fires, and
/// report unexpected exits.
async fn monitor_child(
    inner: Arc<SupervisorInner>,
    mut child: Child,
    pid: Option<u32>,
    exit_tx: watch::Sender<Option<ChildExit>>,
    force_kill: CancellationToken,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        _ = force_kill.cancelled() => {
            if let Some(pid) = pid {
                // Descendants first; the leader is killed below either way.
                let _ = signal_process_group(pid, GroupSignal::Kill);
            }
            if let Err(e) = child.start_kill() {
                tracing::warn!(pid, error = %e, "Failed to kill backend process");
            }
            child.wait().await
        }
    };

    let code = match status {
        Ok(status) => status.code(),
        Err(e) => {
            tracing::warn!(pid, error = %e, "Failed to read backend exit status");
            None
        }
    };

    // Record the exit under the runtime lock; a crash after readiness
    // frees the slot so a new backend can be started.
    let was_ready = {
        let mut rt = inner.lock_runtime();
        exit_tx.send_replace(Some(ChildExit { code }));
        let was_ready = rt.state == SupervisorState::Ready;
        if was_ready {
            rt.state = SupervisorState::Absent;
            rt.handle = None;
            rt.child = None;
        }
        was_ready
    };

    if !was_ready || inner.shutdown.is_cancelled() {
        tracing::debug!(pid, code, "Backend process exited");
        return;
    }

    match code {
        Some(0) => {
            tracing::info!(pid, "Backend process exited normally");
            inner.publish(SupervisorEvent::BackendExited);
        }
        code => {
            let status = code.map_or_else(|| "a signal".to_string(), |c| c.to_string());
            tracing::error!(pid, code, "Backend process crashed");
            inner.notifier.fatal(
                "Backend Stopped",
                &format!("Backend process exited with status {status}."),
            );
            inner.publish(SupervisorEvent::BackendCrashed { code });
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum GroupSignal {
    Terminate,
    Kill,
}

/// Signal every process in the group led by `pid`.
#[cfg(unix)]
fn signal_process_group(pid: u32, signal: GroupSignal) -> std::io::Result<()> {
    let pgid = libc::pid_t::try_from(pid)
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "pid out of range"))?;
    let signo = match signal {
        GroupSignal::Terminate => libc::SIGTERM,
        GroupSignal::Kill => libc::SIGKILL,
    };
    // Safety: kill(2) takes plain integers and touches no memory we own.
    // The child was spawned with `process_group(0)`, so `-pgid` addresses
    // exactly its process group.
    let rc = unsafe { libc::kill(-pgid, signo) };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn signal_process_group(_pid: u32, _signal: GroupSignal) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "process groups are not supported on this platform",
    ))
}

impl Drop for BackendSupervisor {
    fn drop(&mut self) {
        self.inner.shutdown.cancel();
    }
}
