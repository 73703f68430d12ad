//! Integration tests for the backend supervisor.
//!
//! Spawning tests use `sh` as the runtime and a shell script as the
//! "artifact", so they only run on unix.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use assert_matches::assert_matches;
use tempfile::TempDir;
use tokio::net::TcpListener;
use wmark_supervisor::{
    BackendSupervisor, Notifier, SupervisorConfig, SupervisorError, SupervisorEvent,
    SupervisorState,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

#[derive(Default)]
struct RecordingNotifier {
    fatal: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    fn titles(&self) -> Vec<String> {
        self.fatal
            .lock()
            .unwrap()
            .iter()
            .map(|(t, _)| t.clone())
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn fatal(&self, title: &str, message: &str) {
        self.fatal
            .lock()
            .unwrap()
            .push((title.to_string(), message.to_string()));
    }
}

/// Config pointing at a scratch backend directory. The runtime does not
/// exist, so any spawn attempt would fail loudly.
fn config(dir: &Path, port: u16) -> SupervisorConfig {
    let mut cfg = SupervisorConfig::from_lookup(&|_: &str| None).unwrap();
    cfg.port = port;
    cfg.backend_dir = dir.to_path_buf();
    cfg.target_dir = dir.join("target");
    cfg.runtime = "/nonexistent/wmark-runtime".to_string();
    cfg.probe_timeout = Duration::from_millis(500);
    cfg.ready_interval = Duration::from_millis(50);
    cfg.stop_grace = Duration::from_secs(2);
    cfg
}

fn supervisor(cfg: SupervisorConfig) -> (BackendSupervisor, Arc<RecordingNotifier>) {
    let notifier = Arc::new(RecordingNotifier::default());
    (BackendSupervisor::new(cfg, notifier.clone()), notifier)
}

/// A port with nothing listening on it right now.
async fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// Accept and drop connections on `port` after `delay`, standing in for
/// the backend's HTTP listener.
fn listen_after(port: u16, delay: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
        loop {
            if listener.accept().await.is_err() {
                return;
            }
        }
    })
}

/// Write a shell script artifact and configure `sh` to run it.
fn shell_backend(dir: &TempDir, port: u16, script: &str) -> SupervisorConfig {
    let target = dir.path().join("target");
    std::fs::create_dir_all(&target).unwrap();
    std::fs::write(target.join("backend.jar"), script).unwrap();

    let mut cfg = config(dir.path(), port);
    cfg.runtime = "sh".to_string();
    cfg.artifact_flag = String::new();
    cfg
}

#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    // Safety: signal 0 only checks for existence.
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

/// Wait until `pid` is gone or only a zombie awaiting its new parent.
#[cfg(unix)]
async fn wait_until_dead(pid: u32) -> bool {
    for _ in 0..100 {
        let zombie = std::fs::read_to_string(format!("/proc/{pid}/stat"))
            .ok()
            .and_then(|stat| {
                let (_, rest) = stat.rsplit_once(')')?;
                rest.split_whitespace().next().map(|state| state == "Z")
            })
            .unwrap_or(false);
        if !process_alive(pid) || zombie {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

/// Poll for a pid file written by a backend script.
#[cfg(unix)]
async fn read_pid_file(path: &Path) -> u32 {
    for _ in 0..100 {
        if let Ok(contents) = std::fs::read_to_string(path) {
            if let Ok(pid) = contents.trim().parse() {
                return pid;
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("pid file {} never appeared", path.display());
}

// ---------------------------------------------------------------------------
// Test: reuse an existing backend
// ---------------------------------------------------------------------------

/// A reachable port is reused without spawning, within the probe timeout.
#[tokio::test]
async fn reachable_port_is_reused_without_spawning() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let dir = tempfile::tempdir().unwrap();
    let (sup, notifier) = supervisor(config(dir.path(), port));

    let started = Instant::now();
    let state = sup.ensure_backend().await.unwrap();

    assert_eq!(state, SupervisorState::AlreadyRunning);
    assert!(started.elapsed() < Duration::from_millis(500));
    let handle = sup.handle().unwrap();
    assert!(!handle.spawned_by_us);
    assert!(handle.pid.is_none());
    assert!(notifier.titles().is_empty());
}

/// A second call while usable neither probes nor spawns.
#[tokio::test]
async fn ensure_is_idempotent_once_usable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let dir = tempfile::tempdir().unwrap();
    let (sup, _) = supervisor(config(dir.path(), port));

    sup.ensure_backend().await.unwrap();
    drop(listener);

    assert_eq!(
        sup.ensure_backend().await.unwrap(),
        SupervisorState::AlreadyRunning
    );
}

/// Stopping never touches a backend this run did not start.
#[tokio::test]
async fn stop_leaves_foreign_backend_running() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let dir = tempfile::tempdir().unwrap();
    let (sup, _) = supervisor(config(dir.path(), port));

    sup.ensure_backend().await.unwrap();
    sup.stop_backend().await;
    sup.stop_backend().await;

    assert_eq!(sup.state(), SupervisorState::Absent);
    assert!(tokio::net::TcpStream::connect(("127.0.0.1", port)).await.is_ok());
}

// ---------------------------------------------------------------------------
// Test: fatal startup conditions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_artifact_is_backend_not_built() {
    let dir = tempfile::tempdir().unwrap();
    let port = free_port().await;
    let (sup, notifier) = supervisor(config(dir.path(), port));

    let err = sup.ensure_backend().await.unwrap_err();

    assert_matches!(&err, SupervisorError::BackendNotBuilt { build_hint, .. }
        if build_hint == "./mvnw clean package -DskipTests");
    assert!(err.to_string().contains("./mvnw clean package -DskipTests"));
    assert_eq!(notifier.titles(), vec!["Backend Not Built"]);
    assert_eq!(sup.state(), SupervisorState::Absent);
    assert!(sup.handle().is_none());
}

#[tokio::test]
async fn ensure_after_shutdown_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let port = free_port().await;
    let (sup, _) = supervisor(config(dir.path(), port));

    sup.stop_backend().await;
    assert_matches!(sup.ensure_backend().await, Err(SupervisorError::ShuttingDown));
}

#[cfg(unix)]
#[tokio::test]
async fn child_exit_during_startup_fails_fast() {
    let dir = tempfile::tempdir().unwrap();
    let port = free_port().await;
    let mut cfg = shell_backend(&dir, port, "exit 3\n");
    cfg.ready_timeout = Duration::from_secs(30);
    let (sup, notifier) = supervisor(cfg);

    let started = Instant::now();
    let err = sup.ensure_backend().await.unwrap_err();

    assert_matches!(err, SupervisorError::BackendExited { code: Some(3) });
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(sup.state(), SupervisorState::Absent);
    assert_eq!(notifier.titles(), vec!["Backend Stopped"]);
}

/// A clean exit before readiness still fails startup, without a dialog.
#[cfg(unix)]
#[tokio::test]
async fn clean_exit_during_startup_is_not_notified() {
    let dir = tempfile::tempdir().unwrap();
    let port = free_port().await;
    let (sup, notifier) = supervisor(shell_backend(&dir, port, "exit 0\n"));

    let err = sup.ensure_backend().await.unwrap_err();

    assert_matches!(err, SupervisorError::BackendExited { code: Some(0) });
    assert!(notifier.titles().is_empty());
}

/// A runtime that cannot be started is reported to the user.
#[tokio::test]
async fn spawn_failure_is_notified() {
    let dir = tempfile::tempdir().unwrap();
    let port = free_port().await;
    let target = dir.path().join("target");
    std::fs::create_dir_all(&target).unwrap();
    std::fs::write(target.join("backend.jar"), b"").unwrap();
    let (sup, notifier) = supervisor(config(dir.path(), port));

    let err = sup.ensure_backend().await.unwrap_err();

    assert_matches!(err, SupervisorError::Spawn(_));
    assert_eq!(notifier.titles(), vec!["Backend Failed to Start"]);
    assert_eq!(sup.state(), SupervisorState::Absent);
    assert!(sup.handle().is_none());
}

#[cfg(unix)]
#[tokio::test]
async fn readiness_timeout_terminates_child() {
    let dir = tempfile::tempdir().unwrap();
    let port = free_port().await;
    let mut cfg = shell_backend(&dir, port, "sleep 30\n");
    cfg.ready_timeout = Duration::from_millis(300);
    let (sup, notifier) = supervisor(cfg);

    let started = Instant::now();
    let err = sup.ensure_backend().await.unwrap_err();

    assert_matches!(err, SupervisorError::BackendUnreachableTimeout { .. });
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(sup.state(), SupervisorState::Absent);
    assert!(sup.handle().is_none());
    assert_eq!(notifier.titles(), vec!["Backend Unreachable"]);
}

// ---------------------------------------------------------------------------
// Test: spawned backend lifecycle
// ---------------------------------------------------------------------------

/// Spawn, wait for the port, then tear the process group down.
#[cfg(unix)]
#[tokio::test]
async fn spawned_backend_becomes_ready_and_stops() {
    let dir = tempfile::tempdir().unwrap();
    let port = free_port().await;
    let (sup, notifier) = supervisor(shell_backend(&dir, port, "sleep 30\n"));
    let mut events = sup.subscribe();
    let http = listen_after(port, Duration::from_millis(300));

    assert_eq!(sup.ensure_backend().await.unwrap(), SupervisorState::Ready);
    let handle = sup.handle().unwrap();
    assert!(handle.spawned_by_us);
    let pid = handle.pid.unwrap();
    assert!(process_alive(pid));
    assert_matches!(
        events.try_recv(),
        Ok(SupervisorEvent::Ready { spawned_by_us: true, .. })
    );

    sup.stop_backend().await;
    assert_eq!(sup.state(), SupervisorState::Absent);
    assert!(!process_alive(pid));

    // A second teardown from another shutdown path is a no-op.
    sup.stop_backend().await;
    assert!(notifier.titles().is_empty());
    http.abort();
}

/// Workers forked by the backend go down with it.
#[cfg(unix)]
#[tokio::test]
async fn stop_terminates_forked_workers() {
    let dir = tempfile::tempdir().unwrap();
    let port = free_port().await;
    let script = "sleep 30 &\necho $! > worker.pid\nwait\n";
    let (sup, _) = supervisor(shell_backend(&dir, port, script));
    let http = listen_after(port, Duration::from_millis(100));

    assert_eq!(sup.ensure_backend().await.unwrap(), SupervisorState::Ready);
    let leader = sup.handle().unwrap().pid.unwrap();
    let worker = read_pid_file(&dir.path().join("worker.pid")).await;
    assert!(process_alive(worker));

    sup.stop_backend().await;

    assert!(wait_until_dead(leader).await);
    assert!(wait_until_dead(worker).await, "worker {worker} survived stop");
    http.abort();
}

/// A non-zero exit after readiness is reported, not fatal to the caller.
#[cfg(unix)]
#[tokio::test]
async fn crash_after_ready_is_notified() {
    let dir = tempfile::tempdir().unwrap();
    let port = free_port().await;
    let (sup, notifier) = supervisor(shell_backend(&dir, port, "sleep 1\nexit 7\n"));
    let mut events = sup.subscribe();
    let http = listen_after(port, Duration::from_millis(100));

    assert_eq!(sup.ensure_backend().await.unwrap(), SupervisorState::Ready);

    let crashed = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match events.recv().await {
                Ok(SupervisorEvent::BackendCrashed { code }) => return code,
                Ok(_) => continue,
                Err(e) => panic!("event channel closed: {e}"),
            }
        }
    })
    .await
    .unwrap();

    assert_eq!(crashed, Some(7));
    assert_eq!(notifier.titles(), vec!["Backend Stopped"]);
    assert_eq!(sup.state(), SupervisorState::Absent);
    http.abort();
}
