//! Orphan-preventing process registry.
//!
//! Every child a supervisor spawns is added here and removed once it exits.
//! [`ProcessRegistry::kill_all`] is the single path for forcibly stopping
//! whatever is still tracked, used both by `destroy()` and on host exit.

use crate::terminate::terminate_gracefully;
use parking_lot::Mutex;
use stagehand_common::ProcessResult;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A process that can be tracked and terminated by a registry.
pub trait TrackedProcess: Send + Sync + fmt::Debug {
    /// OS process ID.
    fn pid(&self) -> u32;

    /// Human readable label for logs.
    fn label(&self) -> &str;

    /// Ask the process to terminate.
    ///
    /// [`ProcessError::NotFound`](stagehand_common::ProcessError::NotFound)
    /// means the process already exited and is not treated as a failure.
    fn terminate(&self) -> ProcessResult<()>;
}

/// A tracked OS process, terminated by PID.
///
/// The PID is only meaningful while the process is unreaped. The waiter must
/// remove it from the registry as soon as its wait returns; between the reap
/// and that removal a `kill_all` could still signal the PID, which the OS may
/// already have handed to another process. [`RegistrationGuard`] keeps that
/// window to the removal itself and also covers a waiter that is dropped.
#[derive(Debug, Clone)]
pub struct OsProcess {
    pid: u32,
    label: String,
}

impl OsProcess {
    pub fn new(pid: u32, label: impl Into<String>) -> Self {
        Self {
            pid,
            label: label.into(),
        }
    }
}

impl TrackedProcess for OsProcess {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn terminate(&self) -> ProcessResult<()> {
        terminate_gracefully(self.pid)
    }
}

/// Set of live processes owned by one stage group.
///
/// Once [`shutdown`](Self::shutdown) has run the registry is closed:
/// [`add`](Self::add) refuses new processes, so a launch racing with host
/// exit can never slip in after the final kill.
pub struct ProcessRegistry {
    name: String,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    processes: Vec<Arc<dyn TrackedProcess>>,
    closed: bool,
}

impl ProcessRegistry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Track a process. A PID that is already tracked is not added twice.
    ///
    /// Returns false, and tracks nothing, once the registry is closed. The
    /// caller then owns stopping the process.
    pub fn add(&self, process: Arc<dyn TrackedProcess>) -> bool {
        let mut inner = self.inner.lock();
        if inner.closed {
            warn!(registry = %self.name, pid = process.pid(), "Registry closed, refusing {}", process.label());
            return false;
        }
        if inner.processes.iter().any(|p| p.pid() == process.pid()) {
            debug!(registry = %self.name, pid = process.pid(), "Process already tracked");
            return true;
        }
        debug!(registry = %self.name, pid = process.pid(), "Tracking process {}", process.label());
        inner.processes.push(process);
        true
    }

    /// Stop tracking a process. Returns false if the PID was not tracked.
    pub fn remove(&self, pid: u32) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.processes.len();
        inner.processes.retain(|p| p.pid() != pid);
        inner.processes.len() != before
    }

    /// Track `process` and untrack it again when the returned guard drops.
    ///
    /// `None` if the registry is closed.
    pub fn register(self: &Arc<Self>, process: Arc<dyn TrackedProcess>) -> Option<RegistrationGuard> {
        let pid = process.pid();
        self.add(process).then(|| RegistrationGuard {
            registry: Arc::clone(self),
            pid,
        })
    }

    pub fn contains(&self, pid: u32) -> bool {
        self.inner.lock().processes.iter().any(|p| p.pid() == pid)
    }

    pub fn pids(&self) -> Vec<u32> {
        self.inner.lock().processes.iter().map(|p| p.pid()).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().processes.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Close the registry, then terminate everything it tracks.
    ///
    /// Closing and snapshotting happen under one lock, so every process is
    /// either in the snapshot or refused by [`add`](Self::add).
    pub fn shutdown(&self) -> bool {
        let snapshot = {
            let mut inner = self.inner.lock();
            inner.closed = true;
            inner.processes.clone()
        };
        self.terminate_all(snapshot)
    }

    /// Terminate every tracked process.
    ///
    /// Every process is attempted even if an earlier one fails. Returns true
    /// only if all of them were terminated or had already exited. Processes
    /// stay tracked until their waiter calls [`remove`](Self::remove).
    pub fn kill_all(&self) -> bool {
        // Snapshot so terminate() never runs under the lock.
        let snapshot = self.inner.lock().processes.clone();
        self.terminate_all(snapshot)
    }

    fn terminate_all(&self, snapshot: Vec<Arc<dyn TrackedProcess>>) -> bool {
        if snapshot.is_empty() {
            return true;
        }

        info!(registry = %self.name, count = snapshot.len(), "Killing tracked processes");

        let mut all_killed = true;
        for process in snapshot {
            match process.terminate() {
                Ok(()) => {
                    debug!(registry = %self.name, pid = process.pid(), "Terminated {}", process.label());
                }
                Err(e) if e.is_not_found() => {
                    debug!(registry = %self.name, pid = process.pid(), "{} already exited", process.label());
                }
                Err(e) => {
                    warn!(
                        registry = %self.name,
                        pid = process.pid(),
                        "Failed to terminate {}: {}",
                        process.label(),
                        e
                    );
                    all_killed = false;
                }
            }
        }
        all_killed
    }
}

impl fmt::Debug for ProcessRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessRegistry")
            .field("name", &self.name)
            .field("pids", &self.pids())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Removes a PID from its registry on drop.
#[derive(Debug)]
pub struct RegistrationGuard {
    registry: Arc<ProcessRegistry>,
    pid: u32,
}

impl RegistrationGuard {
    pub fn pid(&self) -> u32 {
        self.pid
    }
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        self.registry.remove(self.pid);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use stagehand_common::ProcessError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    pub(crate) struct MockProcess {
        pub pid: u32,
        pub outcome: Option<ProcessError>,
        pub calls: AtomicUsize,
    }

    impl MockProcess {
        pub fn ok(pid: u32) -> Arc<Self> {
            Arc::new(Self {
                pid,
                outcome: None,
                calls: AtomicUsize::new(0),
            })
        }

        pub fn failing(pid: u32, error: ProcessError) -> Arc<Self> {
            Arc::new(Self {
                pid,
                outcome: Some(error),
                calls: AtomicUsize::new(0),
            })
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl TrackedProcess for MockProcess {
        fn pid(&self) -> u32 {
            self.pid
        }

        fn label(&self) -> &str {
            "mock"
        }

        fn terminate(&self) -> ProcessResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.outcome {
                Some(e) => Err(e.clone()),
                None => Ok(()),
            }
        }
    }

    #[test]
    fn test_add_and_remove() {
        let registry = ProcessRegistry::new("ocr");
        assert!(registry.is_empty());

        assert!(registry.add(MockProcess::ok(10)));
        assert!(registry.add(MockProcess::ok(11)));
        assert!(registry.add(MockProcess::ok(10)));
        assert_eq!(registry.len(), 2);
        assert!(registry.contains(10));

        assert!(registry.remove(10));
        assert!(!registry.remove(10));
        assert_eq!(registry.pids(), vec![11]);
    }

    #[test]
    fn test_kill_all_on_empty_registry_succeeds() {
        let registry = ProcessRegistry::new("empty");
        assert!(registry.kill_all());
    }

    #[test]
    fn test_kill_all_attempts_every_process_after_a_failure() {
        let registry = ProcessRegistry::new("ocr");
        let first = MockProcess::ok(1);
        let broken = MockProcess::failing(2, ProcessError::stop_failed("2", "EPERM"));
        let last = MockProcess::ok(3);

        registry.add(first.clone());
        registry.add(broken.clone());
        registry.add(last.clone());

        assert!(!registry.kill_all());
        assert_eq!(first.calls(), 1);
        assert_eq!(broken.calls(), 1);
        assert_eq!(last.calls(), 1);
    }

    #[test]
    fn test_kill_all_treats_exited_process_as_success() {
        let registry = ProcessRegistry::new("ocr");
        registry.add(MockProcess::failing(7, ProcessError::not_found("7")));
        registry.add(MockProcess::ok(8));

        assert!(registry.kill_all());
    }

    #[test]
    fn test_shutdown_closes_registry() {
        let registry = ProcessRegistry::new("ocr");
        let tracked = MockProcess::ok(1);
        registry.add(tracked.clone());

        assert!(registry.shutdown());
        assert!(registry.is_closed());
        assert_eq!(tracked.calls(), 1);

        let late = MockProcess::ok(2);
        assert!(!registry.add(late.clone()));
        assert!(!registry.contains(2));
        assert_eq!(late.calls(), 0);
    }

    #[test]
    fn test_kill_all_keeps_registry_open() {
        let registry = ProcessRegistry::new("ocr");
        assert!(registry.kill_all());
        assert!(!registry.is_closed());
        assert!(registry.add(MockProcess::ok(1)));
    }

    #[test]
    fn test_registration_guard_untracks_on_drop() {
        let registry = Arc::new(ProcessRegistry::new("ocr"));

        let guard = registry.register(MockProcess::ok(5)).unwrap();
        assert_eq!(guard.pid(), 5);
        assert!(registry.contains(5));

        drop(guard);
        assert!(registry.is_empty());

        registry.shutdown();
        assert!(registry.register(MockProcess::ok(6)).is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_kill_all_terminates_real_child() {
        use crate::execute::LaunchCommand;

        let mut cmd = LaunchCommand::new("sleep");
        cmd.arg("30");
        let mut child = cmd.spawn("sleeper").unwrap();
        let pid = child.id().unwrap();

        let registry = ProcessRegistry::new("sleeper");
        registry.add(Arc::new(OsProcess::new(pid, "sleeper")));
        assert!(registry.kill_all());

        let status = child.wait().await.unwrap();
        assert!(!status.success());
        assert!(registry.remove(pid));
    }
}
