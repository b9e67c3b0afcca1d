//! Host lifecycle: the one place that knows every process registry.
//!
//! Each stage group gets its registry from [`HostLifecycle::new_registry`].
//! When the host exits, [`HostLifecycle::host_exiting`] flips the shutdown
//! flag and kills everything still tracked, so no child outlives the host.

use crate::registry::ProcessRegistry;
use crate::shutdown::{ShutdownCoordinator, ShutdownSignal};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tracing::{info, warn};

#[derive(Debug, Default)]
pub struct HostLifecycle {
    shutdown: ShutdownSignal,
    registries: Mutex<Vec<Weak<ProcessRegistry>>>,
}

impl HostLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry that will be killed on host exit.
    ///
    /// Created after host exit began, the registry starts out closed.
    pub fn new_registry(&self, name: impl Into<String>) -> Arc<ProcessRegistry> {
        let registry = Arc::new(ProcessRegistry::new(name));
        {
            let mut registries = self.registries.lock();
            registries.retain(|r| r.strong_count() > 0);
            registries.push(Arc::downgrade(&registry));
        }
        // After the push: either host_exiting() sees this registry, or the
        // flag it raised first is visible here.
        if self.shutdown.is_shutting_down() {
            registry.shutdown();
        }
        registry
    }

    pub fn shutdown_signal(&self) -> &ShutdownSignal {
        &self.shutdown
    }

    /// Mark the host as shutting down without killing anything yet.
    pub fn begin_shutdown(&self) {
        self.shutdown.trigger();
    }

    /// Number of processes tracked across all live registries.
    pub fn tracked_processes(&self) -> usize {
        self.live_registries().iter().map(|r| r.len()).sum()
    }

    /// Begin shutdown, close every registry and kill what it tracks.
    ///
    /// Returns true if every process was terminated or had already exited.
    pub fn host_exiting(&self) -> bool {
        self.shutdown.trigger();

        let registries = self.live_registries();
        let count: usize = registries.iter().map(|r| r.len()).sum();
        if count > 0 {
            info!("Host exiting, killing {} tracked process(es)", count);
        }

        let mut all_killed = true;
        for registry in registries {
            if !registry.shutdown() {
                warn!(registry = %registry.name(), "Some processes could not be killed on host exit");
                all_killed = false;
            }
        }
        all_killed
    }

    fn live_registries(&self) -> Vec<Arc<ProcessRegistry>> {
        self.registries.lock().iter().filter_map(Weak::upgrade).collect()
    }
}

impl ShutdownCoordinator for HostLifecycle {
    fn is_shutting_down(&self) -> bool {
        self.shutdown.is_shutting_down()
    }
}

impl Drop for HostLifecycle {
    fn drop(&mut self) {
        if self.tracked_processes() > 0 {
            self.host_exiting();
        }
    }
}
