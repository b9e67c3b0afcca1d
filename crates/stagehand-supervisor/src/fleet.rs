//! Runs many stage group supervisors side by side.

use crate::config::SupervisorOptions;
use crate::group::StageGroupSpec;
use crate::supervisor::{ProcessSupervisor, RunOutcome};
use parking_lot::Mutex;
use serde::Serialize;
use stagehand_common::{SupervisorError, SupervisorResult};
use stagehand_log_relay::LogRelay;
use stagehand_process::{HostLifecycle, ShutdownCoordinator};
use stagehand_state::SupervisorState;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

type RunTask = JoinHandle<SupervisorResult<RunOutcome>>;

struct FleetEntry {
    supervisor: Arc<ProcessSupervisor>,
    task: Option<RunTask>,
}

/// Point-in-time view of one supervised group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupStatus {
    pub name: String,
    pub state: SupervisorState,
    pub attempts: u32,
    pub checked_in: bool,
}

/// All stage groups supervised by this host, one run task each.
pub struct Fleet {
    options: Arc<SupervisorOptions>,
    host: Arc<HostLifecycle>,
    relay: Arc<LogRelay>,
    groups: Mutex<BTreeMap<String, FleetEntry>>,
}

impl Fleet {
    pub fn new(options: SupervisorOptions, host: Arc<HostLifecycle>) -> Self {
        Self {
            options: Arc::new(options),
            host,
            relay: Arc::new(LogRelay::new()),
            groups: Mutex::new(BTreeMap::new()),
        }
    }

    /// Share one relay (and its output writers) across every group.
    pub fn with_relay(mut self, relay: Arc<LogRelay>) -> Self {
        self.relay = relay;
        self
    }

    pub fn options(&self) -> &SupervisorOptions {
        &self.options
    }

    pub fn host(&self) -> &Arc<HostLifecycle> {
        &self.host
    }

    /// Prepare a supervisor for `spec` and start its run loop.
    pub async fn launch(&self, spec: StageGroupSpec) -> SupervisorResult<Arc<ProcessSupervisor>> {
        let name = spec.name.to_string();
        let supervisor = Arc::new(
            ProcessSupervisor::new(Arc::new(spec), Arc::clone(&self.options), Arc::clone(&self.host))
                .with_relay(Arc::clone(&self.relay)),
        );

        {
            let mut groups = self.groups.lock();
            if groups.contains_key(&name) {
                return Err(SupervisorError::duplicate_group(name));
            }
            // Reserve the name while preparing
            groups.insert(
                name.clone(),
                FleetEntry {
                    supervisor: Arc::clone(&supervisor),
                    task: None,
                },
            );
        }

        if let Err(e) = supervisor.prepare().await {
            self.groups.lock().remove(&name);
            return Err(e);
        }

        let runner = Arc::clone(&supervisor);
        let task = tokio::spawn(async move { runner.run().await });

        match self.groups.lock().get_mut(&name) {
            Some(entry) => entry.task = Some(task),
            // Destroyed while preparing; the run loop exits on its own
            None => drop(task),
        }

        info!(group = %name, "Stage group launched");
        Ok(supervisor)
    }

    pub fn get(&self, group: &str) -> Option<Arc<ProcessSupervisor>> {
        self.groups.lock().get(group).map(|e| Arc::clone(&e.supervisor))
    }

    /// Route a control plane check-in to its group.
    pub fn check_in(&self, group: &str) -> SupervisorResult<()> {
        let supervisor = self
            .get(group)
            .ok_or_else(|| SupervisorError::unknown_group(group))?;
        supervisor.check_in();
        Ok(())
    }

    /// Destroy one group and wait for its run loop to finish.
    pub async fn destroy(&self, group: &str) -> SupervisorResult<Option<RunOutcome>> {
        let supervisor = self
            .get(group)
            .ok_or_else(|| SupervisorError::unknown_group(group))?;

        supervisor.destroy().await?;

        let task = self.groups.lock().remove(group).and_then(|e| e.task);
        match task {
            Some(task) => join_run_task(group, task).await.map(Some),
            None => Ok(None),
        }
    }

    /// Wait for a group's run loop to end on its own.
    pub async fn wait(&self, group: &str) -> SupervisorResult<RunOutcome> {
        let task = {
            let mut groups = self.groups.lock();
            let entry = groups
                .get_mut(group)
                .ok_or_else(|| SupervisorError::unknown_group(group))?;
            entry.task.take()
        };

        match task {
            Some(task) => join_run_task(group, task).await,
            None => Err(SupervisorError::task_failed(group, "run task already awaited")),
        }
    }

    /// Status of every group, ordered by name.
    pub fn groups(&self) -> Vec<GroupStatus> {
        self.groups
            .lock()
            .values()
            .map(|e| GroupStatus {
                name: e.supervisor.name().to_string(),
                state: e.supervisor.state(),
                attempts: e.supervisor.attempts(),
                checked_in: e.supervisor.has_checked_in(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.groups.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.lock().is_empty()
    }

    /// Stop restarts, destroy every group and wait for all run loops.
    ///
    /// Every group is attempted; the first orphaned-process error is
    /// returned after all of them have been handled.
    pub async fn shutdown(&self) -> SupervisorResult<()> {
        self.host.begin_shutdown();

        let entries: Vec<(String, FleetEntry)> =
            std::mem::take(&mut *self.groups.lock()).into_iter().collect();
        info!("Shutting down {} stage group(s)", entries.len());

        let mut first_error = None;
        for (name, entry) in entries {
            if let Err(e) = entry.supervisor.destroy().await {
                error!(group = %name, "Failed to destroy stage group: {}", e);
                first_error.get_or_insert(e);
                continue;
            }
            if let Some(task) = entry.task {
                match join_run_task(&name, task).await {
                    Ok(outcome) => info!(group = %name, "Stage group stopped: {}", outcome),
                    Err(e) => warn!(group = %name, "Stage group ended with error: {}", e),
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

async fn join_run_task(group: &str, task: RunTask) -> SupervisorResult<RunOutcome> {
    task.await
        .map_err(|e| SupervisorError::task_failed(group, e.to_string()))?
}

impl std::fmt::Debug for Fleet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fleet")
            .field("groups", &self.groups.lock().keys().collect::<Vec<_>>())
            .field("shutting_down", &self.host.is_shutting_down())
            .finish()
    }
}
