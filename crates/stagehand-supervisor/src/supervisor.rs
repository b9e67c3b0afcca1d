//! Stage group supervisor: prepare, launch, restart and destroy.

use crate::config::{PropertyMap, SupervisorOptions};
use crate::group::StageGroupSpec;
use crate::policy::{classify, decide_restart, ExitClassification, RestartDecision};
use crate::runtime::RuntimeConfig;
use parking_lot::Mutex;
use stagehand_common::{SupervisorError, SupervisorResult};
use stagehand_log_relay::LogRelay;
use stagehand_process::{
    force_kill, process_exists, HostLifecycle, LaunchCommand, OsProcess, ProcessRegistry,
    RegistrationGuard, ShutdownCoordinator, CLASSPATH_TOKEN,
};
use stagehand_staging::{classpath, ensure_directory, remove_files, stage_artifacts};
use stagehand_state::{SupervisorEvent, SupervisorState, SupervisorStateMachine};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Child;
use tracing::{debug, error, info, warn};

/// How long to let the relays drain a dead child's pipes before moving on.
const RELAY_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Default wait after SIGTERM before `destroy()` sends SIGKILL.
const DESTROY_GRACE_PERIOD: Duration = Duration::from_secs(10);

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Why [`ProcessSupervisor::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// `run()` was called before `prepare()`
    NotPrepared,
    /// The group has no stages; nothing was launched
    EmptyGroup,
    /// The process was stopped by `destroy()`
    Destroyed,
    /// The process died without ever checking in
    FailedToStart,
    /// The process kept crashing until the retry budget ran out
    RetriesExhausted { attempts: u32 },
    /// The process crashed while the host was shutting down
    HostShuttingDown,
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::NotPrepared => write!(f, "not prepared"),
            RunOutcome::EmptyGroup => write!(f, "empty group"),
            RunOutcome::Destroyed => write!(f, "destroyed"),
            RunOutcome::FailedToStart => write!(f, "failed to start"),
            RunOutcome::RetriesExhausted { attempts } => {
                write!(f, "retries exhausted after {} attempts", attempts)
            }
            RunOutcome::HostShuttingDown => write!(f, "host shutting down"),
        }
    }
}

/// Result of a single launch.
enum Attempt {
    Exited(ExitClassification),
    /// Host exit began before the child could be tracked
    HostShuttingDown,
}

enum Launched {
    Tracked(Child, Option<RegistrationGuard>),
    /// The registry was closed; nobody else knows about this child.
    Refused(Child),
}

/// Supervises the single OS process that runs one stage group.
///
/// The run loop owns the child handle and is the only place that waits on
/// it. Everything else (destroy, host exit) signals the child by PID through
/// the group's [`ProcessRegistry`], and the wait then returns on its own.
pub struct ProcessSupervisor {
    spec: Arc<StageGroupSpec>,
    options: Arc<SupervisorOptions>,
    working_dir: PathBuf,
    runtime: Mutex<RuntimeConfig>,
    /// Also serializes spawn+register against destroy.
    state: Mutex<SupervisorStateMachine>,
    registry: Mutex<Option<Arc<ProcessRegistry>>>,
    host: Arc<HostLifecycle>,
    shutdown: Arc<dyn ShutdownCoordinator>,
    relay: Arc<LogRelay>,
    attempts: AtomicU32,
    destroy_grace: Duration,
}

impl ProcessSupervisor {
    pub fn new(
        spec: Arc<StageGroupSpec>,
        options: Arc<SupervisorOptions>,
        host: Arc<HostLifecycle>,
    ) -> Self {
        let working_dir = options.base_directory.join(spec.name.as_str());
        let runtime = RuntimeConfig::with_parameters(options.default_runtime_parameters.clone());
        let state = SupervisorStateMachine::new(spec.name.as_str());
        let shutdown: Arc<dyn ShutdownCoordinator> = host.clone();

        Self {
            spec,
            options,
            working_dir,
            runtime: Mutex::new(runtime),
            state: Mutex::new(state),
            registry: Mutex::new(None),
            host,
            shutdown,
            relay: Arc::new(LogRelay::new()),
            attempts: AtomicU32::new(0),
            destroy_grace: DESTROY_GRACE_PERIOD,
        }
    }

    /// Consult `shutdown` instead of the host lifecycle before restarting.
    pub fn with_shutdown_coordinator(mut self, shutdown: Arc<dyn ShutdownCoordinator>) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn with_relay(mut self, relay: Arc<LogRelay>) -> Self {
        self.relay = relay;
        self
    }

    /// How long `destroy()` waits for a signalled process before SIGKILL.
    pub fn with_destroy_grace_period(mut self, grace: Duration) -> Self {
        self.destroy_grace = grace;
        self
    }

    pub fn name(&self) -> &str {
        self.spec.name.as_str()
    }

    pub fn spec(&self) -> &StageGroupSpec {
        &self.spec
    }

    pub fn working_directory(&self) -> &Path {
        &self.working_dir
    }

    pub fn state(&self) -> SupervisorState {
        self.state.lock().current_state()
    }

    /// Number of launch attempts so far.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn has_checked_in(&self) -> bool {
        self.state.lock().has_checked_in()
    }

    pub fn destroy_requested(&self) -> bool {
        self.state.lock().destroy_requested()
    }

    pub fn runtime(&self) -> RuntimeConfig {
        self.runtime.lock().clone()
    }

    pub fn registry(&self) -> Option<Arc<ProcessRegistry>> {
        self.registry.lock().clone()
    }

    /// Stage the working directory and derive the runtime configuration.
    ///
    /// Must be called before [`run`](Self::run). Not allowed while a child
    /// is running.
    pub async fn prepare(&self) -> SupervisorResult<()> {
        let group = self.name();
        {
            let state = self.state.lock();
            if state.next_state(SupervisorEvent::Prepare).is_none() {
                return Err(SupervisorError::invalid_state(
                    group,
                    "a state other than running",
                    state.current_state().to_string(),
                ));
            }
        }

        // Start from an empty directory so stale artifacts never reach the classpath
        if tokio::fs::symlink_metadata(&self.working_dir).await.is_ok() {
            remove_files(&self.working_dir).await;
        }

        ensure_directory(&self.options.base_directory, &self.working_dir)
            .await
            .map_err(|e| SupervisorError::preparation(group, e))?;

        let staged = stage_artifacts(&self.working_dir, &self.spec.artifacts)
            .await
            .map_err(|e| SupervisorError::preparation(group, e))?;

        self.registry
            .lock()
            .get_or_insert_with(|| self.host.new_registry(group));

        self.set_parameters(&self.spec.effective_configuration());

        self.state.lock().apply(SupervisorEvent::Prepare)?;

        info!(
            group = %group,
            artifacts = staged,
            directory = %self.working_dir.display(),
            "Prepared stage group"
        );
        Ok(())
    }

    /// Merge runtime settings (`java-location`, `jvm-parameters`, `retries`).
    /// Takes effect from the next launch.
    pub fn set_parameters(&self, properties: &PropertyMap) {
        let mut runtime = self.runtime.lock();
        runtime.merge(properties);
        debug!(
            group = %self.name(),
            launcher = %runtime.launcher,
            retries = %runtime.retries,
            "Runtime configuration updated"
        );
    }

    /// Record that the launched process has contacted the control plane.
    pub fn check_in(&self) {
        let mut state = self.state.lock();
        if !state.has_checked_in() {
            info!(group = %self.name(), "Stage group checked in");
        }
        // Accepted in every state
        let _ = state.apply(SupervisorEvent::CheckInReceived);
    }

    /// Run the restart loop until the group terminates for good.
    pub async fn run(&self) -> SupervisorResult<RunOutcome> {
        let group = self.name();

        if self.state() == SupervisorState::Unprepared {
            error!(
                group = %group,
                "The supervisor was not prepared prior to being started. Aborting!"
            );
            return Ok(RunOutcome::NotPrepared);
        }

        if self.spec.is_empty() {
            info!(group = %group, "Stage group {} has no stages, and can not be started.", group);
            self.terminate();
            return Ok(RunOutcome::EmptyGroup);
        }

        loop {
            if self.destroy_requested() {
                self.terminate();
                return Ok(RunOutcome::Destroyed);
            }
            if self.shutdown.is_shutting_down() {
                return Ok(self.stop_for_host_shutdown());
            }
            {
                let state = self.state.lock();
                if !state.current_state().can_launch() {
                    return Err(SupervisorError::invalid_state(
                        group,
                        "prepared",
                        state.current_state().to_string(),
                    ));
                }
            }

            let started_so_far = self.attempts.fetch_add(1, Ordering::SeqCst);
            let attempts = started_so_far + 1;
            info!(
                group = %group,
                "Starting stage group {}. Times started so far: {}",
                group,
                started_so_far
            );

            let classification = match self.run_attempt().await {
                Ok(Attempt::Exited(classification)) => classification,
                Ok(Attempt::HostShuttingDown) => return Ok(self.stop_for_host_shutdown()),
                Err(e) => {
                    self.terminate();
                    return Err(e);
                }
            };

            match classification {
                ExitClassification::CleanShutdown => {
                    info!(group = %group, "Stage group stopped by destroy request");
                    self.terminate();
                    return Ok(RunOutcome::Destroyed);
                }
                ExitClassification::FailFast => {
                    error!(
                        group = %group,
                        "The stage group {} did not start. It will not be restarted until configuration changes.",
                        group
                    );
                    self.terminate();
                    return Ok(RunOutcome::FailedToStart);
                }
                ExitClassification::Crash => {}
            }

            let retries = self.runtime.lock().retries;
            match decide_restart(retries, attempts, self.shutdown.is_shutting_down()) {
                RestartDecision::Restart => {
                    debug!(group = %group, attempts, retries = %retries, "Restarting stage group");
                }
                RestartDecision::RetriesExhausted => {
                    error!(
                        group = %group,
                        attempts,
                        "Stage group {} has failed and cannot be restarted.",
                        group
                    );
                    self.terminate();
                    return Ok(RunOutcome::RetriesExhausted { attempts });
                }
                RestartDecision::HostShuttingDown => return Ok(self.stop_for_host_shutdown()),
            }
        }
    }

    fn stop_for_host_shutdown(&self) -> RunOutcome {
        warn!(
            group = %self.name(),
            "Host is shutting down, stage group {} will not be restarted",
            self.name()
        );
        self.terminate();
        RunOutcome::HostShuttingDown
    }

    /// Launch once and wait for the child to exit.
    async fn run_attempt(&self) -> SupervisorResult<Attempt> {
        let group = self.name();

        let registry = self.registry().ok_or_else(|| {
            SupervisorError::invalid_state(group, "prepared", self.state().to_string())
        })?;

        let mut command = self.build_command();
        match classpath(&self.working_dir).await {
            Ok(cp) => {
                command.substitute(CLASSPATH_TOKEN, &cp);
            }
            Err(e) => {
                error!(group = %group, "Failed to build classpath: {}", e);
                return Ok(Attempt::Exited(self.classify_exit()));
            }
        }

        info!(group = %group, "Launching with command {}", command);

        // Spawn and register under the state lock that destroy() takes. A
        // closed registry means host exit won the race; the child is ours to stop.
        let launched = {
            let mut state = self.state.lock();
            if state.destroy_requested() {
                return Ok(Attempt::Exited(ExitClassification::CleanShutdown));
            }
            if self.shutdown.is_shutting_down() {
                return Ok(Attempt::HostShuttingDown);
            }
            if state.next_state(SupervisorEvent::Launch).is_none() {
                return Err(SupervisorError::invalid_state(
                    group,
                    "prepared",
                    state.current_state().to_string(),
                ));
            }

            let child = match command.spawn(group) {
                Ok(child) => child,
                Err(e) => {
                    error!(group = %group, "Caught error while running command: {}", e);
                    return Ok(Attempt::Exited(classify(
                        state.destroy_requested(),
                        state.has_checked_in(),
                    )));
                }
            };

            // Dropping the guard untracks the PID, so it lives until the reap.
            let registration = match child.id() {
                Some(pid) => registry.register(Arc::new(OsProcess::new(pid, group))),
                None => None,
            };
            if registration.is_some() || child.id().is_none() {
                state.apply(SupervisorEvent::Launch)?;
                Launched::Tracked(child, registration)
            } else {
                Launched::Refused(child)
            }
        };

        let (mut child, registration) = match launched {
            Launched::Tracked(child, registration) => (child, registration),
            Launched::Refused(mut child) => {
                warn!(
                    group = %group,
                    "Host exit closed the registry during launch, stopping the new process"
                );
                if let Err(e) = child.start_kill() {
                    warn!(group = %group, "Failed to kill unregistered process: {}", e);
                }
                let _ = child.wait().await;
                return Ok(Attempt::HostShuttingDown);
            }
        };

        let relays = self.relay.attach(group, child.stdout.take(), child.stderr.take());

        let waited = child.wait().await;
        drop(registration);

        for relay in relays {
            let _ = tokio::time::timeout(RELAY_DRAIN_TIMEOUT, relay).await;
        }

        let status = match waited {
            Ok(status) => status,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                error!(group = %group, "Caught interrupt while waiting for process exit");
                return Err(SupervisorError::interrupted(group));
            }
            Err(e) => {
                error!(group = %group, "Caught error while waiting for process exit: {}", e);
                let mut state = self.state.lock();
                state.apply(SupervisorEvent::ProcessExited { exit_code: None })?;
                return Ok(Attempt::Exited(classify(state.destroy_requested(), state.has_checked_in())));
            }
        };

        let classification = {
            let mut state = self.state.lock();
            state.apply(SupervisorEvent::ProcessExited {
                exit_code: status.code(),
            })?;
            classify(state.destroy_requested(), state.has_checked_in())
        };

        if classification != ExitClassification::CleanShutdown {
            let exit_value = match status.code() {
                Some(code) => code.to_string(),
                None => status.to_string(),
            };
            error!(
                group = %group,
                "Stage group {} terminated unexpectedly with exit value {}",
                group,
                exit_value
            );
        }

        Ok(Attempt::Exited(classification))
    }

    /// Kill the running process (if any) and remove the working directory.
    ///
    /// The run loop sees the exit as a clean shutdown and stops. No later
    /// launch happens, even if `run()` has not started yet.
    pub async fn destroy(&self) -> SupervisorResult<()> {
        let group = self.name();
        debug!(group = %group, "Attempting to destroy process running stage group");

        let killed = {
            let mut state = self.state.lock();
            state.apply(SupervisorEvent::DestroyRequested)?;
            match self.registry.lock().as_ref() {
                Some(registry) => registry.kill_all(),
                None => true,
            }
        };

        if !killed {
            error!(group = %group, "Process running stage group {} was not killed", group);
            return Err(SupervisorError::orphaned_process(group));
        }
        debug!(group = %group, "... destruction successful");

        if let Some(registry) = self.registry() {
            self.await_exit_or_force_kill(&registry).await;
        }

        remove_files(&self.working_dir).await;
        Ok(())
    }

    /// Give signalled processes the grace period to exit, then SIGKILL
    /// whatever is still alive.
    async fn await_exit_or_force_kill(&self, registry: &ProcessRegistry) {
        let deadline = tokio::time::Instant::now() + self.destroy_grace;
        while !registry.is_empty() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(EXIT_POLL_INTERVAL).await;
        }

        for pid in registry.pids() {
            if !matches!(process_exists(pid), Ok(true)) {
                continue;
            }
            warn!(group = %self.name(), pid, "Process ignored SIGTERM, sending SIGKILL");
            match force_kill(pid) {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => error!(group = %self.name(), pid, "Failed to kill process: {}", e),
            }
        }
    }

    fn build_command(&self) -> LaunchCommand {
        let runtime = self.runtime.lock().clone();
        let options = &self.options;

        let mut command = LaunchCommand::new(runtime.launcher.clone());
        command
            .args(runtime.launch_parameters())
            .arg("-cp")
            .arg(CLASSPATH_TOKEN)
            .arg(&options.entry_point)
            .arg(self.name())
            .arg(&options.control_plane_host)
            .arg(options.control_plane_port.to_string())
            .arg(options.performance_logging.to_string())
            .arg(options.performance_logging_port.to_string())
            .arg(&options.startup_args);
        command
    }

    fn classify_exit(&self) -> ExitClassification {
        let state = self.state.lock();
        classify(state.destroy_requested(), state.has_checked_in())
    }

    fn terminate(&self) {
        let _ = self.state.lock().apply(SupervisorEvent::Terminate);
    }
}

impl fmt::Debug for ProcessSupervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessSupervisor")
            .field("group", &self.name())
            .field("state", &self.state())
            .field("attempts", &self.attempts())
            .field("working_dir", &self.working_dir)
            .finish()
    }
}
