use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stagehand_common::errors::{SupervisorError, SupervisorResult};
use std::fmt;

/// Lifecycle state of a stage group supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SupervisorState {
    /// Working directory not staged yet
    Unprepared,
    /// Staged and ready to launch (also the state between attempts)
    Prepared,
    /// A child process is alive
    Running,
    /// The run loop has ended and will not launch again
    Terminated,
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SupervisorState::Unprepared => write!(f, "unprepared"),
            SupervisorState::Prepared => write!(f, "prepared"),
            SupervisorState::Running => write!(f, "running"),
            SupervisorState::Terminated => write!(f, "terminated"),
        }
    }
}

impl SupervisorState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SupervisorState::Terminated)
    }

    pub fn can_launch(&self) -> bool {
        matches!(self, SupervisorState::Prepared)
    }
}

/// Events that drive a [`SupervisorStateMachine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SupervisorEvent {
    Prepare,
    Launch,
    CheckInReceived,
    DestroyRequested,
    ProcessExited { exit_code: Option<i32> },
    Terminate,
}

impl fmt::Display for SupervisorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SupervisorEvent::Prepare => write!(f, "prepare"),
            SupervisorEvent::Launch => write!(f, "launch"),
            SupervisorEvent::CheckInReceived => write!(f, "check_in_received"),
            SupervisorEvent::DestroyRequested => write!(f, "destroy_requested"),
            SupervisorEvent::ProcessExited { exit_code: Some(code) } => {
                write!(f, "process_exited({})", code)
            }
            SupervisorEvent::ProcessExited { exit_code: None } => write!(f, "process_exited(signal)"),
            SupervisorEvent::Terminate => write!(f, "terminate"),
        }
    }
}

/// A recorded state change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from_state: SupervisorState,
    pub to_state: SupervisorState,
    pub event: SupervisorEvent,
    pub timestamp: DateTime<Utc>,
}

const MAX_HISTORY: usize = 100;

/// State machine for one stage group supervisor.
///
/// Besides the state value it keeps two sticky facts, `has_checked_in` and
/// `destroy_requested`. Exit classification depends on these, not on the
/// child's exit code.
#[derive(Debug, Clone)]
pub struct SupervisorStateMachine {
    group: String,
    current_state: SupervisorState,
    has_checked_in: bool,
    destroy_requested: bool,
    last_exit_code: Option<i32>,
    launches: u32,
    state_history: Vec<StateTransition>,
    last_transition_time: DateTime<Utc>,
}

impl SupervisorStateMachine {
    pub fn new(group: &str) -> Self {
        Self {
            group: group.to_string(),
            current_state: SupervisorState::Unprepared,
            has_checked_in: false,
            destroy_requested: false,
            last_exit_code: None,
            launches: 0,
            state_history: Vec::new(),
            last_transition_time: Utc::now(),
        }
    }

    pub fn current_state(&self) -> SupervisorState {
        self.current_state
    }

    pub fn has_checked_in(&self) -> bool {
        self.has_checked_in
    }

    pub fn destroy_requested(&self) -> bool {
        self.destroy_requested
    }

    pub fn last_exit_code(&self) -> Option<i32> {
        self.last_exit_code
    }

    /// Number of `Launch` events accepted so far.
    pub fn launches(&self) -> u32 {
        self.launches
    }

    pub fn state_history(&self) -> &[StateTransition] {
        &self.state_history
    }

    pub fn last_transition_time(&self) -> DateTime<Utc> {
        self.last_transition_time
    }

    /// The state `event` leads to from the current state, if it is allowed.
    pub fn next_state(&self, event: SupervisorEvent) -> Option<SupervisorState> {
        use SupervisorEvent as E;
        use SupervisorState as S;

        match (self.current_state, event) {
            (S::Running, E::Prepare) => None,
            (_, E::Prepare) => Some(S::Prepared),

            (S::Prepared, E::Launch) if !self.destroy_requested => Some(S::Running),
            (_, E::Launch) => None,

            (S::Running, E::ProcessExited { .. }) => Some(S::Prepared),
            (_, E::ProcessExited { .. }) => None,

            // Facts only, never a state change
            (state, E::CheckInReceived) | (state, E::DestroyRequested) => Some(state),

            (_, E::Terminate) => Some(S::Terminated),
        }
    }

    /// Apply an event, returning the new state.
    pub fn apply(&mut self, event: SupervisorEvent) -> SupervisorResult<SupervisorState> {
        let target = self.next_state(event).ok_or_else(|| {
            SupervisorError::invalid_state(
                &self.group,
                format!("a state accepting {}", event),
                self.current_state.to_string(),
            )
        })?;

        match event {
            SupervisorEvent::CheckInReceived => self.has_checked_in = true,
            SupervisorEvent::DestroyRequested => self.destroy_requested = true,
            SupervisorEvent::ProcessExited { exit_code } => self.last_exit_code = exit_code,
            SupervisorEvent::Launch => self.launches += 1,
            SupervisorEvent::Prepare | SupervisorEvent::Terminate => {}
        }

        if target != self.current_state {
            let now = Utc::now();
            self.state_history.push(StateTransition {
                from_state: self.current_state,
                to_state: target,
                event,
                timestamp: now,
            });
            if self.state_history.len() > MAX_HISTORY {
                self.state_history.remove(0);
            }

            tracing::debug!(
                group = %self.group,
                "Supervisor transitioned from {} to {} on {}",
                self.current_state,
                target,
                event
            );

            self.current_state = target;
            self.last_transition_time = now;
        }

        Ok(target)
    }

    pub fn time_in_current_state(&self) -> chrono::Duration {
        Utc::now() - self.last_transition_time
    }

    pub fn count_transitions_to(&self, state: SupervisorState) -> usize {
        self.state_history
            .iter()
            .filter(|t| t.to_state == state)
            .count()
    }
}

impl fmt::Display for SupervisorStateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] checked_in={} destroy_requested={} launches={}",
            self.group, self.current_state, self.has_checked_in, self.destroy_requested, self.launches
        )
    }
}
