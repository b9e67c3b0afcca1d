//! Exit classification and restart policy.
//!
//! The restart decision depends on two facts about the supervisor, never on
//! the child's exit code: whether a destroy was requested and whether the
//! child ever checked in with the control plane.

use std::fmt;

/// Restart budget of a stage group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Retries {
    /// Restart crashed processes forever
    #[default]
    Unlimited,
    /// Restart at most this many times
    Limited(u32),
}

impl Retries {
    /// Interpret a configured retry count: `-1` is unlimited, `N >= 0` is a
    /// budget of N restarts. Any other negative value is meaningless.
    pub fn from_count(count: i64) -> Option<Self> {
        match count {
            -1 => Some(Retries::Unlimited),
            n if n >= 0 => Some(Retries::Limited(u32::try_from(n).unwrap_or(u32::MAX))),
            _ => None,
        }
    }

    /// Whether another launch is allowed after `attempts` launches.
    pub fn allows_restart(&self, attempts: u32) -> bool {
        match self {
            Retries::Unlimited => true,
            Retries::Limited(max) => attempts <= *max,
        }
    }
}

impl fmt::Display for Retries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Retries::Unlimited => write!(f, "unlimited"),
            Retries::Limited(n) => write!(f, "{}", n),
        }
    }
}

/// Why a child process exited, as far as the supervisor is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitClassification {
    /// Killed on purpose by `destroy()`
    CleanShutdown,
    /// Died before ever checking in, i.e. broken configuration
    FailFast,
    /// Died after checking in
    Crash,
}

impl ExitClassification {
    pub fn is_restart_eligible(&self) -> bool {
        matches!(self, ExitClassification::Crash)
    }
}

impl fmt::Display for ExitClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitClassification::CleanShutdown => write!(f, "clean_shutdown"),
            ExitClassification::FailFast => write!(f, "fail_fast"),
            ExitClassification::Crash => write!(f, "crash"),
        }
    }
}

pub fn classify(destroy_requested: bool, has_checked_in: bool) -> ExitClassification {
    if destroy_requested {
        ExitClassification::CleanShutdown
    } else if !has_checked_in {
        ExitClassification::FailFast
    } else {
        ExitClassification::Crash
    }
}

/// What to do after a crash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartDecision {
    Restart,
    RetriesExhausted,
    HostShuttingDown,
}

pub fn decide_restart(retries: Retries, attempts: u32, shutting_down: bool) -> RestartDecision {
    if shutting_down {
        RestartDecision::HostShuttingDown
    } else if retries.allows_restart(attempts) {
        RestartDecision::Restart
    } else {
        RestartDecision::RetriesExhausted
    }
}
