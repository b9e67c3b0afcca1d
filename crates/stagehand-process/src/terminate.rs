//! Process termination primitives.
//!
//! Termination is PID based: the `Child` handle is owned by the supervisor
//! task that waits on it, so everyone else signals by PID.

use stagehand_common::{ProcessError, ProcessResult};

/// Terminate a process gracefully (SIGTERM on Unix, Ctrl+Break to its
/// process group on Windows).
///
/// Returns [`ProcessError::NotFound`] if the process no longer exists.
pub fn terminate_gracefully(pid: u32) -> ProcessResult<()> {
    #[cfg(unix)]
    {
        send_signal(pid, nix::sys::signal::Signal::SIGTERM)
    }

    #[cfg(windows)]
    {
        crate::terminate_windows::send_ctrl_break(pid)
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = pid;
        Err(ProcessError::unsupported("terminate_gracefully"))
    }
}

/// Force kill a process (SIGKILL on Unix, `TerminateProcess` on Windows).
///
/// Returns [`ProcessError::NotFound`] if the process no longer exists.
pub fn force_kill(pid: u32) -> ProcessResult<()> {
    #[cfg(unix)]
    {
        send_signal(pid, nix::sys::signal::Signal::SIGKILL)
    }

    #[cfg(windows)]
    {
        crate::terminate_windows::terminate_process(pid)
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = pid;
        Err(ProcessError::unsupported("force_kill"))
    }
}

#[cfg(unix)]
fn send_signal(pid: u32, signal: nix::sys::signal::Signal) -> ProcessResult<()> {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let raw = i32::try_from(pid)
        .map_err(|_| ProcessError::stop_failed(pid.to_string(), "PID out of range"))?;
    if raw <= 0 {
        // 0 and negative values address process groups, never a single child.
        return Err(ProcessError::stop_failed(pid.to_string(), "refusing to signal PID <= 0"));
    }

    match kill(Pid::from_raw(raw), signal) {
        Ok(()) => Ok(()),
        Err(Errno::ESRCH) => Err(ProcessError::not_found(pid.to_string())),
        Err(e) => Err(ProcessError::stop_failed(pid.to_string(), e.to_string())),
    }
}
