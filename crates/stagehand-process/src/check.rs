//! Process existence checking.

use stagehand_common::ProcessResult;

/// Check if a process with the given PID exists and is running.
///
/// On Unix this uses `kill(pid, 0)`, which sends no signal but reports
/// whether the process exists. On Windows the process must still report
/// `STILL_ACTIVE` as its exit code.
///
/// # Returns
///
/// * `Ok(true)` - Process exists
/// * `Ok(false)` - Process does not exist
/// * `Err(_)` - The check itself failed
///
/// # Examples
///
/// ```rust,no_run
/// use stagehand_process::process_exists;
///
/// if process_exists(1234).unwrap() {
///     println!("Process 1234 is running");
/// }
/// ```
pub fn process_exists(pid: u32) -> ProcessResult<bool> {
    #[cfg(unix)]
    {
        process_exists_unix(pid)
    }

    #[cfg(windows)]
    {
        crate::terminate_windows::process_exists(pid)
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = pid;
        Err(stagehand_common::ProcessError::unsupported("process_exists"))
    }
}

#[cfg(unix)]
fn process_exists_unix(pid: u32) -> ProcessResult<bool> {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return Ok(false);
    };
    if raw <= 0 {
        return Ok(false);
    }

    match kill(Pid::from_raw(raw), None) {
        Ok(_) => Ok(true),
        Err(nix::errno::Errno::ESRCH) => Ok(false),
        // Exists, but owned by someone else
        Err(nix::errno::Errno::EPERM) => Ok(true),
        Err(e) => Err(stagehand_common::ProcessError::check_failed(
            pid.to_string(),
            format!("Failed to check process: {}", e),
        )),
    }
}
