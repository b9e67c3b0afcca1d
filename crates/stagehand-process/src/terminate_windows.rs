//! Windows process signalling.
//!
//! Children are spawned with `CREATE_NEW_PROCESS_GROUP`, so the child's PID
//! is also its console process group id and Ctrl+Break can be aimed at it
//! alone. Force kill opens the process and calls `TerminateProcess`.

use stagehand_common::{ProcessError, ProcessResult};
use windows::Win32::Foundation::{CloseHandle, HANDLE, STILL_ACTIVE};
use windows::Win32::System::Console::{GenerateConsoleCtrlEvent, CTRL_BREAK_EVENT};
use windows::Win32::System::Threading::{
    GetExitCodeProcess, OpenProcess, TerminateProcess, PROCESS_ACCESS_RIGHTS,
    PROCESS_QUERY_LIMITED_INFORMATION, PROCESS_TERMINATE,
};

/// Exit code reported by processes stopped through [`force_kill`].
const FORCE_KILL_EXIT_CODE: u32 = 1;

/// Closes the wrapped handle on drop.
struct OwnedHandle(HANDLE);

impl Drop for OwnedHandle {
    fn drop(&mut self) {
        // SAFETY: the handle came from OpenProcess and is closed once.
        unsafe {
            let _ = CloseHandle(self.0);
        }
    }
}

fn open_process(pid: u32, access: PROCESS_ACCESS_RIGHTS) -> Option<OwnedHandle> {
    // SAFETY: plain Win32 call; a failure just means no handle.
    unsafe { OpenProcess(access, false, pid) }
        .ok()
        .map(OwnedHandle)
}

pub(crate) fn process_exists(pid: u32) -> ProcessResult<bool> {
    if pid == 0 {
        return Ok(false);
    }
    let Some(handle) = open_process(pid, PROCESS_QUERY_LIMITED_INFORMATION) else {
        return Ok(false);
    };

    let mut code = 0u32;
    // SAFETY: `handle` is a live process handle with query rights.
    unsafe { GetExitCodeProcess(handle.0, &mut code) }.map_err(|e| {
        ProcessError::check_failed(pid.to_string(), format!("GetExitCodeProcess failed: {}", e))
    })?;
    Ok(code == STILL_ACTIVE.0 as u32)
}

/// Ctrl+Break to the child's process group.
pub(crate) fn send_ctrl_break(pid: u32) -> ProcessResult<()> {
    if pid == 0 {
        return Err(ProcessError::stop_failed("0", "refusing to signal PID 0"));
    }
    if !process_exists(pid)? {
        return Err(ProcessError::not_found(pid.to_string()));
    }

    // SAFETY: plain Win32 call addressing a single process group.
    unsafe { GenerateConsoleCtrlEvent(CTRL_BREAK_EVENT, pid) }.map_err(|e| {
        ProcessError::stop_failed(pid.to_string(), format!("GenerateConsoleCtrlEvent failed: {}", e))
    })
}

pub(crate) fn terminate_process(pid: u32) -> ProcessResult<()> {
    if pid == 0 {
        return Err(ProcessError::stop_failed("0", "refusing to kill PID 0"));
    }
    let Some(handle) = open_process(pid, PROCESS_TERMINATE | PROCESS_QUERY_LIMITED_INFORMATION)
    else {
        return Err(ProcessError::not_found(pid.to_string()));
    };

    // SAFETY: `handle` is a live process handle with terminate rights.
    unsafe { TerminateProcess(handle.0, FORCE_KILL_EXIT_CODE) }.map_err(|e| {
        ProcessError::stop_failed(pid.to_string(), format!("TerminateProcess failed: {}", e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_process_exists() {
        assert!(process_exists(std::process::id()).unwrap());
    }

    #[test]
    fn test_terminate_running_child() {
        let mut child = std::process::Command::new("cmd")
            .args(["/C", "ping -n 30 127.0.0.1 > NUL"])
            .spawn()
            .unwrap();

        terminate_process(child.id()).unwrap();

        let status = child.wait().unwrap();
        assert!(!status.success());
    }

    #[test]
    fn test_exited_child_is_not_found() {
        let mut child = std::process::Command::new("cmd")
            .args(["/C", "exit 0"])
            .spawn()
            .unwrap();
        let pid = child.id();
        child.wait().unwrap();
        drop(child);

        let result = send_ctrl_break(pid);
        assert!(result.is_ok() || result.unwrap_err().is_not_found());
    }
}
