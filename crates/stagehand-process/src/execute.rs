//! Process execution primitives.
//!
//! A [`LaunchCommand`] is an executable plus arguments that may carry
//! placeholder tokens (e.g. [`CLASSPATH_TOKEN`]) which are only substituted
//! right before the process is spawned.

use stagehand_common::{ProcessError, ProcessResult};
use std::fmt;
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::debug;

/// Placeholder replaced by the staged classpath at launch time.
pub const CLASSPATH_TOKEN: &str = "${classpath}";

/// Executable and argument list for a child process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    program: String,
    args: Vec<String>,
}

impl LaunchCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(&mut self, arg: impl Into<String>) -> &mut Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// Replace every occurrence of `token` in the arguments with `value`.
    ///
    /// Returns the number of arguments that changed.
    pub fn substitute(&mut self, token: &str, value: &str) -> usize {
        let mut replaced = 0;
        for arg in self.args.iter_mut().filter(|a| a.contains(token)) {
            *arg = arg.replace(token, value);
            replaced += 1;
        }
        replaced
    }

    /// Spawn the command with stdout and stderr piped and stdin closed.
    ///
    /// The child is killed if its handle is dropped, and on Linux it also
    /// receives SIGKILL when the spawning thread dies, so a crashed host
    /// cannot leave it running.
    pub fn spawn(&self, id: &str) -> ProcessResult<Child> {
        debug!("Spawning {}: {}", id, self);

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(target_os = "linux")]
        {
            // SAFETY: prctl is async-signal-safe and touches no shared state.
            unsafe {
                cmd.pre_exec(|| {
                    nix::sys::prctl::set_pdeathsig(nix::sys::signal::Signal::SIGKILL)
                        .map_err(std::io::Error::from)
                });
            }
        }

        #[cfg(windows)]
        {
            const CREATE_NEW_PROCESS_GROUP: u32 = 0x00000200;
            cmd.creation_flags(CREATE_NEW_PROCESS_GROUP);
        }

        cmd.spawn()
            .map_err(|e| ProcessError::spawn_failed(id, format!("{}: {}", self.program, e)))
    }
}

impl fmt::Display for LaunchCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " \"{}\"", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substitute_replaces_token_inside_arguments() {
        let mut cmd = LaunchCommand::new("java");
        cmd.args(["-Xmx1g", "-cp", CLASSPATH_TOKEN, "--lib=${classpath}/x"]);

        let changed = cmd.substitute(CLASSPATH_TOKEN, "/w/a.jar:/w/b.jar");

        assert_eq!(changed, 2);
        assert_eq!(
            cmd.arguments(),
            &["-Xmx1g", "-cp", "/w/a.jar:/w/b.jar", "--lib=/w/a.jar:/w/b.jar/x"]
        );
    }

    #[test]
    fn test_substitute_without_token_is_noop() {
        let mut cmd = LaunchCommand::new("java");
        cmd.arg("-version");
        assert_eq!(cmd.substitute(CLASSPATH_TOKEN, "x"), 0);
        assert_eq!(cmd.arguments(), &["-version"]);
    }

    #[test]
    fn test_display_quotes_arguments_with_spaces() {
        let mut cmd = LaunchCommand::new("java");
        cmd.args(["-cp", "a b", ""]);
        assert_eq!(cmd.to_string(), "java -cp \"a b\" \"\"");
    }

    #[tokio::test]
    async fn test_spawn_missing_executable_fails() {
        let cmd = LaunchCommand::new("/nonexistent/stagehand-launcher");
        let err = cmd.spawn("ocr").unwrap_err();
        assert!(matches!(err, ProcessError::SpawnFailed { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_spawn_pipes_output() {
        use tokio::io::AsyncReadExt;

        let mut cmd = LaunchCommand::new("/bin/sh");
        cmd.args(["-c", "echo hello"]);
        let mut child = cmd.spawn("echo").unwrap();

        let mut out = String::new();
        child
            .stdout
            .take()
            .unwrap()
            .read_to_string(&mut out)
            .await
            .unwrap();
        let status = child.wait().await.unwrap();

        assert!(status.success());
        assert_eq!(out.trim(), "hello");
    }
}
