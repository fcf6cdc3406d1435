//! Launching and reclaiming the external command an alarm runs.
//!
//! The command line is handed to the interpreter as `exec <command>`, so the
//! interpreter replaces itself with the target program and the child handle
//! refers to the real command rather than a shell parent.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};

use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_SHELL: &str = "/bin/sh";

#[derive(Debug, Error)]
#[error("error running {command:?} with {}: {source}", shell.display())]
pub struct SpawnError {
    pub command: String,
    pub shell: PathBuf,
    #[source]
    pub source: io::Error,
}

#[derive(Debug, Error)]
pub enum KillError {
    #[error("process {pid} had already exited ({status})")]
    AlreadyExited { pid: u32, status: ExitStatus },
    #[error("process {pid} was already released")]
    Released { pid: u32 },
    #[error("could not signal process {pid}: {source}")]
    Signal {
        pid: u32,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Error)]
#[error("could not reap process {pid}: {source}")]
pub struct ReleaseError {
    pub pid: u32,
    #[source]
    pub source: io::Error,
}

#[derive(Debug, Clone)]
pub struct ActionRunner {
    shell: PathBuf,
}

impl Default for ActionRunner {
    fn default() -> Self {
        Self::new(DEFAULT_SHELL)
    }
}

impl ActionRunner {
    pub fn new(shell: impl Into<PathBuf>) -> Self {
        Self {
            shell: shell.into(),
        }
    }

    pub fn shell(&self) -> &Path {
        &self.shell
    }

    pub fn start(&self, command_line: &str) -> Result<ActionHandle, SpawnError> {
        let child = Command::new(&self.shell)
            .arg("-c")
            .arg(format!("exec {command_line}"))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| SpawnError {
                command: command_line.to_string(),
                shell: self.shell.clone(),
                source,
            })?;
        let pid = child.id();
        debug!(pid, command = command_line, "spawned action");
        Ok(ActionHandle {
            pid,
            command: command_line.to_string(),
            child: Some(child),
        })
    }

    /// Kill then release. Release is attempted even when the kill failed.
    pub fn retire(&self, mut handle: ActionHandle) -> Retirement {
        let kill = handle.kill();
        let release = handle.release();
        Retirement { kill, release }
    }
}

#[derive(Debug)]
pub struct Retirement {
    pub kill: Result<(), KillError>,
    pub release: Result<ExitStatus, ReleaseError>,
}

/// Exclusive owner of a running action.
///
/// A handle that is dropped without [`ActionHandle::release`] kills and reaps
/// its child so no process outlives the controller.
pub struct ActionHandle {
    pid: u32,
    command: String,
    child: Option<Child>,
}

impl ActionHandle {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn kill(&mut self) -> Result<(), KillError> {
        let pid = self.pid;
        let Some(child) = self.child.as_mut() else {
            return Err(KillError::Released { pid });
        };
        match child.try_wait() {
            Ok(Some(status)) => return Err(KillError::AlreadyExited { pid, status }),
            Ok(None) => {}
            Err(source) => return Err(KillError::Signal { pid, source }),
        }
        child
            .kill()
            .map_err(|source| KillError::Signal { pid, source })
    }

    /// Takes the child away so the handle behaves as already released.
    #[cfg(test)]
    pub fn detach_child(&mut self) -> Option<Child> {
        self.child.take()
    }

    pub fn release(mut self) -> Result<ExitStatus, ReleaseError> {
        let pid = self.pid;
        let Some(mut child) = self.child.take() else {
            return Err(ReleaseError {
                pid,
                source: io::Error::other("process handle already released"),
            });
        };
        child.wait().map_err(|source| ReleaseError { pid, source })
    }
}

impl fmt::Debug for ActionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionHandle")
            .field("pid", &self.pid)
            .field("command", &self.command)
            .field("released", &self.child.is_none())
            .finish()
    }
}

impl Drop for ActionHandle {
    fn drop(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        warn!(pid = self.pid, "action handle dropped unreleased, killing");
        if let Ok(None) = child.try_wait() {
            let _ = child.kill();
        }
        let _ = child.wait();
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::{Duration, Instant};

    use super::*;

    fn wait_for_exit(handle: &mut ActionHandle) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if let Some(child) = handle.child.as_mut()
                && let Ok(Some(_)) = child.try_wait()
            {
                return;
            }
            thread::sleep(Duration::from_millis(10));
        }
        panic!("action did not exit in time");
    }

    #[test]
    fn kill_then_release_reclaims_long_running_action() {
        let runner = ActionRunner::default();
        let handle = runner.start("sleep 30").expect("spawn");
        assert!(handle.pid() > 0);
        assert_eq!(handle.command(), "sleep 30");

        let started = Instant::now();
        let retirement = runner.retire(handle);
        retirement.kill.expect("kill");
        let status = retirement.release.expect("release");
        assert!(!status.success());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn exit_status_comes_from_the_command() {
        let runner = ActionRunner::default();
        let mut handle = runner.start("sh -c 'exit 3'").expect("spawn");
        wait_for_exit(&mut handle);
        let status = handle.release().expect("release");
        assert_eq!(status.code(), Some(3));
    }

    #[test]
    fn killing_an_exited_action_fails_but_release_still_runs() {
        let runner = ActionRunner::default();
        let mut handle = runner.start("true").expect("spawn");
        wait_for_exit(&mut handle);

        let retirement = runner.retire(handle);
        let err = retirement.kill.expect_err("already exited");
        assert!(matches!(err, KillError::AlreadyExited { .. }));
        assert!(retirement.release.expect("release").success());
    }

    #[test]
    fn detached_handle_fails_both_kill_and_release() {
        let runner = ActionRunner::default();
        let mut handle = runner.start("sleep 30").expect("spawn");
        let mut child = handle.detach_child().expect("child present");
        let _ = child.kill();
        let _ = child.wait();

        let retirement = runner.retire(handle);
        assert!(matches!(
            retirement.kill,
            Err(KillError::Released { .. })
        ));
        let err = retirement.release.expect_err("nothing left to reap");
        assert!(err.to_string().contains("could not reap process"));
    }

    #[test]
    fn missing_interpreter_is_a_spawn_error() {
        let runner = ActionRunner::new("/nonexistent/wakeup-shell");
        let err = runner.start("echo hi").expect_err("spawn should fail");
        assert_eq!(err.command, "echo hi");
        assert!(err.to_string().contains("/nonexistent/wakeup-shell"));
    }

    #[test]
    fn unknown_command_still_spawns_the_interpreter() {
        let runner = ActionRunner::default();
        let mut handle = runner
            .start("wakeup-command-that-does-not-exist-12345 2>/dev/null")
            .expect("interpreter spawns");
        wait_for_exit(&mut handle);
        assert!(!handle.release().expect("release").success());
    }
}
