//! Scoped engine child processes.
//!
//! [`ProcessHandle`] wraps one spawned engine process as a resource:
//! acquired on spawn, guaranteed reaped on every exit path.
//! `kill_on_drop(true)` means a handle dropped early (panic, timeout,
//! shutdown) still kills the child rather than leaking it.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, ChildStderr, ChildStdout, Command};

/// How a [`ProcessHandle::terminate`] call ended the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The process exited within the grace window after the stop signal.
    Graceful,
    /// The process had to be force-killed.
    Forced,
    /// The process had already exited before termination began.
    AlreadyExited,
}

/// One spawned engine process, exclusively owned by its supervisor or slot.
pub struct ProcessHandle {
    child: Child,
    pid: u32,
}

impl ProcessHandle {
    /// Spawn with combined stdout/stderr redirected to `log_path`.
    ///
    /// Used for pool workers, where nothing consumes the output live and
    /// the log file is the only sink.
    pub fn spawn_to_log(
        program: &Path,
        args: &[String],
        env: &[(String, String)],
        log_path: &Path,
    ) -> std::io::Result<Self> {
        if let Some(dir) = log_path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let log = std::fs::File::create(log_path)?;
        let log_err = log.try_clone()?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .kill_on_drop(true);
        for (key, value) in env {
            cmd.env(key, value);
        }

        Self::finish_spawn(cmd)
    }

    /// Spawn with piped stdout/stderr for live consumption.
    ///
    /// Used by the one-shot supervisor, which streams the output to the
    /// raw log, its own stdout, and the progress parser.
    pub fn spawn_piped(
        program: &Path,
        args: &[String],
        env: &[(String, String)],
    ) -> std::io::Result<(Self, ChildStdout, ChildStderr)> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in env {
            cmd.env(key, value);
        }

        let mut handle = Self::finish_spawn(cmd)?;
        let stdout = handle.child.stdout.take().expect("stdout was piped");
        let stderr = handle.child.stderr.take().expect("stderr was piped");
        Ok((handle, stdout, stderr))
    }

    fn finish_spawn(mut cmd: Command) -> std::io::Result<Self> {
        let child = cmd.spawn()?;
        let pid = child.id().ok_or_else(|| {
            std::io::Error::other("child exited before its pid could be read")
        })?;
        Ok(Self { child, pid })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Non-blocking liveness check. Returns `false` once the child has
    /// exited (and reaps it).
    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Wait for the process to exit and return its raw exit code
    /// (`-1` when killed by a signal with no code).
    pub async fn wait(&mut self) -> std::io::Result<i32> {
        let status = self.child.wait().await?;
        Ok(status.code().unwrap_or(-1))
    }

    /// Send the platform's graceful-stop signal without waiting.
    ///
    /// On Unix this is SIGTERM; elsewhere there is no graceful signal
    /// and this is a no-op (terminate falls through to the force kill).
    pub fn signal_stop(&self) {
        #[cfg(unix)]
        unsafe {
            libc::kill(self.pid as libc::pid_t, libc::SIGTERM);
        }
    }

    /// Terminate the process: graceful-stop signal, bounded grace
    /// window, then force kill. Always reaps the child.
    pub async fn terminate(&mut self, grace: Duration) -> Termination {
        if !self.is_running() {
            return Termination::AlreadyExited;
        }

        #[cfg(unix)]
        {
            self.signal_stop();
            if tokio::time::timeout(grace, self.child.wait()).await.is_ok() {
                return Termination::Graceful;
            }
        }
        #[cfg(not(unix))]
        let _ = grace;

        // Force kill; `kill()` also awaits the exit so the child is reaped.
        let _ = self.child.kill().await;
        Termination::Forced
    }

    /// Force-kill immediately, skipping the graceful signal.
    pub async fn kill(&mut self) {
        let _ = self.child.kill().await;
    }

    /// Begin a force kill without awaiting the exit. The runtime reaps
    /// the child in the background (`kill_on_drop` covers the drop path).
    pub fn start_kill(&mut self) {
        let _ = self.child.start_kill();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
