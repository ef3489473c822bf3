//! Single-task process supervision.
//!
//! [`TaskProcessSupervisor`] runs exactly one engine process for one
//! task: spawn, capture output, enforce the wall-clock timeout, honor
//! external cancellation, and leave behind a durable
//! [`TaskRuntimeRecord`] whatever happens. It never retries -- retry
//! policy belongs to the external scheduler, which infers the outcome
//! from the propagated exit code.

use std::path::PathBuf;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use cuebridge_core::progress::parse_progress_line;
use cuebridge_core::record::{TaskArtifacts, TaskRuntimeRecord, TaskStatus};
use cuebridge_core::CoreError;

use crate::process::{ProcessHandle, Termination};

/// Channel capacity for output lines in flight between the stream
/// readers and the log writer.
const OUTPUT_CHANNEL_CAPACITY: usize = 256;

/// How long to wait for the output pump to drain after process exit.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything needed to launch one task's process.
#[derive(Debug, Clone)]
pub struct ExecuteSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    /// Wall-clock limit before the supervisor terminates the process.
    pub timeout: Duration,
    /// Window between the graceful-stop signal and the force kill.
    pub grace: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("Failed to spawn engine process: {0}")]
    SpawnFailed(std::io::Error),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Supervises one engine process for one task execution.
pub struct TaskProcessSupervisor {
    artifacts: TaskArtifacts,
    /// Echo captured lines to our own stdout (one-shot mode, where the
    /// scheduler's log collector reads this process's output).
    echo_output: bool,
}

impl TaskProcessSupervisor {
    pub fn new(artifacts: TaskArtifacts) -> Self {
        Self {
            artifacts,
            echo_output: false,
        }
    }

    pub fn echo_output(mut self, echo: bool) -> Self {
        self.echo_output = echo;
        self
    }

    /// Execute the task to a terminal state.
    ///
    /// The runtime record is written atomically at spawn (`Running`)
    /// and again at the terminal state; a spawn failure still leaves a
    /// finalized `Failed` record behind before the error is returned.
    pub async fn execute(
        &self,
        job_id: &str,
        task_index: u32,
        spec: ExecuteSpec,
        cancel: &CancellationToken,
    ) -> Result<TaskRuntimeRecord, SupervisorError> {
        std::fs::create_dir_all(self.artifacts.job_dir())?;

        let mut record = TaskRuntimeRecord::begin(
            job_id,
            task_index,
            self.artifacts.raw_log.clone(),
            self.artifacts.supervisor_log.clone(),
        );
        record.write(&self.artifacts.record)?;

        let mut events = EventLog::open(&self.artifacts.supervisor_log)?;

        let spawned = ProcessHandle::spawn_piped(&spec.program, &spec.args, &spec.env);
        let (mut handle, stdout, stderr) = match spawned {
            Ok(parts) => parts,
            Err(e) => {
                events.emit("spawn_failed", serde_json::json!({ "error": e.to_string() }));
                record.finish(
                    TaskStatus::Failed,
                    None,
                    Some(format!("process spawn failed: {e}")),
                );
                record.write(&self.artifacts.record)?;
                return Err(SupervisorError::SpawnFailed(e));
            }
        };

        record.pid = Some(handle.pid());
        record.write(&self.artifacts.record)?;
        events.emit(
            "spawned",
            serde_json::json!({ "pid": handle.pid(), "program": spec.program.display().to_string() }),
        );
        tracing::info!(
            job_id,
            task_index,
            pid = handle.pid(),
            "Engine process spawned",
        );

        let pump = self.spawn_output_pump(stdout, stderr, job_id.to_string(), task_index);

        let outcome = tokio::select! {
            result = handle.wait() => Outcome::Exited(result),
            _ = tokio::time::sleep(spec.timeout) => Outcome::TimedOut,
            _ = cancel.cancelled() => Outcome::Canceled,
        };

        match outcome {
            Outcome::Exited(Ok(code)) => {
                events.emit("exited", serde_json::json!({ "exit_code": code }));
                let status = TaskStatus::from_exit_code(code);
                let error = (status != TaskStatus::Success)
                    .then(|| format!("engine exited with code {code}"));
                record.finish(status, Some(code), error);
            }
            Outcome::Exited(Err(e)) => {
                events.emit("wait_failed", serde_json::json!({ "error": e.to_string() }));
                record.finish(
                    TaskStatus::Failed,
                    None,
                    Some(format!("failed to reap engine process: {e}")),
                );
            }
            Outcome::TimedOut => {
                events.emit(
                    "timeout_fired",
                    serde_json::json!({ "timeout_secs": spec.timeout.as_secs() }),
                );
                tracing::warn!(
                    job_id,
                    task_index,
                    pid = handle.pid(),
                    timeout_secs = spec.timeout.as_secs(),
                    "Task timed out, terminating engine process",
                );

                events.emit("signal_sent", serde_json::json!({ "signal": "stop" }));
                let termination = handle.terminate(spec.grace).await;
                if termination == Termination::Forced {
                    events.emit("signal_sent", serde_json::json!({ "signal": "kill" }));
                }

                // TimedOut regardless of whether the grace stop or the
                // force kill ended the process.
                record.finish(
                    TaskStatus::TimedOut,
                    None,
                    Some(format!("timed out after {}s", spec.timeout.as_secs())),
                );
            }
            Outcome::Canceled => {
                events.emit("cancel_requested", serde_json::json!({}));
                tracing::warn!(
                    job_id,
                    task_index,
                    pid = handle.pid(),
                    "Cancellation requested, killing engine process",
                );

                handle.kill().await;
                events.emit("signal_sent", serde_json::json!({ "signal": "kill" }));
                record.finish(TaskStatus::Canceled, None, Some("canceled".to_string()));
            }
        }

        // The pipes close when the process dies; give the pump a bounded
        // window to flush the tail of the output.
        let _ = tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, pump).await;

        events.emit(
            "finalized",
            serde_json::json!({ "status": serde_json::to_value(record.status).unwrap_or_default() }),
        );
        record.write(&self.artifacts.record)?;

        tracing::info!(
            job_id,
            task_index,
            status = ?record.status,
            exit_code = record.exit_code,
            "Task execution finished",
        );

        Ok(record)
    }

    /// Pump both output streams into the raw log, the progress parser,
    /// and (in one-shot mode) our own stdout.
    fn spawn_output_pump(
        &self,
        stdout: tokio::process::ChildStdout,
        stderr: tokio::process::ChildStderr,
        job_id: String,
        task_index: u32,
    ) -> tokio::task::JoinHandle<()> {
        let (tx, mut rx) = mpsc::channel::<String>(OUTPUT_CHANNEL_CAPACITY);
        let tx_err = tx.clone();

        tokio::spawn(read_lines(stdout, tx));
        tokio::spawn(read_lines(stderr, tx_err));

        let raw_log_path = self.artifacts.raw_log.clone();
        let echo = self.echo_output;

        tokio::spawn(async move {
            let mut log = match tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&raw_log_path)
                .await
            {
                Ok(file) => file,
                Err(e) => {
                    tracing::error!(error = %e, path = %raw_log_path.display(), "Failed to open raw log");
                    return;
                }
            };

            while let Some(line) = rx.recv().await {
                if echo {
                    println!("{line}");
                }
                if let Some((stage, percent)) = parse_progress_line(&line) {
                    tracing::info!(job_id, task_index, ?stage, percent, "Engine progress");
                }
                let _ = log.write_all(line.as_bytes()).await;
                let _ = log.write_all(b"\n").await;
            }
            let _ = log.flush().await;
        })
    }
}

enum Outcome {
    Exited(std::io::Result<i32>),
    TimedOut,
    Canceled,
}

async fn read_lines<R>(reader: R, tx: mpsc::Sender<String>)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if tx.send(line).await.is_err() {
            break;
        }
    }
}

// ---------------------------------------------------------------------------
// Supervisor event log
// ---------------------------------------------------------------------------

/// Append-only JSON-lines log of supervisor-level events (spawn,
/// timeout fired, signals sent), kept separate from the raw engine
/// output.
struct EventLog {
    file: std::fs::File,
}

impl EventLog {
    fn open(path: &std::path::Path) -> std::io::Result<Self> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self { file })
    }

    fn emit(&mut self, event: &str, mut fields: serde_json::Value) {
        use std::io::Write;

        if let Some(map) = fields.as_object_mut() {
            map.insert(
                "ts".to_string(),
                serde_json::Value::String(chrono::Utc::now().to_rfc3339()),
            );
            map.insert(
                "event".to_string(),
                serde_json::Value::String(event.to_string()),
            );
        }
        let _ = writeln!(self.file, "{fields}");
    }
}
