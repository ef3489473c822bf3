//! Task runtime records: the durable outcome document for one execution.
//!
//! A record is written twice per execution -- once at process start
//! (status `Running`) and once at the terminal state -- and never
//! mutated after finalization. Both writes go through atomic replace
//! (write to a temp file in the same directory, then rename) so a
//! concurrent status poller never observes a half-written document.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::Timestamp;

/// Terminal (or in-flight) status of one task execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Running,
    Success,
    Failed,
    TimedOut,
    Canceled,
}

impl TaskStatus {
    /// Map a process exit code to a terminal status.
    ///
    /// Supervisor-initiated terminations (timeout, cancel) are decided
    /// by the supervisor before the exit code is inspected, so this
    /// only distinguishes clean exit from crash.
    pub fn from_exit_code(code: i32) -> Self {
        if code == 0 {
            TaskStatus::Success
        } else {
            TaskStatus::Failed
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, TaskStatus::Running)
    }
}

/// The per-execution runtime record persisted next to the task logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRuntimeRecord {
    pub job_id: String,
    pub task_index: u32,
    /// Unique id for this execution attempt.
    pub task_id: String,
    pub pid: Option<u32>,
    pub started_at: Timestamp,
    pub finished_at: Option<Timestamp>,
    pub exit_code: Option<i32>,
    pub status: TaskStatus,
    pub raw_log_path: PathBuf,
    pub supervisor_log_path: PathBuf,
    /// Human-readable failure reason, when status is not Success.
    pub error: Option<String>,
}

impl TaskRuntimeRecord {
    /// Create the partial record written at process start.
    pub fn begin(
        job_id: &str,
        task_index: u32,
        raw_log_path: PathBuf,
        supervisor_log_path: PathBuf,
    ) -> Self {
        Self {
            job_id: job_id.to_string(),
            task_index,
            task_id: uuid::Uuid::new_v4().to_string(),
            pid: None,
            started_at: chrono::Utc::now(),
            finished_at: None,
            exit_code: None,
            status: TaskStatus::Running,
            raw_log_path,
            supervisor_log_path,
            error: None,
        }
    }

    /// Finalize with a terminal status. The record must not be written
    /// again after this.
    pub fn finish(&mut self, status: TaskStatus, exit_code: Option<i32>, error: Option<String>) {
        debug_assert!(status.is_terminal());
        self.finished_at = Some(chrono::Utc::now());
        self.exit_code = exit_code;
        self.status = status;
        self.error = error;
    }

    /// Persist the record via atomic replace.
    pub fn write(&self, path: &Path) -> Result<(), CoreError> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| CoreError::Validation(format!("record serialization failed: {e}")))?;
        write_atomic(path, json.as_bytes())
    }

    pub fn read(path: &Path) -> Result<Self, CoreError> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|e| CoreError::Validation(format!("record parse failed: {e}")))
    }
}

/// File layout for one task's artifacts: one subdirectory per job under
/// the work root, one file set per task index.
#[derive(Debug, Clone)]
pub struct TaskArtifacts {
    pub raw_log: PathBuf,
    pub engine_log: PathBuf,
    pub supervisor_log: PathBuf,
    pub record: PathBuf,
}

impl TaskArtifacts {
    pub fn for_task(work_root: &Path, job_id: &str, task_index: u32) -> Self {
        let dir = work_root.join(job_id);
        Self {
            raw_log: dir.join(format!("task_{task_index}.log")),
            engine_log: dir.join(format!("task_{task_index}.engine.log")),
            supervisor_log: dir.join(format!("task_{task_index}.events.jsonl")),
            record: dir.join(format!("task_{task_index}.runtime.json")),
        }
    }

    pub fn job_dir(&self) -> &Path {
        // All four files share the job directory.
        self.record.parent().expect("record path has a parent")
    }
}

/// Write `bytes` to `path` atomically: temp file in the same directory,
/// flush, then rename over the destination. Readers see either the old
/// content or the new content, never a prefix.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), CoreError> {
    let dir = path.parent().ok_or_else(|| {
        CoreError::Validation(format!("path has no parent directory: {}", path.display()))
    })?;
    std::fs::create_dir_all(dir)?;

    let tmp = dir.join(format!(
        ".{}.tmp-{}",
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "record".to_string()),
        std::process::id(),
    ));

    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_code_zero_is_success() {
        assert_eq!(TaskStatus::from_exit_code(0), TaskStatus::Success);
    }

    #[test]
    fn nonzero_exit_code_is_failed() {
        assert_eq!(TaskStatus::from_exit_code(1), TaskStatus::Failed);
        assert_eq!(TaskStatus::from_exit_code(137), TaskStatus::Failed);
        assert_eq!(TaskStatus::from_exit_code(-1), TaskStatus::Failed);
    }

    #[test]
    fn record_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("task_0.runtime.json");

        let mut record =
            TaskRuntimeRecord::begin("job-9", 0, "raw.log".into(), "events.jsonl".into());
        record.pid = Some(4242);
        record.write(&path).unwrap();

        let running = TaskRuntimeRecord::read(&path).unwrap();
        assert_eq!(running.status, TaskStatus::Running);
        assert_eq!(running.pid, Some(4242));

        record.finish(TaskStatus::Failed, Some(137), Some("exit code 137".into()));
        record.write(&path).unwrap();

        let done = TaskRuntimeRecord::read(&path).unwrap();
        assert_eq!(done.status, TaskStatus::Failed);
        assert_eq!(done.exit_code, Some(137));
        assert!(done.finished_at.is_some());
    }

    #[test]
    fn artifacts_layout_is_one_dir_per_job() {
        let artifacts = TaskArtifacts::for_task(Path::new("/data/work"), "job-3", 7);
        assert_eq!(
            artifacts.record,
            Path::new("/data/work/job-3/task_7.runtime.json")
        );
        assert_eq!(artifacts.job_dir(), Path::new("/data/work/job-3"));
    }

    #[test]
    fn write_atomic_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a/b/record.json");
        write_atomic(&path, b"{}").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"{}");
    }

    #[test]
    fn write_atomic_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("record.json");
        write_atomic(&path, b"one").unwrap();
        write_atomic(&path, b"two").unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries.len(), 1, "only the final file should remain");
        assert_eq!(std::fs::read(&path).unwrap(), b"two");
    }
}
