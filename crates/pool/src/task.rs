//! Pool-side task state: queued work, leases, and outcome snapshots.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use cuebridge_core::plan::RenderPlan;
use cuebridge_core::Timestamp;

/// Lifecycle of one task inside the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Waiting in the FIFO queue.
    Queued,
    /// Leased to a worker, which is now rendering it.
    Running,
    Succeeded,
    Failed,
    TimedOut,
    Canceled,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TaskState::Queued | TaskState::Running)
    }
}

/// A task submission: one task of one render plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRequest {
    pub plan: RenderPlan,
    pub task_index: u32,
}

/// What a worker receives when it leases a task over the control channel.
///
/// This is the plan task flattened to the fields the engine-side
/// executor needs; the worker never sees the full plan document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeasePayload {
    pub task_id: Uuid,
    pub job_id: String,
    pub task_index: u32,
    pub map_asset_path: String,
    pub level_sequence: String,
    pub shot_name: Option<String>,
    pub start_frame: Option<i64>,
    pub end_frame: Option<i64>,
    pub quality: u8,
    pub format: String,
}

/// Completion report posted by a worker when its leased task finishes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoneReport {
    pub task_id: Uuid,
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub output_path: Option<String>,
}

/// One tracked task, owned by the pool coordinator.
#[derive(Debug, Clone)]
pub struct RenderTask {
    pub id: Uuid,
    pub request: TaskRequest,
    pub state: TaskState,
    /// Last reported render progress, 0.0..=100.0.
    pub progress: Option<f64>,
    pub assigned_worker: Option<String>,
    pub submitted_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
    pub error: Option<String>,
    pub output_path: Option<String>,
}

impl RenderTask {
    pub fn new(request: TaskRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            request,
            state: TaskState::Queued,
            progress: None,
            assigned_worker: None,
            submitted_at: chrono::Utc::now(),
            started_at: None,
            finished_at: None,
            error: None,
            output_path: None,
        }
    }

    /// Lease payload for this task; the descriptor index is trusted to
    /// be valid because submission validated the plan.
    pub fn lease_payload(&self) -> LeasePayload {
        let plan = &self.request.plan;
        let descriptor = plan
            .tasks
            .iter()
            .find(|t| t.task_index == self.request.task_index);

        LeasePayload {
            task_id: self.id,
            job_id: plan.job_id.clone(),
            task_index: self.request.task_index,
            map_asset_path: plan.map_asset_path.clone(),
            level_sequence: plan.level_sequence_asset_path.clone(),
            shot_name: descriptor
                .and_then(|t| t.shot.as_ref())
                .map(|s| s.name.clone()),
            start_frame: descriptor.and_then(|t| t.frame_range.as_ref()).map(|r| r.start),
            end_frame: descriptor.and_then(|t| t.frame_range.as_ref()).map(|r| r.end),
            quality: plan.render.quality,
            format: plan.render.format.clone(),
        }
    }

    pub fn finish(&mut self, state: TaskState, error: Option<String>) {
        debug_assert!(state.is_terminal());
        self.state = state;
        self.finished_at = Some(chrono::Utc::now());
        self.error = error;
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            task_id: self.id,
            job_id: self.request.plan.job_id.clone(),
            task_index: self.request.task_index,
            state: self.state,
            progress: self.progress,
            assigned_worker: self.assigned_worker.clone(),
            submitted_at: self.submitted_at,
            started_at: self.started_at,
            finished_at: self.finished_at,
            error: self.error.clone(),
            output_path: self.output_path.clone(),
        }
    }
}

/// Serializable view of one task, returned by the status endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub task_id: Uuid,
    pub job_id: String,
    pub task_index: u32,
    pub state: TaskState,
    pub progress: Option<f64>,
    pub assigned_worker: Option<String>,
    pub submitted_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
    pub error: Option<String>,
    pub output_path: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use cuebridge_core::plan::{FrameRange, ShotInfo, TaskDescriptor};
    use std::collections::BTreeMap;

    fn plan_with_one_task() -> RenderPlan {
        let mut plan = RenderPlan {
            job_id: "job-1".to_string(),
            project: Default::default(),
            render: Default::default(),
            map_asset_path: "/Game/Maps/Main".to_string(),
            level_sequence_asset_path: "/Game/Seqs/S.S".to_string(),
            executor_class: "/Script/X.Executor".to_string(),
            tasks: vec![TaskDescriptor {
                task_index: 0,
                shot: Some(ShotInfo {
                    name: "shot020".to_string(),
                }),
                frame_range: Some(FrameRange { start: 1, end: 9 }),
                extensions: BTreeMap::new(),
            }],
        };
        plan.render.format = "mp4".to_string();
        plan
    }

    #[test]
    fn lease_payload_flattens_descriptor() {
        let task = RenderTask::new(TaskRequest {
            plan: plan_with_one_task(),
            task_index: 0,
        });
        let lease = task.lease_payload();
        assert_eq!(lease.job_id, "job-1");
        assert_eq!(lease.shot_name.as_deref(), Some("shot020"));
        assert_eq!(lease.start_frame, Some(1));
        assert_eq!(lease.end_frame, Some(9));
        assert_eq!(lease.task_id, task.id);
    }

    #[test]
    fn terminal_states() {
        assert!(!TaskState::Queued.is_terminal());
        assert!(!TaskState::Running.is_terminal());
        assert!(TaskState::Succeeded.is_terminal());
        assert!(TaskState::Canceled.is_terminal());
    }

    #[test]
    fn finish_stamps_time_and_error() {
        let mut task = RenderTask::new(TaskRequest {
            plan: plan_with_one_task(),
            task_index: 0,
        });
        task.finish(TaskState::Failed, Some("boom".to_string()));
        assert_eq!(task.state, TaskState::Failed);
        assert!(task.finished_at.is_some());
        assert_eq!(task.error.as_deref(), Some("boom"));
    }
}
