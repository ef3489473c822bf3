//! Worker slots: one long-lived engine process each.

use std::path::PathBuf;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::manager::SlotProcess;

/// Lifecycle of one worker slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotState {
    /// Process spawned, engine still booting; heartbeat checks are
    /// suppressed until the worker reports ready.
    Starting,
    /// Ready and polling for leases.
    Idle,
    /// Rendering a leased task.
    Busy,
    /// Failed a health probe; about to be killed and replaced.
    Unhealthy,
    /// Asked to exit after its current work (scale-down).
    Draining,
    /// Process gone; the slot is awaiting removal.
    Terminated,
}

impl SlotState {
    /// Whether the slot counts toward pool capacity.
    pub fn is_live(self) -> bool {
        matches!(self, SlotState::Starting | SlotState::Idle | SlotState::Busy)
    }
}

/// One worker slot, owned by the pool coordinator.
pub struct WorkerSlot {
    pub id: String,
    pub state: SlotState,
    pub process: Box<dyn SlotProcess>,
    pub log_path: PathBuf,
    pub spawned_at: Instant,
    pub last_heartbeat: Instant,
    /// When the slot last became idle; drives scale-down.
    pub idle_since: Option<Instant>,
    pub current_task: Option<Uuid>,
    pub tasks_completed: u64,
}

impl WorkerSlot {
    pub fn new(id: String, process: Box<dyn SlotProcess>, log_path: PathBuf) -> Self {
        let now = Instant::now();
        Self {
            id,
            state: SlotState::Starting,
            process,
            log_path,
            spawned_at: now,
            last_heartbeat: now,
            idle_since: None,
            current_task: None,
            tasks_completed: 0,
        }
    }

    /// The worker finished booting and is ready to lease.
    pub fn mark_ready(&mut self) {
        self.state = SlotState::Idle;
        self.last_heartbeat = Instant::now();
        self.idle_since = Some(Instant::now());
    }

    pub fn mark_busy(&mut self, task_id: Uuid) {
        self.state = SlotState::Busy;
        self.current_task = Some(task_id);
        self.idle_since = None;
    }

    /// The leased task finished; the slot goes back to leasing.
    pub fn mark_idle(&mut self) {
        self.state = SlotState::Idle;
        self.current_task = None;
        self.idle_since = Some(Instant::now());
        self.tasks_completed += 1;
    }

    pub fn touch_heartbeat(&mut self) {
        self.last_heartbeat = Instant::now();
    }

    pub fn snapshot(&self) -> WorkerSnapshot {
        WorkerSnapshot {
            worker_id: self.id.clone(),
            state: self.state,
            pid: self.process.pid(),
            current_task: self.current_task,
            uptime_secs: self.spawned_at.elapsed().as_secs(),
            heartbeat_age_secs: self.last_heartbeat.elapsed().as_secs(),
            tasks_completed: self.tasks_completed,
        }
    }
}

/// Serializable view of one slot for the status endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSnapshot {
    pub worker_id: String,
    pub state: SlotState,
    pub pid: u32,
    pub current_task: Option<Uuid>,
    pub uptime_secs: u64,
    pub heartbeat_age_secs: u64,
    pub tasks_completed: u64,
}
