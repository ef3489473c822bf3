//! The pool coordinator.
//!
//! One long-lived task owns every slot, every tracked task, and the
//! FIFO queue. All access goes through [`PoolCommand`] messages, so
//! there are no locks and no partially-observed state: a command sees
//! the pool before or after another command, never during.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use cuebridge_engine::command::worker_args;
use cuebridge_engine::process::ProcessHandle;

use crate::backoff::SpawnBackoff;
use crate::dispatch::{DispatchHandle, PoolError};
use crate::orphan;
use crate::health::{self, HealthVerdict};
use crate::slot::{SlotState, WorkerSlot, WorkerSnapshot};
use crate::task::{DoneReport, LeasePayload, RenderTask, TaskRequest, TaskSnapshot, TaskState};

/// Command channel depth between handles and the coordinator.
const COMMAND_CHANNEL_CAPACITY: usize = 128;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub min_workers: usize,
    pub max_workers: usize,
    /// Submissions beyond this queue depth are rejected.
    pub max_queue_depth: usize,
    /// Queue depth above which the pool scales up (one worker per tick).
    pub backlog_threshold: usize,
    pub heartbeat_interval: Duration,
    pub missed_heartbeat_threshold: u32,
    /// How long a `Starting` worker may boot before it is replaced.
    pub startup_grace: Duration,
    /// How long a worker may sit idle before scale-down (never below
    /// `min_workers`).
    pub idle_scale_down_timeout: Duration,
    /// Wall-clock limit for one leased task.
    pub task_timeout: Duration,
    /// How long `submit_and_wait` blocks before giving up on the result.
    pub dispatch_timeout: Duration,
    pub tick_interval: Duration,
    /// Directory for per-worker log files.
    pub log_root: PathBuf,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_workers: 1,
            max_workers: 4,
            max_queue_depth: 64,
            backlog_threshold: 2,
            heartbeat_interval: Duration::from_secs(15),
            missed_heartbeat_threshold: 4,
            startup_grace: Duration::from_secs(300),
            idle_scale_down_timeout: Duration::from_secs(600),
            task_timeout: Duration::from_secs(3600),
            dispatch_timeout: Duration::from_secs(7200),
            tick_interval: Duration::from_secs(1),
            log_root: PathBuf::from("."),
        }
    }
}

// ---------------------------------------------------------------------------
// Launch seam
// ---------------------------------------------------------------------------

/// The process underneath one slot, as the coordinator sees it.
///
/// A trait rather than [`ProcessHandle`] directly so tests can drive the
/// pool without spawning real engine binaries.
pub trait SlotProcess: Send + 'static {
    fn pid(&self) -> u32;
    fn is_running(&mut self) -> bool;
    /// Ask the process to exit (graceful signal); does not wait.
    fn signal_stop(&mut self);
    /// Begin a force kill; does not wait for the exit.
    fn force_kill(&mut self);
}

impl SlotProcess for ProcessHandle {
    fn pid(&self) -> u32 {
        ProcessHandle::pid(self)
    }

    fn is_running(&mut self) -> bool {
        ProcessHandle::is_running(self)
    }

    fn signal_stop(&mut self) {
        ProcessHandle::signal_stop(self);
    }

    fn force_kill(&mut self) {
        self.start_kill();
    }
}

/// Spawns one worker process for a slot.
pub trait WorkerLauncher: Send + Sync + 'static {
    fn launch(&self, worker_id: &str, log_path: &Path) -> std::io::Result<Box<dyn SlotProcess>>;
}

/// Production launcher: boots the engine binary in worker mode, output
/// redirected to the slot's log file.
pub struct EngineWorkerLauncher {
    pub program: PathBuf,
    pub pool_base_url: String,
    pub executor_class: String,
    pub headless: bool,
}

impl WorkerLauncher for EngineWorkerLauncher {
    fn launch(&self, worker_id: &str, log_path: &Path) -> std::io::Result<Box<dyn SlotProcess>> {
        // The engine writes its own log next to the stdout capture.
        let engine_log = log_path.with_extension("engine.log");
        let args = worker_args(
            worker_id,
            &self.pool_base_url,
            &self.executor_class,
            &engine_log,
            self.headless,
        );
        let handle = ProcessHandle::spawn_to_log(&self.program, &args, &[], log_path)?;
        Ok(Box::new(handle))
    }
}

// ---------------------------------------------------------------------------
// Commands and snapshots
// ---------------------------------------------------------------------------

pub(crate) enum PoolCommand {
    Submit {
        request: TaskRequest,
        completion: Option<oneshot::Sender<TaskSnapshot>>,
        reply: oneshot::Sender<Result<Uuid, PoolError>>,
    },
    Cancel {
        task_id: Uuid,
        reply: oneshot::Sender<Result<TaskSnapshot, PoolError>>,
    },
    GetTask {
        task_id: Uuid,
        reply: oneshot::Sender<Result<TaskSnapshot, PoolError>>,
    },
    ListTasks {
        reply: oneshot::Sender<Vec<TaskSnapshot>>,
    },
    Status {
        reply: oneshot::Sender<PoolSnapshot>,
    },
    ListWorkers {
        reply: oneshot::Sender<Vec<WorkerSnapshot>>,
    },
    WorkerReady {
        worker_id: String,
        reply: oneshot::Sender<Result<(), PoolError>>,
    },
    Lease {
        worker_id: String,
        reply: oneshot::Sender<Result<Option<LeasePayload>, PoolError>>,
    },
    Heartbeat {
        worker_id: String,
        progress: Option<f64>,
        reply: oneshot::Sender<Result<(), PoolError>>,
    },
    Done {
        worker_id: String,
        report: DoneReport,
        reply: oneshot::Sender<Result<(), PoolError>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Pool-wide status for `/status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSnapshot {
    pub workers: Vec<WorkerSnapshot>,
    pub queued_tasks: usize,
    pub running_tasks: usize,
    pub min_workers: usize,
    pub max_workers: usize,
    pub max_queue_depth: usize,
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

pub struct PoolManager {
    config: PoolConfig,
    launcher: Arc<dyn WorkerLauncher>,
    rx: mpsc::Receiver<PoolCommand>,
    shutdown: CancellationToken,

    slots: HashMap<String, WorkerSlot>,
    tasks: HashMap<Uuid, RenderTask>,
    queue: VecDeque<Uuid>,
    completions: HashMap<Uuid, oneshot::Sender<TaskSnapshot>>,

    next_slot: u64,
    backoff: SpawnBackoff,
    spawn_blocked_until: Option<Instant>,
}

impl PoolManager {
    /// Start the coordinator task and return the handle everything else
    /// uses to talk to it.
    pub fn spawn(
        config: PoolConfig,
        launcher: Arc<dyn WorkerLauncher>,
        shutdown: CancellationToken,
    ) -> DispatchHandle {
        let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let dispatch_timeout = config.dispatch_timeout;

        let manager = Self {
            config,
            launcher,
            rx,
            shutdown,
            slots: HashMap::new(),
            tasks: HashMap::new(),
            queue: VecDeque::new(),
            completions: HashMap::new(),
            next_slot: 0,
            backoff: SpawnBackoff::default(),
            spawn_blocked_until: None,
        };
        tokio::spawn(manager.run());

        DispatchHandle::new(tx, dispatch_timeout)
    }

    async fn run(mut self) {
        tracing::info!(
            min_workers = self.config.min_workers,
            max_workers = self.config.max_workers,
            "Worker pool starting",
        );

        // The baseline fleet comes up immediately; ticks only handle
        // replacements and backlog growth after this.
        for _ in 0..self.config.min_workers {
            self.spawn_one();
        }

        let mut tick = tokio::time::interval(self.config.tick_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    self.drain();
                    break;
                }
                maybe_cmd = self.rx.recv() => match maybe_cmd {
                    Some(cmd) => {
                        if self.handle(cmd) {
                            self.drain();
                            break;
                        }
                    }
                    None => break,
                },
                _ = tick.tick() => self.tick(),
            }
        }

        tracing::info!("Worker pool stopped");
    }

    /// Handle one command. Returns true when the pool should shut down.
    fn handle(&mut self, cmd: PoolCommand) -> bool {
        match cmd {
            PoolCommand::Submit {
                request,
                completion,
                reply,
            } => {
                let _ = reply.send(self.submit(request, completion));
            }
            PoolCommand::Cancel { task_id, reply } => {
                let _ = reply.send(self.cancel(task_id));
            }
            PoolCommand::GetTask { task_id, reply } => {
                let result = self
                    .tasks
                    .get(&task_id)
                    .map(RenderTask::snapshot)
                    .ok_or(PoolError::TaskNotFound(task_id));
                let _ = reply.send(result);
            }
            PoolCommand::ListTasks { reply } => {
                let mut snapshots: Vec<_> =
                    self.tasks.values().map(RenderTask::snapshot).collect();
                snapshots.sort_by_key(|t| t.submitted_at);
                let _ = reply.send(snapshots);
            }
            PoolCommand::Status { reply } => {
                let _ = reply.send(self.status());
            }
            PoolCommand::ListWorkers { reply } => {
                let _ = reply.send(self.slots.values().map(WorkerSlot::snapshot).collect());
            }
            PoolCommand::WorkerReady { worker_id, reply } => {
                let _ = reply.send(self.worker_ready(&worker_id));
            }
            PoolCommand::Lease { worker_id, reply } => {
                let _ = reply.send(self.lease(&worker_id));
            }
            PoolCommand::Heartbeat {
                worker_id,
                progress,
                reply,
            } => {
                let _ = reply.send(self.heartbeat(&worker_id, progress));
            }
            PoolCommand::Done {
                worker_id,
                report,
                reply,
            } => {
                let _ = reply.send(self.done(&worker_id, report));
            }
            PoolCommand::Shutdown { reply } => {
                let _ = reply.send(());
                return true;
            }
        }
        false
    }

    // -- submission ---------------------------------------------------------

    fn submit(
        &mut self,
        request: TaskRequest,
        completion: Option<oneshot::Sender<TaskSnapshot>>,
    ) -> Result<Uuid, PoolError> {
        // Shed load only when the queue is full and nothing can drain
        // it: no Idle slot and no room to grow the pool.
        if self.queue.len() >= self.config.max_queue_depth && !self.has_capacity() {
            return Err(PoolError::PoolSaturated {
                depth: self.queue.len(),
            });
        }

        request
            .plan
            .validate()
            .map_err(|e| PoolError::InvalidRequest(e.to_string()))?;
        if request.plan.task(request.task_index).is_none() {
            return Err(PoolError::InvalidRequest(format!(
                "task index {} out of range for plan with {} tasks",
                request.task_index,
                request.plan.tasks.len(),
            )));
        }

        let task = RenderTask::new(request);
        let task_id = task.id;
        tracing::info!(
            %task_id,
            job_id = %task.request.plan.job_id,
            task_index = task.request.task_index,
            queue_depth = self.queue.len() + 1,
            "Task queued",
        );

        if let Some(tx) = completion {
            self.completions.insert(task_id, tx);
        }
        self.tasks.insert(task_id, task);
        self.queue.push_back(task_id);
        Ok(task_id)
    }

    fn cancel(&mut self, task_id: Uuid) -> Result<TaskSnapshot, PoolError> {
        let state = self
            .tasks
            .get(&task_id)
            .map(|t| t.state)
            .ok_or(PoolError::TaskNotFound(task_id))?;

        match state {
            TaskState::Queued => {
                self.queue.retain(|id| *id != task_id);
                self.finish_task(task_id, TaskState::Canceled, Some("canceled".to_string()));
            }
            TaskState::Running => {
                // The worker's engine process is the task's process, so a
                // running cancel kills the slot; a replacement is spawned
                // by the next scale pass.
                if let Some(slot) = self
                    .slots
                    .values_mut()
                    .find(|s| s.current_task == Some(task_id))
                {
                    tracing::warn!(%task_id, worker_id = %slot.id, "Killing worker for canceled task");
                    slot.process.signal_stop();
                    slot.process.force_kill();
                    slot.state = SlotState::Terminated;
                    slot.current_task = None;
                }
                self.finish_task(task_id, TaskState::Canceled, Some("canceled".to_string()));
            }
            // Cancel of a finished task is a no-op.
            _ => {}
        }

        Ok(self.tasks[&task_id].snapshot())
    }

    // -- worker control channel ----------------------------------------------

    fn worker_ready(&mut self, worker_id: &str) -> Result<(), PoolError> {
        let slot = self
            .slots
            .get_mut(worker_id)
            .ok_or_else(|| PoolError::UnknownWorker(worker_id.to_string()))?;
        tracing::info!(worker_id, pid = slot.process.pid(), "Worker ready");
        slot.mark_ready();
        self.backoff.reset();
        Ok(())
    }

    fn lease(&mut self, worker_id: &str) -> Result<Option<LeasePayload>, PoolError> {
        let slot = self
            .slots
            .get_mut(worker_id)
            .ok_or_else(|| PoolError::UnknownWorker(worker_id.to_string()))?;

        // A lease from a Starting worker implies it booted; treat it as
        // an implicit ready report.
        if slot.state == SlotState::Starting {
            slot.mark_ready();
            self.backoff.reset();
        }
        slot.touch_heartbeat();

        if slot.state != SlotState::Idle {
            return Ok(None);
        }

        let Some(task_id) = self.queue.pop_front() else {
            return Ok(None);
        };
        let slot_id = slot.id.clone();
        slot.mark_busy(task_id);

        let task = self
            .tasks
            .get_mut(&task_id)
            .expect("queued task id is tracked");
        task.state = TaskState::Running;
        task.started_at = Some(chrono::Utc::now());
        task.assigned_worker = Some(slot_id.clone());

        tracing::info!(
            %task_id,
            worker_id = %slot_id,
            job_id = %task.request.plan.job_id,
            "Task leased",
        );
        Ok(Some(task.lease_payload()))
    }

    fn heartbeat(&mut self, worker_id: &str, progress: Option<f64>) -> Result<(), PoolError> {
        let slot = self
            .slots
            .get_mut(worker_id)
            .ok_or_else(|| PoolError::UnknownWorker(worker_id.to_string()))?;
        slot.touch_heartbeat();

        if let (Some(task_id), Some(progress)) = (slot.current_task, progress) {
            if let Some(task) = self.tasks.get_mut(&task_id) {
                task.progress = Some(progress.clamp(0.0, 100.0));
            }
        }
        Ok(())
    }

    fn done(&mut self, worker_id: &str, report: DoneReport) -> Result<(), PoolError> {
        let slot = self
            .slots
            .get_mut(worker_id)
            .ok_or_else(|| PoolError::UnknownWorker(worker_id.to_string()))?;

        if slot.current_task != Some(report.task_id) {
            return Err(PoolError::InvalidRequest(format!(
                "worker {worker_id} reported completion for task {} it does not hold",
                report.task_id,
            )));
        }
        slot.mark_idle();

        let (state, error) = if report.success {
            (TaskState::Succeeded, None)
        } else {
            (
                TaskState::Failed,
                Some(
                    report
                        .error
                        .unwrap_or_else(|| "worker reported failure".to_string()),
                ),
            )
        };

        if let Some(task) = self.tasks.get_mut(&report.task_id) {
            task.output_path = report.output_path;
        }
        self.finish_task(report.task_id, state, error);
        Ok(())
    }

    // -- periodic maintenance -------------------------------------------------

    fn tick(&mut self) {
        self.probe_health();
        self.enforce_task_timeouts();
        self.reap_terminated();
        self.scale_up();
        self.scale_down();
    }

    fn probe_health(&mut self) {
        let now = Instant::now();
        let mut failed: Vec<(String, String)> = Vec::new();

        for slot in self.slots.values_mut() {
            match health::probe(slot, now, &self.config) {
                HealthVerdict::Healthy => {}
                HealthVerdict::ProcessDead => {
                    failed.push((slot.id.clone(), "process exited".to_string()));
                }
                HealthVerdict::StartupTimedOut => {
                    failed.push((
                        slot.id.clone(),
                        format!(
                            "did not become ready within {}s",
                            self.config.startup_grace.as_secs()
                        ),
                    ));
                }
                HealthVerdict::MissedHeartbeats { missed } => {
                    failed.push((slot.id.clone(), format!("missed {missed} heartbeats")));
                }
            }
        }

        for (worker_id, reason) in failed {
            self.fail_slot(&worker_id, &reason);
        }

        // Draining or unhealthy workers whose process has exited are
        // ready for the reap pass.
        for slot in self.slots.values_mut() {
            if matches!(slot.state, SlotState::Draining | SlotState::Unhealthy)
                && !slot.process.is_running()
            {
                slot.state = SlotState::Terminated;
            }
        }
    }

    /// Kill a slot that failed a health probe and fail its task.
    fn fail_slot(&mut self, worker_id: &str, reason: &str) {
        let Some(slot) = self.slots.get_mut(worker_id) else {
            return;
        };
        tracing::warn!(worker_id, reason, "Worker unhealthy, replacing");

        let was_starting = slot.state == SlotState::Starting;
        let task_id = slot.current_task.take();
        slot.process.signal_stop();
        slot.process.force_kill();
        // Unhealthy until the kill lands; the probe pass flips it to
        // Terminated once the process is gone.
        slot.state = SlotState::Unhealthy;

        if let Some(task_id) = task_id {
            self.finish_task(
                task_id,
                TaskState::Failed,
                Some(format!("worker {worker_id} unhealthy: {reason}")),
            );
        }

        // A worker that never came up suggests a broken binary or host;
        // back off before spawning the replacement.
        if was_starting {
            let delay = self.backoff.next_delay();
            self.spawn_blocked_until = Some(Instant::now() + delay);
        }
    }

    fn enforce_task_timeouts(&mut self) {
        let now = chrono::Utc::now();
        let timeout = chrono::Duration::from_std(self.config.task_timeout)
            .unwrap_or_else(|_| chrono::Duration::seconds(i64::MAX / 1_000));

        let expired: Vec<Uuid> = self
            .tasks
            .values()
            .filter(|t| t.state == TaskState::Running)
            .filter(|t| t.started_at.is_some_and(|s| now - s > timeout))
            .map(|t| t.id)
            .collect();

        for task_id in expired {
            tracing::warn!(
                %task_id,
                timeout_secs = self.config.task_timeout.as_secs(),
                "Task timed out, killing its worker",
            );
            if let Some(slot) = self
                .slots
                .values_mut()
                .find(|s| s.current_task == Some(task_id))
            {
                slot.process.signal_stop();
                slot.process.force_kill();
                slot.state = SlotState::Terminated;
                slot.current_task = None;
            }
            self.finish_task(
                task_id,
                TaskState::TimedOut,
                Some(format!(
                    "timed out after {}s",
                    self.config.task_timeout.as_secs()
                )),
            );
        }
    }

    fn reap_terminated(&mut self) {
        self.slots.retain(|_, slot| {
            if slot.state == SlotState::Terminated {
                orphan::remove_pid_file(&slot.log_path);
                false
            } else {
                true
            }
        });
    }

    fn scale_up(&mut self) {
        let live = self.live_count();

        let wants_more = live < self.config.min_workers
            || (self.queue.len() > self.config.backlog_threshold
                && live < self.config.max_workers);
        if !wants_more {
            return;
        }

        // One spawn per tick keeps a burst of backlog from stampeding
        // the host with engine boots.
        self.spawn_one();
    }

    fn scale_down(&mut self) {
        if self.live_count() <= self.config.min_workers {
            return;
        }

        let timeout = self.config.idle_scale_down_timeout;
        let candidate = self
            .slots
            .values_mut()
            .filter(|s| s.state == SlotState::Idle)
            .find(|s| s.idle_since.is_some_and(|t| t.elapsed() > timeout));

        if let Some(slot) = candidate {
            tracing::info!(
                worker_id = %slot.id,
                idle_timeout_secs = timeout.as_secs(),
                "Scaling down idle worker",
            );
            slot.state = SlotState::Draining;
            slot.process.signal_stop();
        }
    }

    fn spawn_one(&mut self) {
        if let Some(until) = self.spawn_blocked_until {
            if Instant::now() < until {
                return;
            }
            self.spawn_blocked_until = None;
        }

        let worker_id = format!("worker-{}", self.next_slot);
        self.next_slot += 1;
        let log_path = self.config.log_root.join(format!("{worker_id}.log"));

        match self.launcher.launch(&worker_id, &log_path) {
            Ok(process) => {
                tracing::info!(worker_id = %worker_id, pid = process.pid(), "Worker spawned");
                if let Err(e) = orphan::write_pid_file(&log_path, process.pid()) {
                    tracing::warn!(worker_id = %worker_id, error = %e, "Failed to write pid file");
                }
                self.slots
                    .insert(worker_id.clone(), WorkerSlot::new(worker_id, process, log_path));
            }
            Err(e) => {
                let delay = self.backoff.next_delay();
                tracing::error!(
                    worker_id = %worker_id,
                    error = %e,
                    retry_in_secs = delay.as_secs(),
                    "Worker spawn failed",
                );
                self.spawn_blocked_until = Some(Instant::now() + delay);
            }
        }
    }

    // -- shared helpers --------------------------------------------------------

    fn live_count(&self) -> usize {
        self.slots.values().filter(|s| s.state.is_live()).count()
    }

    /// Whether queued work can still drain: an Idle slot exists or the
    /// pool may grow toward `max_workers`.
    fn has_capacity(&self) -> bool {
        self.live_count() < self.config.max_workers
            || self.slots.values().any(|s| s.state == SlotState::Idle)
    }

    fn finish_task(&mut self, task_id: Uuid, state: TaskState, error: Option<String>) {
        if let Some(task) = self.tasks.get_mut(&task_id) {
            task.finish(state, error);
            tracing::info!(%task_id, state = ?state, "Task finished");
        }
        if let Some(tx) = self.completions.remove(&task_id) {
            if let Some(task) = self.tasks.get(&task_id) {
                let _ = tx.send(task.snapshot());
            }
        }
    }

    fn status(&self) -> PoolSnapshot {
        PoolSnapshot {
            workers: self.slots.values().map(WorkerSlot::snapshot).collect(),
            queued_tasks: self.queue.len(),
            running_tasks: self
                .tasks
                .values()
                .filter(|t| t.state == TaskState::Running)
                .count(),
            min_workers: self.config.min_workers,
            max_workers: self.config.max_workers,
            max_queue_depth: self.config.max_queue_depth,
        }
    }

    /// Shutdown: cancel queued work, kill every worker.
    fn drain(&mut self) {
        tracing::info!(
            queued = self.queue.len(),
            workers = self.slots.len(),
            "Draining worker pool",
        );

        let queued: Vec<Uuid> = self.queue.drain(..).collect();
        for task_id in queued {
            self.finish_task(
                task_id,
                TaskState::Canceled,
                Some("pool shutting down".to_string()),
            );
        }

        let running: Vec<Uuid> = self
            .tasks
            .values()
            .filter(|t| t.state == TaskState::Running)
            .map(|t| t.id)
            .collect();
        for task_id in running {
            self.finish_task(
                task_id,
                TaskState::Canceled,
                Some("pool shutting down".to_string()),
            );
        }

        for slot in self.slots.values_mut() {
            slot.process.signal_stop();
            slot.process.force_kill();
            slot.state = SlotState::Terminated;
            orphan::remove_pid_file(&slot.log_path);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------


// ---------------------------------------------------------------------------
// Test support
// ---------------------------------------------------------------------------
