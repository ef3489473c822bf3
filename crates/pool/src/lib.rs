//! `cuebridge-pool` -- persistent worker pool and task dispatch.
//!
//! A single coordinator task owns the slot table, the task table, and
//! the FIFO queue; everything else (HTTP handlers, the CLI) talks to it
//! through a [`DispatchHandle`] over a command channel. Workers are
//! long-lived engine processes that lease tasks over the pool's control
//! channel instead of booting once per task.

pub mod backoff;
pub mod dispatch;
pub mod health;
pub mod manager;
pub mod orphan;
pub mod slot;
pub mod task;

pub use dispatch::{DispatchHandle, PoolError};
pub use orphan::reclaim_orphans;
pub use manager::{
    EngineWorkerLauncher, PoolConfig, PoolManager, PoolSnapshot, SlotProcess, WorkerLauncher,
};
pub use slot::{SlotState, WorkerSnapshot};
pub use task::{DoneReport, LeasePayload, TaskRequest, TaskSnapshot, TaskState};
