//! Slot health probes.
//!
//! Probing is a pure decision over slot state, the clock, and the pool
//! config; acting on a verdict (kill, replace, fail the task) belongs
//! to the coordinator.

use std::time::Instant;

use crate::manager::PoolConfig;
use crate::slot::{SlotState, WorkerSlot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthVerdict {
    Healthy,
    /// The process exited underneath us.
    ProcessDead,
    /// Still `Starting` past the startup grace window.
    StartupTimedOut,
    /// Too many heartbeat intervals without a heartbeat.
    MissedHeartbeats { missed: u32 },
}

/// Probe one slot. Unhealthy, draining, and terminated slots are never
/// flagged; their teardown is already in motion.
pub fn probe(slot: &mut WorkerSlot, now: Instant, config: &PoolConfig) -> HealthVerdict {
    if matches!(
        slot.state,
        SlotState::Unhealthy | SlotState::Draining | SlotState::Terminated
    ) {
        return HealthVerdict::Healthy;
    }

    if !slot.process.is_running() {
        return HealthVerdict::ProcessDead;
    }

    match slot.state {
        SlotState::Starting => {
            if now.duration_since(slot.spawned_at) > config.startup_grace {
                HealthVerdict::StartupTimedOut
            } else {
                HealthVerdict::Healthy
            }
        }
        SlotState::Idle | SlotState::Busy => {
            let age = now.duration_since(slot.last_heartbeat);
            let missed = (age.as_secs_f64() / config.heartbeat_interval.as_secs_f64()) as u32;
            if missed >= config.missed_heartbeat_threshold {
                HealthVerdict::MissedHeartbeats { missed }
            } else {
                HealthVerdict::Healthy
            }
        }
        _ => HealthVerdict::Healthy,
    }
}
