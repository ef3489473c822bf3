//! `cuebridge-engine` -- engine process launch and supervision.
//!
//! Owns everything that touches an engine child process: locating the
//! executable, building command lines, spawning with captured output,
//! and supervising one task execution (timeout, cancellation, durable
//! runtime record). Both the one-shot runner and the worker pool spawn
//! their processes through [`process::ProcessHandle`].

pub mod command;
pub mod launch;
pub mod process;
pub mod supervisor;

pub use supervisor::{ExecuteSpec, SupervisorError, TaskProcessSupervisor};
