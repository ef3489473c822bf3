//! Client handle onto the pool coordinator.
//!
//! Cheap to clone; every HTTP handler and the CLI share one. Each call
//! is one command message plus a oneshot reply.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::manager::{PoolCommand, PoolSnapshot};
use crate::slot::WorkerSnapshot;
use crate::task::{DoneReport, LeasePayload, TaskRequest, TaskSnapshot};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    #[error("Pool queue is full ({depth} queued tasks)")]
    PoolSaturated { depth: usize },

    #[error("Task not found: {0}")]
    TaskNotFound(Uuid),

    #[error("Unknown worker: {0}")]
    UnknownWorker(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Timed out after {0}s waiting for the task to complete")]
    DispatchTimeout(u64),

    #[error("Pool is shutting down")]
    ShuttingDown,
}

/// Handle used by the HTTP surface and the CLI to drive the pool.
#[derive(Clone)]
pub struct DispatchHandle {
    tx: mpsc::Sender<PoolCommand>,
    dispatch_timeout: Duration,
}

impl DispatchHandle {
    pub(crate) fn new(tx: mpsc::Sender<PoolCommand>, dispatch_timeout: Duration) -> Self {
        Self {
            tx,
            dispatch_timeout,
        }
    }

    async fn call<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> PoolCommand,
    ) -> Result<T, PoolError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| PoolError::ShuttingDown)?;
        reply_rx.await.map_err(|_| PoolError::ShuttingDown)
    }

    // -- task surface -----------------------------------------------------

    /// Queue a task and return its id immediately.
    pub async fn submit(&self, request: TaskRequest) -> Result<Uuid, PoolError> {
        self.call(|reply| PoolCommand::Submit {
            request,
            completion: None,
            reply,
        })
        .await?
    }

    /// Queue a task and block until it reaches a terminal state, or
    /// until the dispatch timeout elapses (the task keeps running; only
    /// the wait gives up).
    pub async fn submit_and_wait(&self, request: TaskRequest) -> Result<TaskSnapshot, PoolError> {
        let (done_tx, done_rx) = oneshot::channel();
        self.call(|reply| PoolCommand::Submit {
            request,
            completion: Some(done_tx),
            reply,
        })
        .await??;

        match tokio::time::timeout(self.dispatch_timeout, done_rx).await {
            Ok(Ok(snapshot)) => Ok(snapshot),
            Ok(Err(_)) => Err(PoolError::ShuttingDown),
            Err(_) => Err(PoolError::DispatchTimeout(self.dispatch_timeout.as_secs())),
        }
    }

    pub async fn cancel(&self, task_id: Uuid) -> Result<TaskSnapshot, PoolError> {
        self.call(|reply| PoolCommand::Cancel { task_id, reply }).await?
    }

    pub async fn task(&self, task_id: Uuid) -> Result<TaskSnapshot, PoolError> {
        self.call(|reply| PoolCommand::GetTask { task_id, reply }).await?
    }

    pub async fn tasks(&self) -> Result<Vec<TaskSnapshot>, PoolError> {
        self.call(|reply| PoolCommand::ListTasks { reply }).await
    }

    // -- pool status --------------------------------------------------------

    pub async fn status(&self) -> Result<PoolSnapshot, PoolError> {
        self.call(|reply| PoolCommand::Status { reply }).await
    }

    pub async fn workers(&self) -> Result<Vec<WorkerSnapshot>, PoolError> {
        self.call(|reply| PoolCommand::ListWorkers { reply }).await
    }

    // -- worker control channel ----------------------------------------------

    pub async fn worker_ready(&self, worker_id: &str) -> Result<(), PoolError> {
        let worker_id = worker_id.to_string();
        self.call(|reply| PoolCommand::WorkerReady { worker_id, reply })
            .await?
    }

    pub async fn lease(&self, worker_id: &str) -> Result<Option<LeasePayload>, PoolError> {
        let worker_id = worker_id.to_string();
        self.call(|reply| PoolCommand::Lease { worker_id, reply })
            .await?
    }

    pub async fn heartbeat(
        &self,
        worker_id: &str,
        progress: Option<f64>,
    ) -> Result<(), PoolError> {
        let worker_id = worker_id.to_string();
        self.call(|reply| PoolCommand::Heartbeat {
            worker_id,
            progress,
            reply,
        })
        .await?
    }

    pub async fn done(&self, worker_id: &str, report: DoneReport) -> Result<(), PoolError> {
        let worker_id = worker_id.to_string();
        self.call(|reply| PoolCommand::Done {
            worker_id,
            report,
            reply,
        })
        .await?
    }

    // -- lifecycle ------------------------------------------------------------

    /// Ask the coordinator to drain and stop.
    pub async fn shutdown(&self) -> Result<(), PoolError> {
        self.call(|reply| PoolCommand::Shutdown { reply }).await
    }
}
