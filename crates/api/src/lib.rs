//! `cuebridge-api` -- the pool service's HTTP surface.
//!
//! Two audiences share one listener: submitters (task submission,
//! status, cancel) and the pool's own workers (the lease / heartbeat /
//! done control channel). The handlers are thin; every decision is made
//! by the pool coordinator behind the [`DispatchHandle`].

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use config::ServiceConfig;
pub use error::{AppError, AppResult};
pub use routes::build_router;
pub use state::AppState;
