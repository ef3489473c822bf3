use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use cuebridge_pool::DispatchHandle;

use crate::config::ServiceConfig;

/// Shared application state, cloned into every handler.
#[derive(Clone)]
pub struct AppState {
    pub pool: DispatchHandle,
    pub config: Arc<ServiceConfig>,
    /// Cancels the pool coordinator and the server on `/shutdown`.
    pub shutdown: CancellationToken,
}
