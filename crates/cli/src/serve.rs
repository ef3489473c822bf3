//! The `serve` subcommand: pool service mode.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use cuebridge_api::{build_router, AppState, ServiceConfig};
use cuebridge_engine::launch::{engine_cmd_candidates, first_existing};
use cuebridge_pool::{EngineWorkerLauncher, PoolManager};

use crate::cli::ServeArgs;

pub async fn run(args: ServeArgs) -> anyhow::Result<i32> {
    let mut config = ServiceConfig::from_env();
    // Flags beat environment.
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    tracing::info!(
        host = %config.host,
        port = config.port,
        min_workers = config.min_workers,
        max_workers = config.max_workers,
        "Loaded service configuration",
    );

    std::fs::create_dir_all(&config.log_root)
        .with_context(|| format!("creating log root {}", config.log_root.display()))?;
    std::fs::create_dir_all(&config.work_root)
        .with_context(|| format!("creating work root {}", config.work_root.display()))?;

    // Workers left behind by a previous run would fight the new pool
    // for leases and host resources.
    let reclaimed = cuebridge_pool::reclaim_orphans(&config.log_root)
        .context("reclaiming orphaned workers")?;
    if reclaimed > 0 {
        tracing::warn!(reclaimed, "Reclaimed orphaned workers from a previous run");
    }

    // Fail fast on a missing engine binary rather than spawn-looping.
    let roots = [
        args.engine_root.as_deref(),
        Some(config.engine_root.as_path()),
    ];
    let roots: Vec<_> = roots.into_iter().flatten().collect();
    let engine_cmd = first_existing(
        "engine binary",
        engine_cmd_candidates(
            args.engine_cmd.as_deref(),
            config.engine_cmd_path.as_deref(),
            &roots,
        ),
    )?;
    tracing::info!(engine_cmd = %engine_cmd.display(), "Resolved engine binary");

    let launcher = EngineWorkerLauncher {
        program: engine_cmd,
        pool_base_url: config.pool_base_url(),
        executor_class: config.executor_class.clone(),
        headless: config.headless,
    };

    let shutdown = CancellationToken::new();
    let pool = PoolManager::spawn(config.pool_config(), Arc::new(launcher), shutdown.clone());

    let state = AppState {
        pool: pool.clone(),
        config: Arc::new(config.clone()),
        shutdown: shutdown.clone(),
    };
    let app = build_router(state);

    let addr = SocketAddr::new(
        config.host.parse().context("invalid POOL_HOST address")?,
        config.port,
    );
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "Pool service listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await
        .context("server error")?;

    tracing::info!("Server stopped accepting connections, draining pool");
    let _ = pool.shutdown().await;
    tracing::info!("Graceful shutdown complete");
    Ok(0)
}

/// Resolve on SIGINT, SIGTERM, or an HTTP-initiated shutdown, and make
/// sure the pool token is cancelled in every case.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
        () = cancel.cancelled() => {
            tracing::info!("Shutdown requested, stopping server");
        }
    }

    cancel.cancel();
}
