//! Shared test harness: a router wired to a pool with stubbed workers.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use cuebridge_api::{AppState, ServiceConfig};
use cuebridge_pool::{DispatchHandle, PoolConfig, PoolManager, SlotProcess, WorkerLauncher};

// ---------------------------------------------------------------------------
// Stub worker launcher
// ---------------------------------------------------------------------------

struct StubProc {
    running: Arc<AtomicBool>,
}

impl SlotProcess for StubProc {
    fn pid(&self) -> u32 {
        1000
    }

    fn is_running(&mut self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn signal_stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }

    fn force_kill(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct StubLauncher {
    worker_ids: Mutex<Vec<String>>,
}

impl StubLauncher {
    pub fn worker_ids(&self) -> Vec<String> {
        self.worker_ids.lock().unwrap().clone()
    }
}

impl WorkerLauncher for StubLauncher {
    fn launch(&self, worker_id: &str, _log_path: &Path) -> std::io::Result<Box<dyn SlotProcess>> {
        self.worker_ids.lock().unwrap().push(worker_id.to_string());
        Ok(Box::new(StubProc {
            running: Arc::new(AtomicBool::new(true)),
        }))
    }
}

// ---------------------------------------------------------------------------
// App construction
// ---------------------------------------------------------------------------

pub struct TestApp {
    pub router: Router,
    pub launcher: Arc<StubLauncher>,
    pub pool: DispatchHandle,
    pub shutdown: CancellationToken,
}

pub fn test_pool_config() -> PoolConfig {
    // Each test gets its own log root so pid files never collide.
    let log_root = std::env::temp_dir().join(format!("api-test-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&log_root).unwrap();
    PoolConfig {
        min_workers: 1,
        max_workers: 4,
        max_queue_depth: 16,
        backlog_threshold: 100,
        heartbeat_interval: Duration::from_secs(30),
        missed_heartbeat_threshold: 4,
        startup_grace: Duration::from_secs(30),
        idle_scale_down_timeout: Duration::from_secs(30),
        task_timeout: Duration::from_secs(30),
        dispatch_timeout: Duration::from_secs(5),
        tick_interval: Duration::from_millis(15),
        log_root,
    }
}

fn test_service_config() -> ServiceConfig {
    ServiceConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        request_timeout_secs: 10,
        min_workers: 1,
        max_workers: 4,
        max_queue_depth: 16,
        backlog_threshold: 100,
        heartbeat_interval_secs: 30,
        missed_heartbeat_threshold: 4,
        startup_grace_secs: 30,
        idle_scale_down_timeout_secs: 30,
        task_timeout_secs: 30,
        dispatch_timeout_secs: 5,
        data_root: PathBuf::from("/tmp"),
        log_root: std::env::temp_dir(),
        work_root: std::env::temp_dir(),
        engine_root: PathBuf::new(),
        engine_cmd_path: None,
        project_path: None,
        executor_class: String::new(),
        game_mode_class: String::new(),
        headless: true,
    }
}

/// Build a full test app around a pool with the given config.
pub fn build_test_app(pool_config: PoolConfig) -> TestApp {
    let launcher = Arc::new(StubLauncher::default());
    let shutdown = CancellationToken::new();
    let pool = PoolManager::spawn(pool_config, launcher.clone(), shutdown.clone());

    let state = AppState {
        pool: pool.clone(),
        config: Arc::new(test_service_config()),
        shutdown: shutdown.clone(),
    };

    TestApp {
        router: cuebridge_api::build_router(state),
        launcher,
        pool,
        shutdown,
    }
}

/// Wait until the stub launcher has spawned `n` workers and report them ready.
pub async fn ready_workers(app: &TestApp, n: usize) -> Vec<String> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while app.launcher.worker_ids().len() < n {
        if tokio::time::Instant::now() > deadline {
            panic!("workers never spawned");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let ids = app.launcher.worker_ids();
    for id in ids.iter().take(n) {
        let response = post_json(
            app.router.clone(),
            &format!("/workers/{id}/ready"),
            serde_json::json!({}),
        )
        .await;
        assert_eq!(response.status(), axum::http::StatusCode::NO_CONTENT);
    }
    ids
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
