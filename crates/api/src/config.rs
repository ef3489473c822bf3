use std::path::PathBuf;
use std::time::Duration;

use cuebridge_pool::PoolConfig;

/// Service configuration loaded from environment variables.
///
/// All fields have defaults suitable for a single-host render node; a
/// farm deployment overrides them via the environment.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `9100`).
    pub port: u16,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,

    // -- pool sizing --
    pub min_workers: usize,
    pub max_workers: usize,
    pub max_queue_depth: usize,
    pub backlog_threshold: usize,

    // -- pool timing --
    pub heartbeat_interval_secs: u64,
    pub missed_heartbeat_threshold: u32,
    pub startup_grace_secs: u64,
    pub idle_scale_down_timeout_secs: u64,
    pub task_timeout_secs: u64,
    pub dispatch_timeout_secs: u64,

    // -- filesystem roots --
    /// Shared farm data root (plans live under it).
    pub data_root: PathBuf,
    /// Worker and service log directory.
    pub log_root: PathBuf,
    /// Per-task artifact directory (logs, runtime records).
    pub work_root: PathBuf,

    // -- engine launch --
    /// Engine installation root; the binary is derived from it.
    pub engine_root: PathBuf,
    /// Explicit engine binary path, overriding the derived one.
    pub engine_cmd_path: Option<PathBuf>,
    /// Explicit engine project file path.
    pub project_path: Option<PathBuf>,
    pub executor_class: String,
    pub game_mode_class: String,
    pub headless: bool,
}

impl ServiceConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                        | Default                          |
    /// |--------------------------------|----------------------------------|
    /// | `POOL_HOST`                    | `0.0.0.0`                        |
    /// | `POOL_PORT`                    | `9100`                           |
    /// | `REQUEST_TIMEOUT_SECS`         | `30`                             |
    /// | `MIN_WORKERS`                  | `1`                              |
    /// | `MAX_WORKERS`                  | `4`                              |
    /// | `MAX_QUEUE_DEPTH`              | `64`                             |
    /// | `BACKLOG_THRESHOLD`            | `2`                              |
    /// | `HEARTBEAT_INTERVAL_SECS`      | `15`                             |
    /// | `MISSED_HEARTBEAT_THRESHOLD`   | `4`                              |
    /// | `WORKER_STARTUP_GRACE_SECS`    | `300`                            |
    /// | `IDLE_SCALE_DOWN_TIMEOUT_SECS` | `600`                            |
    /// | `TASK_TIMEOUT_SECS`            | `3600`                           |
    /// | `DISPATCH_TIMEOUT_SECS`        | `7200`                           |
    /// | `DATA_ROOT`                    | `/data`                          |
    /// | `LOG_ROOT`                     | `<DATA_ROOT>/logs`               |
    /// | `WORK_ROOT`                    | `<DATA_ROOT>/work`               |
    /// | `ENGINE_ROOT`                  | (empty)                          |
    /// | `ENGINE_CMD_PATH`              | (unset)                          |
    /// | `PROJECT_PATH`                 | (unset)                          |
    /// | `EXECUTOR_CLASS`               | (empty; the plan's class is used)|
    /// | `GAME_MODE_CLASS`              | (empty)                          |
    /// | `HEADLESS`                     | `true`                           |
    pub fn from_env() -> Self {
        let data_root = PathBuf::from(env_or("DATA_ROOT", "/data"));
        let log_root = std::env::var("LOG_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_root.join("logs"));
        let work_root = std::env::var("WORK_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_root.join("work"));

        Self {
            host: env_or("POOL_HOST", "0.0.0.0"),
            port: env_parse("POOL_PORT", 9100),
            request_timeout_secs: env_parse("REQUEST_TIMEOUT_SECS", 30),

            min_workers: env_parse("MIN_WORKERS", 1),
            max_workers: env_parse("MAX_WORKERS", 4),
            max_queue_depth: env_parse("MAX_QUEUE_DEPTH", 64),
            backlog_threshold: env_parse("BACKLOG_THRESHOLD", 2),

            heartbeat_interval_secs: env_parse("HEARTBEAT_INTERVAL_SECS", 15),
            missed_heartbeat_threshold: env_parse("MISSED_HEARTBEAT_THRESHOLD", 4),
            startup_grace_secs: env_parse("WORKER_STARTUP_GRACE_SECS", 300),
            idle_scale_down_timeout_secs: env_parse("IDLE_SCALE_DOWN_TIMEOUT_SECS", 600),
            task_timeout_secs: env_parse("TASK_TIMEOUT_SECS", 3600),
            dispatch_timeout_secs: env_parse("DISPATCH_TIMEOUT_SECS", 7200),

            data_root,
            log_root,
            work_root,

            engine_root: PathBuf::from(env_or("ENGINE_ROOT", "")),
            engine_cmd_path: std::env::var("ENGINE_CMD_PATH").ok().map(PathBuf::from),
            project_path: std::env::var("PROJECT_PATH").ok().map(PathBuf::from),
            executor_class: env_or("EXECUTOR_CLASS", ""),
            game_mode_class: env_or("GAME_MODE_CLASS", ""),
            headless: env_parse("HEADLESS", true),
        }
    }

    /// The pool coordinator's view of this configuration.
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            min_workers: self.min_workers,
            max_workers: self.max_workers,
            max_queue_depth: self.max_queue_depth,
            backlog_threshold: self.backlog_threshold,
            heartbeat_interval: Duration::from_secs(self.heartbeat_interval_secs),
            missed_heartbeat_threshold: self.missed_heartbeat_threshold,
            startup_grace: Duration::from_secs(self.startup_grace_secs),
            idle_scale_down_timeout: Duration::from_secs(self.idle_scale_down_timeout_secs),
            task_timeout: Duration::from_secs(self.task_timeout_secs),
            dispatch_timeout: Duration::from_secs(self.dispatch_timeout_secs),
            tick_interval: Duration::from_secs(1),
            log_root: self.log_root.clone(),
        }
    }

    /// Base URL workers use to reach the control channel.
    pub fn pool_base_url(&self) -> String {
        // Workers run on the same host as the pool service.
        format!("http://127.0.0.1:{}", self.port)
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|e| panic!("{key} must be valid: {e}")),
        Err(_) => default,
    }
}
