//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "cuebridge",
    version,
    about = "Render task execution and worker pool dispatch for engine-backed farm jobs.",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the persistent pool service (HTTP API plus worker pool).
    Serve(ServeArgs),
    /// Render one plan task in this process and exit with the engine's
    /// exit code. This is what the external scheduler invokes per frame.
    RunPlanTask(RunPlanTaskArgs),
    /// Submit one plan task to a running pool service and wait for it.
    RunTask(RunTaskArgs),
}

#[derive(Debug, clap::Args)]
pub struct ServeArgs {
    /// Bind address, overriding POOL_HOST.
    #[arg(long, value_name = "ADDR")]
    pub host: Option<String>,

    /// Bind port, overriding POOL_PORT.
    #[arg(long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Engine binary, overriding ENGINE_CMD_PATH and the derived path.
    #[arg(long, value_name = "PATH")]
    pub engine_cmd: Option<PathBuf>,

    /// Engine installation root, overriding ENGINE_ROOT.
    #[arg(long, value_name = "PATH")]
    pub engine_root: Option<PathBuf>,
}

#[derive(Debug, clap::Args)]
pub struct RunPlanTaskArgs {
    /// Path to the render plan JSON.
    #[arg(long, value_name = "PATH")]
    pub plan: PathBuf,

    /// Task index to render. Falls back to CUE_IFRAME, then to the
    /// frame label (below) when absent or unparsable.
    #[arg(long, value_name = "INDEX")]
    pub task_index: Option<String>,

    /// Frame label whose leading integer names the task (e.g.
    /// `0000-render`). Falls back to CUE_FRAME.
    #[arg(long, value_name = "LABEL")]
    pub frame_label: Option<String>,

    /// Expected SHA-256 of the plan file; verification is skipped when
    /// omitted.
    #[arg(long, value_name = "HEX")]
    pub plan_sha256: Option<String>,

    /// Wall-clock timeout in seconds (default: TASK_TIMEOUT_SECS).
    #[arg(long, value_name = "SECS")]
    pub timeout_secs: Option<u64>,

    /// Engine binary, overriding ENGINE_CMD_PATH and the derived path.
    #[arg(long, value_name = "PATH")]
    pub engine_cmd: Option<PathBuf>,

    /// Engine installation root, overriding ENGINE_ROOT.
    #[arg(long, value_name = "PATH")]
    pub engine_root: Option<PathBuf>,

    /// Engine project file, overriding PROJECT_PATH and the plan hint.
    #[arg(long, value_name = "PATH")]
    pub project: Option<PathBuf>,
}

#[derive(Debug, clap::Args)]
pub struct RunTaskArgs {
    /// Base URL of the pool service.
    #[arg(long, value_name = "URL", default_value = "http://127.0.0.1:9100")]
    pub base_url: String,

    /// Path to the render plan JSON, read locally and submitted inline.
    #[arg(long, value_name = "PATH")]
    pub plan: PathBuf,

    /// Task index to render.
    #[arg(long, value_name = "INDEX")]
    pub task_index: u32,

    /// Submit and exit without waiting for the result.
    #[arg(long)]
    pub detach: bool,

    /// Poll interval in seconds while waiting.
    #[arg(long, value_name = "SECS", default_value_t = 5)]
    pub poll_interval_secs: u64,
}
