//! The `run-plan-task` subcommand: render one plan task in-process.
//!
//! This is the scheduler-facing entry point: each farm frame invokes it
//! with the plan path and a task index (or the `CUE_IFRAME` /
//! `CUE_FRAME` environment the scheduler already sets), and reads the
//! outcome from the exit code.

use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use cuebridge_api::ServiceConfig;
use cuebridge_core::plan::{resolve_task, verify_sha256, RenderPlan};
use cuebridge_core::record::{TaskArtifacts, TaskStatus};
use cuebridge_engine::command::one_shot_args;
use cuebridge_engine::launch::{engine_cmd_candidates, first_existing, project_file_candidates};
use cuebridge_engine::{ExecuteSpec, TaskProcessSupervisor};

use crate::cli::RunPlanTaskArgs;

/// Grace window between the stop signal and the force kill on timeout.
const TERMINATE_GRACE: Duration = Duration::from_secs(15);

pub async fn run(args: RunPlanTaskArgs) -> anyhow::Result<i32> {
    let config = ServiceConfig::from_env();

    let expected_sha = args
        .plan_sha256
        .or_else(|| std::env::var("PLAN_SHA256").ok());
    if let Some(expected) = &expected_sha {
        verify_sha256(&args.plan, expected).context("plan checksum verification")?;
    }

    let mut plan = RenderPlan::load(&args.plan)?;
    if plan.executor_class.is_empty() {
        plan.executor_class = config.executor_class.clone();
    }
    if plan.render.game_mode_class.is_empty() {
        plan.render.game_mode_class = config.game_mode_class.clone();
    }

    let primary = args
        .task_index
        .or_else(|| std::env::var("CUE_IFRAME").ok());
    let fallback = args
        .frame_label
        .or_else(|| std::env::var("CUE_FRAME").ok());
    let task = resolve_task(&plan, primary.as_deref(), fallback.as_deref())?;
    tracing::info!(
        job_id = %plan.job_id,
        task_index = task.task_index,
        plan = %args.plan.display(),
        "Resolved plan task",
    );

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
    let project = first_existing(
        "project file",
        project_file_candidates(
            args.project.as_deref(),
            config.project_path.as_deref(),
            None,
            &plan.project.project_hint,
            Some(&config.data_root),
        ),
    )?;

    let artifacts = TaskArtifacts::for_task(&config.work_root, &plan.job_id, task.task_index);

    // The project file is the engine's first positional argument.
    let mut argv = vec![project.display().to_string()];
    argv.extend(one_shot_args(
        &plan,
        task,
        &artifacts.engine_log,
        config.headless,
    ));

    let timeout = Duration::from_secs(args.timeout_secs.unwrap_or(config.task_timeout_secs));
    let spec = ExecuteSpec {
        program: engine_cmd,
        args: argv,
        env: vec![],
        timeout,
        grace: TERMINATE_GRACE,
    };

    // Ctrl-C cancels the render instead of orphaning the engine.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, canceling task");
                cancel.cancel();
            }
        });
    }

    let task_index = task.task_index;
    let supervisor = TaskProcessSupervisor::new(artifacts).echo_output(true);
    let record = supervisor
        .execute(&plan.job_id, task_index, spec, &cancel)
        .await?;

    Ok(record.exit_code.unwrap_or(match record.status {
        TaskStatus::Success => 0,
        TaskStatus::TimedOut => 124,
        TaskStatus::Canceled => 130,
        _ => 1,
    }))
}
