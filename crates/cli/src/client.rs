//! The `run-task` subcommand: submit to a running pool service.

use std::time::Duration;

use anyhow::{bail, Context};
use serde_json::json;

use cuebridge_core::plan::RenderPlan;

use crate::cli::RunTaskArgs;

pub async fn run(args: RunTaskArgs) -> anyhow::Result<i32> {
    // Load locally so a malformed plan fails here, not in the service.
    let plan = RenderPlan::load(&args.plan)?;
    if plan.task(args.task_index).is_none() {
        bail!(
            "task index {} out of range for plan with {} tasks",
            args.task_index,
            plan.tasks.len(),
        );
    }

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .context("building HTTP client")?;
    let base = args.base_url.trim_end_matches('/');

    let response = client
        .post(format!("{base}/tasks"))
        .json(&json!({ "plan": plan, "task_index": args.task_index }))
        .send()
        .await
        .with_context(|| format!("submitting task to {base}"))?;

    if !response.status().is_success() {
        let status = response.status();
        let body: serde_json::Value = response.json().await.unwrap_or_default();
        bail!(
            "submission rejected ({status}): {}",
            body["error"].as_str().unwrap_or("unknown error"),
        );
    }

    let submitted: serde_json::Value = response.json().await.context("reading submission reply")?;
    let task_id = submitted["task_id"]
        .as_str()
        .context("submission reply missing task_id")?
        .to_string();
    tracing::info!(%task_id, job_id = %plan.job_id, "Task submitted");

    if args.detach {
        println!("{task_id}");
        return Ok(0);
    }

    poll_until_terminal(&client, base, &task_id, args.poll_interval_secs).await
}

/// Poll the task until it reaches a terminal state; exit 0 only on success.
async fn poll_until_terminal(
    client: &reqwest::Client,
    base: &str,
    task_id: &str,
    poll_interval_secs: u64,
) -> anyhow::Result<i32> {
    let mut last_progress: Option<f64> = None;

    loop {
        tokio::time::sleep(Duration::from_secs(poll_interval_secs)).await;

        let snapshot: serde_json::Value = client
            .get(format!("{base}/tasks/{task_id}"))
            .send()
            .await
            .context("polling task status")?
            .error_for_status()
            .context("task status request failed")?
            .json()
            .await
            .context("reading task status")?;

        let state = snapshot["state"].as_str().unwrap_or("unknown");
        let progress = snapshot["progress"].as_f64();
        if progress != last_progress {
            if let Some(p) = progress {
                tracing::info!(task_id, state, progress = p, "Task progress");
            }
            last_progress = progress;
        }

        match state {
            "queued" | "running" => continue,
            "succeeded" => {
                tracing::info!(task_id, "Task succeeded");
                return Ok(0);
            }
            other => {
                let error = snapshot["error"].as_str().unwrap_or("no error detail");
                tracing::error!(task_id, state = other, error, "Task did not succeed");
                return Ok(1);
            }
        }
    }
}
