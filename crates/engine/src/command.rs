//! Engine command-line construction.
//!
//! Builds the argv for the two ways an engine process is launched: a
//! one-shot render of a single plan task, and a long-lived pool worker
//! that leases tasks over the control channel.

use std::path::Path;

use cuebridge_core::plan::{RenderPlan, TaskDescriptor};

/// Headless flags appended when the host has no display attached.
const HEADLESS_ARGS: &[&str] = &[
    "-RenderOffscreen",
    "-Unattended",
    "-NOSPLASH",
    "-NoLoadingScreen",
    "-notexturestreaming",
];

/// Append a game-mode override to a map URL unless one is already set.
fn map_url_with_game_mode(map_url: &str, game_mode_class: &str) -> String {
    if map_url.is_empty() || game_mode_class.is_empty() {
        return map_url.to_string();
    }
    if map_url.to_lowercase().contains("?game=") {
        return map_url.to_string();
    }
    if map_url.ends_with('?') {
        format!("{map_url}game={game_mode_class}")
    } else {
        format!("{map_url}?game={game_mode_class}")
    }
}

/// Build the argv for rendering one plan task in one-shot mode.
///
/// The project file is prepended by the caller; these are the arguments
/// after it.
pub fn one_shot_args(
    plan: &RenderPlan,
    task: &TaskDescriptor,
    engine_log_path: &Path,
    headless: bool,
) -> Vec<String> {
    let map_url = map_url_with_game_mode(&plan.map_asset_path, &plan.render.game_mode_class);

    let mut args = vec![
        map_url,
        format!("-AbsLog={}", engine_log_path.display()),
        "-forcelogflush".to_string(),
        "-stdout".to_string(),
        "-FullStdOutLogOutput".to_string(),
        "-game".to_string(),
        format!("-MoviePipelineLocalExecutorClass={}", plan.executor_class),
        format!("-JobId={}", plan.job_id),
        format!("-LevelSequence={}", plan.level_sequence_asset_path),
        format!("-MovieQuality={}", plan.render.quality),
        format!("-MovieFormat={}", plan.render.format),
    ];

    if headless {
        args.extend(HEADLESS_ARGS.iter().map(|s| s.to_string()));
    }

    let shot_filter_disabled = task
        .extensions
        .get("disable_shot_filter")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    if !shot_filter_disabled {
        if let Some(shot) = &task.shot {
            args.push(format!("-ShotName={}", shot.name));
        }
    }

    if let Some(range) = &task.frame_range {
        args.push(format!("-CustomStartFrame={}", range.start));
        args.push(format!("-CustomEndFrame={}", range.end));
    }

    for extra in &plan.render.additional_engine_args {
        let extra = extra.trim();
        if !extra.is_empty() {
            args.push(extra.to_string());
        }
    }

    args
}

/// Build the argv for a long-lived pool worker.
///
/// The worker boots into worker mode and polls `pool_base_url` for task
/// leases instead of rendering anything at startup.
pub fn worker_args(
    worker_id: &str,
    pool_base_url: &str,
    executor_class: &str,
    log_path: &Path,
    headless: bool,
) -> Vec<String> {
    let mut args = vec![
        "-WorkerMode".to_string(),
        format!("-WorkerId={worker_id}"),
        format!("-PoolBaseUrl={pool_base_url}"),
        format!("-MoviePipelineLocalExecutorClass={executor_class}"),
        "-stdout".to_string(),
        format!("-AbsLog={}", log_path.display()),
    ];

    if headless {
        args.extend(HEADLESS_ARGS.iter().map(|s| s.to_string()));
    }

    args
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use cuebridge_core::plan::{FrameRange, ProjectInfo, RenderSettings, ShotInfo};
    use std::collections::BTreeMap;

    fn sample_plan() -> RenderPlan {
        RenderPlan {
            job_id: "job-7".to_string(),
            project: ProjectInfo::default(),
            render: RenderSettings {
                quality: 2,
                format: "mov".to_string(),
                game_mode_class: "/Script/Pipeline.GameMode".to_string(),
                additional_engine_args: vec!["-NoSound".to_string(), " ".to_string()],
            },
            map_asset_path: "/Game/Maps/Main".to_string(),
            level_sequence_asset_path: "/Game/Seqs/Seq1.Seq1".to_string(),
            executor_class: "/Script/Pipeline.CmdExecutor".to_string(),
            tasks: vec![sample_task()],
        }
    }

    fn sample_task() -> TaskDescriptor {
        TaskDescriptor {
            task_index: 0,
            shot: Some(ShotInfo {
                name: "shot010".to_string(),
            }),
            frame_range: Some(FrameRange { start: 10, end: 40 }),
            extensions: BTreeMap::new(),
        }
    }

    #[test]
    fn game_mode_appended_to_map_url() {
        assert_eq!(
            map_url_with_game_mode("/Game/Maps/Main", "/Script/GM"),
            "/Game/Maps/Main?game=/Script/GM"
        );
        assert_eq!(
            map_url_with_game_mode("/Game/Maps/Main?", "/Script/GM"),
            "/Game/Maps/Main?game=/Script/GM"
        );
        // Already present (any case) is left alone.
        assert_eq!(
            map_url_with_game_mode("/Game/Maps/Main?Game=/Other", "/Script/GM"),
            "/Game/Maps/Main?Game=/Other"
        );
    }

    #[test]
    fn one_shot_args_carry_plan_fields() {
        let plan = sample_plan();
        let args = one_shot_args(&plan, &plan.tasks[0], Path::new("/logs/t0.engine.log"), true);

        assert_eq!(args[0], "/Game/Maps/Main?game=/Script/Pipeline.GameMode");
        assert!(args.contains(&"-JobId=job-7".to_string()));
        assert!(args.contains(&"-LevelSequence=/Game/Seqs/Seq1.Seq1".to_string()));
        assert!(args.contains(&"-MovieQuality=2".to_string()));
        assert!(args.contains(&"-MovieFormat=mov".to_string()));
        assert!(args.contains(&"-ShotName=shot010".to_string()));
        assert!(args.contains(&"-CustomStartFrame=10".to_string()));
        assert!(args.contains(&"-CustomEndFrame=40".to_string()));
        assert!(args.contains(&"-RenderOffscreen".to_string()));
        // Blank extra args are dropped, real ones kept.
        assert!(args.contains(&"-NoSound".to_string()));
        assert!(!args.contains(&" ".to_string()));
    }

    #[test]
    fn headless_flags_gated() {
        let plan = sample_plan();
        let args = one_shot_args(&plan, &plan.tasks[0], Path::new("/logs/t0.log"), false);
        assert!(!args.iter().any(|a| a == "-RenderOffscreen"));
    }

    #[test]
    fn shot_filter_can_be_disabled_per_task() {
        let plan = sample_plan();
        let mut task = plan.tasks[0].clone();
        task.extensions.insert(
            "disable_shot_filter".to_string(),
            serde_json::Value::Bool(true),
        );
        let args = one_shot_args(&plan, &task, Path::new("/logs/t0.log"), false);
        assert!(!args.iter().any(|a| a.starts_with("-ShotName=")));
    }

    #[test]
    fn worker_args_identify_worker_and_pool() {
        let args = worker_args(
            "10.0.0.5-w2",
            "http://127.0.0.1:9100/",
            "/Script/Pipeline.CmdExecutor",
            Path::new("/logs/worker_2.log"),
            true,
        );
        assert!(args.contains(&"-WorkerMode".to_string()));
        assert!(args.contains(&"-WorkerId=10.0.0.5-w2".to_string()));
        assert!(args.contains(&"-PoolBaseUrl=http://127.0.0.1:9100/".to_string()));
        assert!(args.contains(&"-Unattended".to_string()));
    }
}
