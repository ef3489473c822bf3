//! Render plan loading, validation, and task resolution.
//!
//! A render plan is the JSON document the submitter writes alongside a
//! scheduler job: one job id, engine launch parameters, and an ordered
//! list of tasks whose indices match the scheduler's frame-index space.
//! Task resolution is pure -- identical inputs always yield the same
//! descriptor.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

/// A loaded render plan: one scheduler job's worth of tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderPlan {
    pub job_id: String,
    #[serde(default)]
    pub project: ProjectInfo,
    #[serde(default)]
    pub render: RenderSettings,
    #[serde(default)]
    pub map_asset_path: String,
    #[serde(default)]
    pub level_sequence_asset_path: String,
    #[serde(default)]
    pub executor_class: String,
    pub tasks: Vec<TaskDescriptor>,
}

/// Project-level hints carried in the plan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectInfo {
    /// Relative or absolute hint for locating the engine project file.
    #[serde(default)]
    pub project_hint: String,
}

/// Render parameters shared by every task in the plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderSettings {
    /// Quality preset: 0=LOW, 1=MEDIUM, 2=HIGH, 3=EPIC.
    #[serde(default = "default_quality")]
    pub quality: u8,
    /// Output container format.
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default)]
    pub game_mode_class: String,
    /// Extra engine arguments appended verbatim to every task.
    #[serde(default)]
    pub additional_engine_args: Vec<String>,
}

fn default_quality() -> u8 {
    1
}

fn default_format() -> String {
    "mp4".to_string()
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            quality: default_quality(),
            format: default_format(),
            game_mode_class: String::new(),
            additional_engine_args: Vec::new(),
        }
    }
}

/// One unit of work within a plan. Immutable once loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDescriptor {
    pub task_index: u32,
    #[serde(default)]
    pub shot: Option<ShotInfo>,
    #[serde(default)]
    pub frame_range: Option<FrameRange>,
    /// Per-task overrides understood by the engine-side executor.
    #[serde(default)]
    pub extensions: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShotInfo {
    pub name: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FrameRange {
    pub start: i64,
    pub end: i64,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl RenderPlan {
    /// Load and validate a render plan from a local or network path.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        if !path.exists() {
            return Err(CoreError::PlanNotFound(path.display().to_string()));
        }

        let text = std::fs::read_to_string(path)?;
        let plan: RenderPlan = serde_json::from_str(&text)
            .map_err(|e| CoreError::PlanMalformed(format!("invalid JSON: {e}")))?;

        plan.validate()?;
        Ok(plan)
    }

    /// Schema checks beyond what serde enforces.
    ///
    /// Task indices must be contiguous integers starting at 0 so they
    /// line up with the external scheduler's frame-index space.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.job_id.trim().is_empty() {
            return Err(CoreError::PlanMalformed("job_id is empty".to_string()));
        }
        if self.tasks.is_empty() {
            return Err(CoreError::PlanMalformed(
                "plan contains no tasks".to_string(),
            ));
        }

        for (expected, task) in self.tasks.iter().enumerate() {
            if task.task_index as usize != expected {
                return Err(CoreError::PlanMalformed(format!(
                    "task indices must be contiguous from 0: expected {expected}, found {}",
                    task.task_index,
                )));
            }
        }

        Ok(())
    }

    /// Look up a task by its resolved index.
    pub fn task(&self, index: u32) -> Option<&TaskDescriptor> {
        self.tasks.get(index as usize)
    }
}

/// Verify a plan file against an expected SHA-256 hex digest.
///
/// An empty `expected` skips verification (the submitter may omit the
/// checksum). A mismatch is a malformed-plan error: the file on disk is
/// not the plan the scheduler dispatched.
pub fn verify_sha256(path: &Path, expected: &str) -> Result<(), CoreError> {
    if expected.is_empty() {
        return Ok(());
    }

    let bytes = std::fs::read(path)?;
    let digest = format!("{:x}", Sha256::digest(&bytes));
    if !digest.eq_ignore_ascii_case(expected) {
        return Err(CoreError::PlanMalformed(format!(
            "plan checksum mismatch: expected {expected}, actual {digest}",
        )));
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Task resolution
// ---------------------------------------------------------------------------

/// Resolve which task of `plan` this invocation should run.
///
/// `primary` is the scheduler's integer task index (env `CUE_IFRAME`).
/// `fallback` is a frame label whose leading integer is used when the
/// primary is absent or unparsable (env `CUE_FRAME`, e.g. `0000-render`
/// resolves to 0; a bare integer is also accepted).
pub fn resolve_task<'p>(
    plan: &'p RenderPlan,
    primary: Option<&str>,
    fallback: Option<&str>,
) -> Result<&'p TaskDescriptor, CoreError> {
    let index = resolve_task_index(primary, fallback)?;

    if index < 0 || index as usize >= plan.tasks.len() {
        return Err(CoreError::TaskIndexOutOfRange {
            index,
            len: plan.tasks.len(),
        });
    }

    Ok(&plan.tasks[index as usize])
}

/// Resolve the raw integer index from the primary and fallback sources.
pub fn resolve_task_index(
    primary: Option<&str>,
    fallback: Option<&str>,
) -> Result<i64, CoreError> {
    if let Some(raw) = primary.map(str::trim).filter(|s| !s.is_empty()) {
        if let Ok(index) = raw.parse::<i64>() {
            return Ok(index);
        }
        // Unparsable primary falls through to the frame label.
    }

    let Some(label) = fallback.map(str::trim).filter(|s| !s.is_empty()) else {
        return Err(CoreError::TaskIndexUnresolvable(
            "no task index source set".to_string(),
        ));
    };

    if let Some(prefix) = label.split('-').next() {
        if let Ok(index) = prefix.trim().parse::<i64>() {
            return Ok(index);
        }
    }

    label.parse::<i64>().map_err(|_| {
        CoreError::TaskIndexUnresolvable(format!(
            "frame label {label:?} does not contain an integer index"
        ))
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::io::Write;

    fn plan_with_tasks(n: u32) -> RenderPlan {
        RenderPlan {
            job_id: "job-1".to_string(),
            project: ProjectInfo::default(),
            render: RenderSettings::default(),
            map_asset_path: "/Game/Maps/Main".to_string(),
            level_sequence_asset_path: "/Game/Seqs/Seq1.Seq1".to_string(),
            executor_class: "/Script/Renderer.CmdExecutor".to_string(),
            tasks: (0..n)
                .map(|i| TaskDescriptor {
                    task_index: i,
                    shot: None,
                    frame_range: None,
                    extensions: BTreeMap::new(),
                })
                .collect(),
        }
    }

    // -- resolution -----------------------------------------------------------

    #[test]
    fn primary_index_in_range_resolves_exact_task() {
        let plan = plan_with_tasks(5);
        for i in 0..5 {
            let task = resolve_task(&plan, Some(&i.to_string()), None).unwrap();
            assert_eq!(task.task_index, i);
        }
    }

    #[test]
    fn index_equal_to_len_is_out_of_range() {
        let plan = plan_with_tasks(3);
        let err = resolve_task(&plan, Some("3"), None).unwrap_err();
        assert_matches!(err, CoreError::TaskIndexOutOfRange { index: 3, len: 3 });
    }

    #[test]
    fn negative_index_is_out_of_range() {
        let plan = plan_with_tasks(3);
        let err = resolve_task(&plan, Some("-1"), None).unwrap_err();
        assert_matches!(err, CoreError::TaskIndexOutOfRange { index: -1, .. });
    }

    #[test]
    fn frame_label_prefix_resolves() {
        let plan = plan_with_tasks(2);
        let task = resolve_task(&plan, None, Some("0000-render")).unwrap();
        assert_eq!(task.task_index, 0);
    }

    #[test]
    fn bare_integer_frame_label_resolves() {
        assert_eq!(resolve_task_index(None, Some("7")).unwrap(), 7);
    }

    #[test]
    fn unparsable_primary_falls_back_to_label() {
        assert_eq!(resolve_task_index(Some("abc"), Some("2-shot")).unwrap(), 2);
    }

    #[test]
    fn no_sources_is_unresolvable() {
        let err = resolve_task_index(None, None).unwrap_err();
        assert_matches!(err, CoreError::TaskIndexUnresolvable(_));
    }

    #[test]
    fn non_numeric_label_is_unresolvable() {
        let err = resolve_task_index(None, Some("abc")).unwrap_err();
        assert_matches!(err, CoreError::TaskIndexUnresolvable(_));
    }

    // -- validation -----------------------------------------------------------

    #[test]
    fn valid_plan_passes() {
        assert!(plan_with_tasks(4).validate().is_ok());
    }

    #[test]
    fn empty_task_list_rejected() {
        let plan = plan_with_tasks(0);
        assert_matches!(plan.validate(), Err(CoreError::PlanMalformed(_)));
    }

    #[test]
    fn duplicate_index_rejected() {
        let mut plan = plan_with_tasks(3);
        plan.tasks[2].task_index = 1;
        assert_matches!(plan.validate(), Err(CoreError::PlanMalformed(_)));
    }

    #[test]
    fn non_contiguous_indices_rejected() {
        let mut plan = plan_with_tasks(3);
        plan.tasks[1].task_index = 5;
        assert_matches!(plan.validate(), Err(CoreError::PlanMalformed(_)));
    }

    #[test]
    fn empty_job_id_rejected() {
        let mut plan = plan_with_tasks(1);
        plan.job_id = "  ".to_string();
        assert_matches!(plan.validate(), Err(CoreError::PlanMalformed(_)));
    }

    // -- loading --------------------------------------------------------------

    #[test]
    fn missing_file_is_plan_not_found() {
        let err = RenderPlan::load(Path::new("/nonexistent/render_plan.json")).unwrap_err();
        assert_matches!(err, CoreError::PlanNotFound(_));
    }

    #[test]
    fn invalid_json_is_plan_malformed() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{ not json").unwrap();
        let err = RenderPlan::load(file.path()).unwrap_err();
        assert_matches!(err, CoreError::PlanMalformed(_));
    }

    #[test]
    fn load_round_trips_serialized_plan() {
        let plan = plan_with_tasks(2);
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(serde_json::to_string(&plan).unwrap().as_bytes())
            .unwrap();

        let loaded = RenderPlan::load(file.path()).unwrap();
        assert_eq!(loaded.job_id, "job-1");
        assert_eq!(loaded.tasks.len(), 2);
    }

    // -- checksum -------------------------------------------------------------

    #[test]
    fn sha256_match_accepted() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"hello").unwrap();
        // sha256("hello")
        let expected = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";
        assert!(verify_sha256(file.path(), expected).is_ok());
        assert!(verify_sha256(file.path(), &expected.to_uppercase()).is_ok());
    }

    #[test]
    fn sha256_mismatch_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"hello").unwrap();
        let err = verify_sha256(file.path(), "deadbeef").unwrap_err();
        assert_matches!(err, CoreError::PlanMalformed(_));
    }

    #[test]
    fn empty_expected_skips_verification() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(verify_sha256(file.path(), "").is_ok());
    }
}
