//! Engine executable and project file resolution.
//!
//! Launch inputs arrive from several places (explicit flag, environment
//! variable, configured engine root, plan hint). Resolution is an
//! ordered list of candidate paths tried in sequence until one exists;
//! a failure reports every candidate that was checked so a
//! misconfigured host is diagnosable from the log alone.

use std::path::{Path, PathBuf};

/// Resolution failure carrying every path that was tried, in order.
#[derive(Debug, thiserror::Error)]
#[error("{what} not found; checked candidates: {}", format_candidates(.candidates))]
pub struct LaunchResolveError {
    pub what: &'static str,
    pub candidates: Vec<PathBuf>,
}

fn format_candidates(candidates: &[PathBuf]) -> String {
    if candidates.is_empty() {
        return "<none>".to_string();
    }
    candidates
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Return the first existing candidate, or an error naming all of them.
pub fn first_existing(
    what: &'static str,
    candidates: Vec<PathBuf>,
) -> Result<PathBuf, LaunchResolveError> {
    for candidate in &candidates {
        if candidate.exists() {
            return Ok(candidate.clone());
        }
    }
    Err(LaunchResolveError { what, candidates })
}

/// Derive the command-line editor binary from an engine root, or pass
/// an explicit binary path through unchanged.
pub fn engine_cmd_from_root(root_or_cmd: &Path) -> PathBuf {
    if root_or_cmd
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("exe"))
    {
        return root_or_cmd.to_path_buf();
    }

    if cfg!(windows) {
        root_or_cmd.join("Engine/Binaries/Win64/UnrealEditor-Cmd.exe")
    } else {
        root_or_cmd.join("Engine/Binaries/Linux/UnrealEditor-Cmd")
    }
}

/// Build the ordered candidate list for the engine binary.
///
/// Precedence: explicit path, `ENGINE_CMD_PATH`, then the binary derived
/// from each configured root (explicit root, `ENGINE_ROOT`, config root).
pub fn engine_cmd_candidates(
    explicit_cmd: Option<&Path>,
    env_cmd: Option<&Path>,
    roots: &[&Path],
) -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(p) = explicit_cmd {
        candidates.push(p.to_path_buf());
    }
    if let Some(p) = env_cmd {
        candidates.push(p.to_path_buf());
    }
    for root in roots {
        if !root.as_os_str().is_empty() {
            candidates.push(engine_cmd_from_root(root));
        }
    }
    candidates
}

/// Build the ordered candidate list for the engine project file.
///
/// Precedence: explicit path, `PROJECT_PATH`, configured path, the
/// plan's project hint, and the hint joined onto `PROJECT_ROOT`.
pub fn project_file_candidates(
    explicit: Option<&Path>,
    env_path: Option<&Path>,
    configured: Option<&Path>,
    plan_hint: &str,
    project_root: Option<&Path>,
) -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    for p in [explicit, env_path, configured].into_iter().flatten() {
        if !p.as_os_str().is_empty() {
            candidates.push(p.to_path_buf());
        }
    }
    if !plan_hint.is_empty() {
        candidates.push(PathBuf::from(plan_hint));
        if let Some(root) = project_root {
            candidates.push(root.join(plan_hint));
        }
    }
    candidates
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_binary_passes_through() {
        let p = Path::new("/opt/engine/UnrealEditor-Cmd.exe");
        assert_eq!(engine_cmd_from_root(p), p);
    }

    #[test]
    fn root_derives_platform_binary() {
        let derived = engine_cmd_from_root(Path::new("/opt/engine"));
        assert!(derived.starts_with("/opt/engine/Engine/Binaries"));
        assert!(derived
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("UnrealEditor-Cmd"));
    }

    #[test]
    fn candidate_order_is_explicit_then_env_then_roots() {
        let candidates = engine_cmd_candidates(
            Some(Path::new("/a/cmd.exe")),
            Some(Path::new("/b/cmd.exe")),
            &[Path::new("/root1"), Path::new("/root2")],
        );
        assert_eq!(candidates[0], Path::new("/a/cmd.exe"));
        assert_eq!(candidates[1], Path::new("/b/cmd.exe"));
        assert!(candidates[2].starts_with("/root1"));
        assert!(candidates[3].starts_with("/root2"));
    }

    #[test]
    fn empty_roots_skipped() {
        let candidates = engine_cmd_candidates(None, None, &[Path::new("")]);
        assert!(candidates.is_empty());
    }

    #[test]
    fn first_existing_picks_earliest_hit() {
        let dir = tempfile::tempdir().unwrap();
        let exists = dir.path().join("real");
        std::fs::write(&exists, b"").unwrap();

        let resolved = first_existing(
            "engine binary",
            vec![dir.path().join("missing"), exists.clone()],
        )
        .unwrap();
        assert_eq!(resolved, exists);
    }

    #[test]
    fn resolve_failure_names_all_candidates() {
        let err = first_existing(
            "project file",
            vec![PathBuf::from("/no/a"), PathBuf::from("/no/b")],
        )
        .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("/no/a"));
        assert!(msg.contains("/no/b"));
    }

    #[test]
    fn project_candidates_include_hint_under_root() {
        let candidates = project_file_candidates(
            None,
            None,
            None,
            "Game/Game.uproject",
            Some(Path::new("/projects")),
        );
        assert_eq!(candidates[0], Path::new("Game/Game.uproject"));
        assert_eq!(candidates[1], Path::new("/projects/Game/Game.uproject"));
    }
}
