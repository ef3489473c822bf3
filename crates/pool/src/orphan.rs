//! Orphaned worker cleanup.
//!
//! Every spawned worker gets a pid file next to its log. A service that
//! dies without draining leaves engine processes behind; on the next
//! startup [`reclaim_orphans`] kills whatever those pid files name and
//! removes the files before any new worker is spawned.

use std::path::{Path, PathBuf};

/// Pid file location for a worker, derived from its log path.
pub(crate) fn pid_file_path(log_path: &Path) -> PathBuf {
    log_path.with_extension("pid")
}

pub(crate) fn write_pid_file(log_path: &Path, pid: u32) -> std::io::Result<()> {
    std::fs::write(pid_file_path(log_path), format!("{pid}\n"))
}

pub(crate) fn remove_pid_file(log_path: &Path) {
    let path = pid_file_path(log_path);
    if let Err(e) = std::fs::remove_file(&path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove pid file");
        }
    }
}

/// Kill every process named by a `.pid` file under `log_root` and
/// delete the files. Returns how many files were reclaimed.
///
/// Call this before spawning any workers: a pid file present at startup
/// can only belong to a previous run of the service.
pub fn reclaim_orphans(log_root: &Path) -> std::io::Result<usize> {
    let mut reclaimed = 0;

    let entries = match std::fs::read_dir(log_root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("pid") {
            continue;
        }

        match std::fs::read_to_string(&path) {
            Ok(contents) => match contents.trim().parse::<u32>() {
                Ok(pid) if pid > 1 => {
                    tracing::warn!(pid, path = %path.display(), "Killing orphaned worker");
                    kill_pid(pid);
                }
                _ => {
                    tracing::warn!(path = %path.display(), "Ignoring malformed pid file");
                }
            },
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read pid file");
            }
        }

        std::fs::remove_file(&path)?;
        reclaimed += 1;
    }

    Ok(reclaimed)
}

#[cfg(unix)]
fn kill_pid(pid: u32) {
    // ESRCH for a long-gone pid is expected and ignored.
    unsafe {
        libc::kill(pid as libc::pid_t, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_pid(_pid: u32) {}
