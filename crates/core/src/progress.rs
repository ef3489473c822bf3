//! Progress extraction from engine log lines.
//!
//! The engine-side executor prints `Render progress: NN%` and
//! `Encoding progress: NN%` lines while a task runs. The supervisor
//! parses them to surface coarse progress without any richer channel
//! into the engine.

use std::sync::OnceLock;

use regex::Regex;

/// Which phase of the task the engine is reporting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressStage {
    Rendering,
    Encoding,
}

fn render_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\[\w+\]\s*Render progress:\s*([0-9]+(?:\.[0-9]+)?)%").unwrap()
    })
}

fn encoding_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\[\w+\]\s*Encoding progress:\s*([0-9]+(?:\.[0-9]+)?)%").unwrap()
    })
}

/// Parse one log line into a progress report, if it carries one.
pub fn parse_progress_line(line: &str) -> Option<(ProgressStage, f64)> {
    if let Some(caps) = render_re().captures(line) {
        return Some((ProgressStage::Rendering, caps[1].parse().ok()?));
    }
    if let Some(caps) = encoding_re().captures(line) {
        return Some((ProgressStage::Encoding, caps[1].parse().ok()?));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_progress_parsed() {
        let line = "[CmdExecutor] Render progress: 42.5%";
        assert_eq!(
            parse_progress_line(line),
            Some((ProgressStage::Rendering, 42.5))
        );
    }

    #[test]
    fn encoding_progress_parsed() {
        let line = "LogOutput: [CmdExecutor] Encoding progress: 100%";
        assert_eq!(
            parse_progress_line(line),
            Some((ProgressStage::Encoding, 100.0))
        );
    }

    #[test]
    fn case_insensitive() {
        let line = "[cmdexecutor] render PROGRESS: 7%";
        assert_eq!(
            parse_progress_line(line),
            Some((ProgressStage::Rendering, 7.0))
        );
    }

    #[test]
    fn unrelated_lines_ignored() {
        assert_eq!(parse_progress_line("Loading map /Game/Maps/Main"), None);
        assert_eq!(parse_progress_line("progress: 50%"), None);
    }
}
