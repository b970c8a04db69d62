//! Output classification and buffering for project logs.
//!
//! Every line a child process writes is tagged with a [`LineKind`] derived from
//! keyword matches. The tag only drives coloring; it never affects the run state.

use std::collections::VecDeque;

use strip_ansi_escapes::strip;

/// Display classification of an output line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    /// Contains `error`, `failed` or `exception`.
    Error,
    /// Contains `server`, `listening`, `ready`, `compiled` or `running`.
    Ready,
    /// Contains `warning` or `warn`.
    Warning,
    /// Anything else.
    Default,
}

const ERROR_KEYWORDS: &[&str] = &["error", "failed", "exception"];
const READY_KEYWORDS: &[&str] = &["server", "listening", "ready", "compiled", "running"];
const WARNING_KEYWORDS: &[&str] = &["warning", "warn"];

/// Classifies a line by case-insensitive keyword match, ignoring ANSI escapes.
///
/// Keyword sets are checked in order: error, ready, warning.
pub fn classify(line: &str) -> LineKind {
    let lowered = sanitize_text(line, true).to_lowercase();
    let mentions = |keywords: &[&str]| keywords.iter().any(|k| lowered.contains(k));
    if mentions(ERROR_KEYWORDS) {
        LineKind::Error
    } else if mentions(READY_KEYWORDS) {
        LineKind::Ready
    } else if mentions(WARNING_KEYWORDS) {
        LineKind::Warning
    } else {
        LineKind::Default
    }
}

/// Which step of a run produced a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Dependency installation.
    Install,
    /// The project itself.
    Run,
}

/// A single line of output from a run.
#[derive(Debug, Clone)]
pub struct LogLine {
    pub text: String,
    pub kind: LineKind,
    pub phase: Phase,
}

/// A fixed-capacity ring buffer for storing `LogLine`s.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    max_lines: usize,
    lines: VecDeque<LogLine>,
}

impl LogBuffer {
    /// Creates a new `LogBuffer` with the specified maximum capacity.
    pub fn new(max_lines: usize) -> Self {
        Self {
            max_lines: max_lines.max(1),
            lines: VecDeque::with_capacity(max_lines.min(1024)),
        }
    }

    /// Adds a line to the buffer.
    ///
    /// Returns `true` if an old line was dropped to make room.
    pub fn push(&mut self, line: LogLine) -> bool {
        let mut dropped = false;
        self.lines.push_back(line);
        while self.lines.len() > self.max_lines {
            self.lines.pop_front();
            dropped = true;
        }
        dropped
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogLine> {
        self.lines.iter()
    }
}

/// Sanitizes text for display, optionally stripping ANSI escape codes.
///
/// Invalid UTF-8 sequences left behind by stripping are replaced.
pub fn sanitize_text(text: &str, strip_ansi: bool) -> String {
    if !strip_ansi {
        return text.to_string();
    }
    let stripped = strip(text.as_bytes());
    String::from_utf8_lossy(&stripped).to_string()
}

/// Drops everything before the last carriage return, the way a terminal would
/// overwrite a progress line.
pub fn strip_carriage(text: &str) -> String {
    text.rsplit('\r').next().unwrap_or("").to_string()
}
