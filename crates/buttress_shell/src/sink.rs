//! Captured subprocess output.

use chrono::{DateTime, Utc};

/// Which stream a line arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// Standard output
    Stdout,
    /// Standard error
    Stderr,
}

/// One captured line with its capture timestamp
#[derive(Debug, Clone)]
pub struct OutputLine {
    /// The stream the line arrived on
    pub kind: StreamKind,
    /// The line, without its terminator
    pub line: String,
    /// When the line was captured
    pub when: DateTime<Utc>,
}

impl OutputLine {
    /// Capture a line now
    #[must_use]
    pub fn new(kind: StreamKind, line: impl Into<String>) -> Self {
        Self {
            kind,
            line: line.into(),
            when: Utc::now(),
        }
    }
}

/// Ordered collection of captured output lines
#[derive(Debug, Clone, Default)]
pub struct OutputSink {
    lines: Vec<OutputLine>,
}

impl OutputSink {
    /// Create an empty sink
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a stdout line
    pub fn output(&mut self, line: impl Into<String>) {
        self.lines.push(OutputLine::new(StreamKind::Stdout, line));
    }

    /// Record a stderr line
    pub fn error(&mut self, line: impl Into<String>) {
        self.lines.push(OutputLine::new(StreamKind::Stderr, line));
    }

    /// All captured lines in arrival order
    #[must_use]
    pub fn lines(&self) -> &[OutputLine] {
        &self.lines
    }

    /// Captured stdout lines
    #[must_use]
    pub fn stdout(&self) -> Vec<String> {
        self.select(StreamKind::Stdout)
    }

    /// Captured stderr lines
    #[must_use]
    pub fn stderr(&self) -> Vec<String> {
        self.select(StreamKind::Stderr)
    }

    fn select(&self, kind: StreamKind) -> Vec<String> {
        self.lines
            .iter()
            .filter(|line| line.kind == kind)
            .map(|line| line.line.clone())
            .collect()
    }
}
