//! The state of one shell execution.

use std::collections::BTreeSet;
use std::sync::Mutex;

use buttress_core::{Age, Artifact, BuildError, BuildResult};

use crate::sink::OutputSink;

#[derive(Debug, Default)]
struct ResultState {
    returncode: Option<i32>,
    sink: OutputSink,
}

/// Captured result of a shell command: a backing artifact, a set-once
/// return code, and the command's output lines
///
/// The backing artifact is the command's declared output file, or Null for
/// commands that produce none; existence, age, and cleaning delegate to it.
#[derive(Debug)]
pub struct ShellResult {
    file: Artifact,
    success_codes: BTreeSet<i32>,
    state: Mutex<ResultState>,
}

impl ShellResult {
    /// Create a result over a Null or File backing artifact
    ///
    /// # Errors
    ///
    /// Returns a misconfiguration error for Value or Poly backing artifacts.
    pub fn new(file: Artifact, success_codes: BTreeSet<i32>) -> BuildResult<Self> {
        if !matches!(file, Artifact::Null | Artifact::File(_)) {
            return Err(BuildError::Misconfigured {
                reason: "shell output must be a file or nothing".to_string(),
            });
        }
        Ok(Self {
            file,
            success_codes,
            state: Mutex::new(ResultState::default()),
        })
    }

    /// The backing artifact
    #[must_use]
    pub fn file(&self) -> &Artifact {
        &self.file
    }

    /// The configured success return codes
    #[must_use]
    pub fn success_codes(&self) -> &BTreeSet<i32> {
        &self.success_codes
    }

    /// The captured return code
    ///
    /// # Errors
    ///
    /// Returns an error when no return code has been received yet.
    pub fn returncode(&self) -> BuildResult<i32> {
        self.lock().returncode.ok_or(BuildError::ReturnCodeUnset)
    }

    /// Whether a return code has been received
    #[must_use]
    pub fn has_returncode(&self) -> bool {
        self.lock().returncode.is_some()
    }

    /// Record the return code, exactly once
    ///
    /// # Errors
    ///
    /// Returns an error when a return code was already recorded.
    pub fn set_returncode(&self, code: i32) -> BuildResult<()> {
        let mut state = self.lock();
        if let Some(existing) = state.returncode {
            return Err(BuildError::ReturnCodeAlreadySet { code: existing });
        }
        state.returncode = Some(code);
        Ok(())
    }

    /// Attach the captured output
    pub fn set_sink(&self, sink: OutputSink) {
        self.lock().sink = sink;
    }

    /// Captured stdout lines
    #[must_use]
    pub fn stdout(&self) -> Vec<String> {
        self.lock().sink.stdout()
    }

    /// Captured stderr lines
    #[must_use]
    pub fn stderr(&self) -> Vec<String> {
        self.lock().sink.stderr()
    }

    /// Whether the command completed with a success return code
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.lock()
            .returncode
            .is_some_and(|code| self.success_codes.contains(&code))
    }

    /// Whether the backing artifact exists
    #[must_use]
    pub fn exists(&self) -> bool {
        self.file.exists()
    }

    /// Age of the backing artifact
    #[must_use]
    pub fn age(&self) -> Age {
        self.file.age()
    }

    /// Clean the backing artifact
    ///
    /// # Errors
    ///
    /// Propagates filesystem failures from the artifact.
    pub async fn clean(&self) -> BuildResult<()> {
        self.file.clean().await
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ResultState> {
        self.state.lock().expect("shell result lock poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_codes() -> BTreeSet<i32> {
        BTreeSet::from([0])
    }

    #[test]
    fn test_returncode_before_set_is_error() {
        let result = ShellResult::new(Artifact::Null, default_codes()).unwrap();
        assert_eq!(result.returncode(), Err(BuildError::ReturnCodeUnset));
        assert!(!result.has_returncode());
        assert!(!result.succeeded());
    }

    #[test]
    fn test_returncode_sets_once() {
        let result = ShellResult::new(Artifact::Null, default_codes()).unwrap();
        result.set_returncode(0).unwrap();
        assert_eq!(result.returncode(), Ok(0));
        assert!(result.succeeded());

        assert_eq!(
            result.set_returncode(1),
            Err(BuildError::ReturnCodeAlreadySet { code: 0 })
        );
    }

    #[test]
    fn test_custom_success_codes() {
        let result = ShellResult::new(Artifact::Null, BTreeSet::from([0, 3])).unwrap();
        result.set_returncode(3).unwrap();
        assert!(result.succeeded());
    }

    #[test]
    fn test_failure_code() {
        let result = ShellResult::new(Artifact::Null, default_codes()).unwrap();
        result.set_returncode(2).unwrap();
        assert!(!result.succeeded());
    }

    #[test]
    fn test_rejects_value_backing() {
        let err = ShellResult::new(Artifact::value(1), default_codes()).unwrap_err();
        assert!(matches!(err, BuildError::Misconfigured { .. }));
    }

    #[test]
    fn test_sink_views() {
        let result = ShellResult::new(Artifact::Null, default_codes()).unwrap();
        let mut sink = OutputSink::new();
        sink.output("out line");
        sink.error("err line");
        result.set_sink(sink);

        assert_eq!(result.stdout(), vec!["out line"]);
        assert_eq!(result.stderr(), vec!["err line"]);
    }

    #[test]
    fn test_null_backing_never_exists() {
        let result = ShellResult::new(Artifact::Null, default_codes()).unwrap();
        assert!(!result.exists());
        assert!(result.age().is_infinite());
    }
}
