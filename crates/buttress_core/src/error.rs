//! Build error taxonomy for BUTTRESS.

use std::path::PathBuf;

/// Build result type
pub type BuildResult<T> = Result<T, BuildError>;

/// Build error type
///
/// Errors stay `Clone` and `PartialEq` so aggregates can be compared in
/// tests; I/O and spawn failures carry rendered messages for that reason.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BuildError {
    /// Requested target name is not registered
    #[error("unknown target: '{name}'")]
    UnknownTarget {
        /// The requested name
        name: String,
    },

    /// Requested name resolves to a plain value, not a recipe
    #[error("'{name}' is not a recipe")]
    NotARecipe {
        /// The requested name
        name: String,
    },

    /// Requested name is a recipe but not selectable from the build surface
    #[error("'{name}' is not a target")]
    NotATarget {
        /// The requested name
        name: String,
    },

    /// No targets were requested and no default target is registered
    #[error("no target or default specified")]
    NoDefaultTarget,

    /// The registration table contains a dependency cycle
    #[error("dependency cycle detected at '{name}'")]
    CycleDetected {
        /// Name at which the cycle was observed
        name: String,
    },

    /// A required static file is absent
    #[error("a required static file is missing: {}", .path.display())]
    MissingStaticFile {
        /// The missing path
        path: PathBuf,
    },

    /// A recipe's work finished without satisfying the staleness rule
    #[error("recipe '{recipe}' finished but its output is still stale")]
    StaleOutput {
        /// The offending recipe
        recipe: String,
    },

    /// A dependency completed without producing a done output
    #[error("recipe '{recipe}': dependency '{dependency}' resolved without completing")]
    DependencyUnresolved {
        /// The dependent recipe
        recipe: String,
        /// The dependency that produced nothing
        dependency: String,
    },

    /// Subprocess return code outside the configured success set
    #[error("shell command failed (returncode: {code}): {command}")]
    ShellFailure {
        /// The rendered command line
        command: String,
        /// The captured return code
        code: i32,
        /// Captured stderr lines
        stderr: Vec<String>,
    },

    /// Invalid recipe configuration, raised eagerly at construction
    #[error("misconfigured recipe: {reason}")]
    Misconfigured {
        /// What was wrong
        reason: String,
    },

    /// A return code was read before the subprocess delivered one
    #[error("return code has not yet been received")]
    ReturnCodeUnset,

    /// A return code was delivered twice
    #[error("return code has already been set (to {code})")]
    ReturnCodeAlreadySet {
        /// The previously captured code
        code: i32,
    },

    /// One or more failures from a parallel fan-out, all preserved in order
    #[error("{} build error(s): [{}]", .errors.len(), render_all(.errors))]
    Aggregate {
        /// The underlying errors, in branch order
        errors: Vec<BuildError>,
    },

    /// Filesystem operation failure
    #[error("{}: {message}", .path.display())]
    Io {
        /// The path being operated on
        path: PathBuf,
        /// Rendered OS error
        message: String,
    },

    /// Subprocess could not be spawned
    #[error("failed to spawn '{command}': {message}")]
    Spawn {
        /// The command that would not start
        command: String,
        /// Rendered OS error
        message: String,
    },

    /// Unexpected internal failure (e.g. a panicked branch)
    #[error("internal error: {message}")]
    Internal {
        /// What happened
        message: String,
    },
}

impl BuildError {
    /// Wrap a filesystem error with the path it concerned
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, err: &std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: err.to_string(),
        }
    }

    /// Collapse fan-out failures into one error
    ///
    /// A single failure passes through unchanged; several wrap into
    /// [`BuildError::Aggregate`] preserving branch order.
    ///
    /// # Panics
    ///
    /// Panics if `errors` is empty; callers aggregate only when at least one
    /// branch failed.
    #[must_use]
    pub fn aggregate(mut errors: Vec<BuildError>) -> Self {
        assert!(!errors.is_empty(), "aggregating zero errors");
        if errors.len() == 1 {
            errors.remove(0)
        } else {
            Self::Aggregate { errors }
        }
    }

    /// The underlying errors of an aggregate, or a slice of just `self`
    #[must_use]
    pub fn flatten(&self) -> Vec<&BuildError> {
        match self {
            Self::Aggregate { errors } => errors.iter().collect(),
            other => vec![other],
        }
    }
}

fn render_all(errors: &[BuildError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
