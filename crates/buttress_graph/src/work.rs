//! Stock `Work` implementations.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures::future::BoxFuture;

use buttress_core::{Artifact, BuildError, BuildResult};

use crate::recipe::Work;

/// Work that does nothing but mark itself complete
///
/// The aggregate-target pattern: a recipe whose only job is pulling its
/// dependencies up to date (e.g. an `all` default target).
#[derive(Debug, Default)]
pub struct Group {
    done: AtomicBool,
}

impl Group {
    /// Create a group work
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Work for Group {
    fn completed(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }

    async fn perform(&self, _input: &Artifact) -> BuildResult<()> {
        self.done.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// A file that must already exist
///
/// Never built: when the file is present the staleness rule skips it, and
/// when it is absent, performing it is the missing-static-file failure.
#[derive(Debug)]
pub struct StaticFile {
    path: PathBuf,
}

impl StaticFile {
    /// Declare a required static file
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Work for StaticFile {
    fn output(&self) -> Artifact {
        Artifact::file(&self.path)
    }

    async fn perform(&self, _input: &Artifact) -> BuildResult<()> {
        Err(BuildError::MissingStaticFile {
            path: self.path.clone(),
        })
    }
}

/// Closure-backed work
///
/// Runs an async closure over the combined input and exposes a fixed output
/// artifact; with a Null output, explicit completion kicks in after the
/// first successful run.
pub struct Func {
    output: Artifact,
    action: Box<dyn Fn(Artifact) -> BoxFuture<'static, BuildResult<()>> + Send + Sync>,
    done: AtomicBool,
}

impl Func {
    /// Create work from an output artifact and an async action
    #[must_use]
    pub fn new(
        output: Artifact,
        action: impl Fn(Artifact) -> BoxFuture<'static, BuildResult<()>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            output,
            action: Box::new(action),
            done: AtomicBool::new(false),
        }
    }
}

impl std::fmt::Debug for Func {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Func")
            .field("output", &self.output)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Work for Func {
    fn output(&self) -> Artifact {
        self.output.clone()
    }

    fn completed(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }

    async fn perform(&self, input: &Artifact) -> BuildResult<()> {
        (self.action)(input.clone()).await?;
        self.done.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Steps run strictly in order
///
/// Sequential composition (configure, then build, then check): each step
/// performs against the same combined input, one after another, and a step
/// that is already done is skipped.
#[derive(Default)]
pub struct Seq {
    steps: Vec<Box<dyn Work>>,
}

impl Seq {
    /// Create an empty sequence
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step
    #[must_use]
    pub fn then(mut self, step: impl Work + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }
}

impl std::fmt::Debug for Seq {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Seq")
            .field("steps", &self.steps.len())
            .finish()
    }
}

#[async_trait]
impl Work for Seq {
    fn output(&self) -> Artifact {
        Artifact::poly(self.steps.iter().map(|step| step.output()))
    }

    fn completed(&self) -> bool {
        !self.steps.is_empty() && self.steps.iter().all(|step| step.completed())
    }

    fn input_artifacts(&self) -> Artifact {
        Artifact::poly(self.steps.iter().map(|step| step.input_artifacts()))
    }

    async fn perform(&self, input: &Artifact) -> BuildResult<()> {
        for step in &self.steps {
            let output = step.output();
            let done = if output.is_null() {
                step.completed()
            } else {
                output.exists() && output.age() <= input.age()
            };
            if !done {
                step.perform(input).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_group_completes_after_perform() {
        let group = Group::new();
        assert!(!group.completed());
        group.perform(&Artifact::Null).await.unwrap();
        assert!(group.completed());
    }

    #[tokio::test]
    async fn test_static_file_perform_is_the_missing_error() {
        let work = StaticFile::new("/nonexistent/include/api.h");
        let err = work.perform(&Artifact::Null).await.unwrap_err();
        assert!(matches!(err, BuildError::MissingStaticFile { .. }));
    }

    #[tokio::test]
    async fn test_func_runs_action_with_input() {
        let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let work = Func::new(Artifact::Null, move |input| {
            let sink = sink.clone();
            Box::pin(async move {
                sink.lock().unwrap().extend(input.to_params(None));
                Ok(())
            })
        });

        let input = Artifact::poly([Artifact::value("a"), Artifact::value("b")]);
        work.perform(&input).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["a", "b"]);
        assert!(work.completed());
    }

    #[tokio::test]
    async fn test_seq_runs_steps_in_order() {
        let order = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));

        let step = |tag: &'static str| {
            let order = order.clone();
            Func::new(Artifact::Null, move |_| {
                let order = order.clone();
                Box::pin(async move {
                    order.lock().unwrap().push(tag);
                    Ok(())
                })
            })
        };

        let seq = Seq::new()
            .then(step("configure"))
            .then(step("build"))
            .then(step("check"));

        assert!(!seq.completed());
        seq.perform(&Artifact::Null).await.unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["configure", "build", "check"]);
        assert!(seq.completed());
    }

    #[tokio::test]
    async fn test_seq_stops_at_first_failure() {
        let ran_last = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let observed = ran_last.clone();

        let seq = Seq::new()
            .then(Func::new(Artifact::Null, |_| {
                Box::pin(async {
                    Err(BuildError::Misconfigured {
                        reason: "broken step".to_string(),
                    })
                })
            }))
            .then(Func::new(Artifact::Null, move |_| {
                let observed = observed.clone();
                Box::pin(async move {
                    observed.store(true, std::sync::atomic::Ordering::SeqCst);
                    Ok(())
                })
            }));

        assert!(seq.perform(&Artifact::Null).await.is_err());
        assert!(!ran_last.load(std::sync::atomic::Ordering::SeqCst));
    }
}
