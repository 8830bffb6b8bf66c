//! Recipes: repeatable units of work with declared dependencies.
//!
//! A recipe owns a `Work` implementation, a list of dependency recipes
//! (shared `Arc`s, so a diamond-shaped graph converges on one node), and a
//! per-node guard that makes execution at-most-once per build invocation.
//!
//! The staleness rule used throughout: a recipe is done iff its output
//! exists and its output's age is less than or equal to its input's age.
//! Works with no inspectable output report completion explicitly instead.

use std::fmt;
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::BoxFuture;
use indexmap::IndexMap;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use buttress_core::{Artifact, BuildError, BuildResult};

use crate::aggregate::join_all_aggregated;

/// A unit of actual work performed by a recipe
///
/// `perform` receives the recipe's combined input artifact. Implementations
/// with a real output expose it through `output`; implementations with no
/// output (a Null artifact) must report completion through `completed`,
/// since the staleness rule can never mark them done.
#[async_trait]
pub trait Work: Send + Sync {
    /// The artifact this work produces
    fn output(&self) -> Artifact {
        Artifact::Null
    }

    /// Explicit completion state, for works with a Null output
    fn completed(&self) -> bool {
        false
    }

    /// Input artifacts declared directly on the work, beyond dependency
    /// outputs
    fn input_artifacts(&self) -> Artifact {
        Artifact::Null
    }

    /// Human-readable description (e.g. a rendered command line)
    fn display(&self) -> Option<String> {
        None
    }

    /// Run the work
    ///
    /// # Errors
    ///
    /// Returns an error when the work fails; the resolution engine surfaces
    /// it as the recipe's failure.
    async fn perform(&self, input: &Artifact) -> BuildResult<()>;
}

/// Lifecycle timestamps of one recipe within one build invocation
#[derive(Debug, Clone)]
pub struct Lifecycle {
    /// When the recipe object was constructed
    pub created: DateTime<Utc>,
    /// When resolution of this recipe began
    pub started: Option<DateTime<Utc>>,
    /// When resolution finished
    pub finished: Option<DateTime<Utc>>,
    /// Whether resolution was skipped because the recipe was already done
    pub skipped: bool,
}

impl Lifecycle {
    fn new() -> Self {
        Self {
            created: Utc::now(),
            started: None,
            finished: None,
            skipped: false,
        }
    }
}

/// A repeatable unit of work producing an artifact
pub struct Recipe {
    /// Display name
    name: String,
    /// Whether this recipe is selectable from the build surface
    target: bool,
    /// Direct dependencies, shared across dependents
    deps: Vec<Arc<Recipe>>,
    /// The actual work
    work: Box<dyn Work>,
    /// Exclusive-execution guard, created with the node
    guard: Mutex<()>,
    /// Lifecycle history for this invocation
    lifecycle: StdMutex<Lifecycle>,
}

impl Recipe {
    /// Create a recipe node
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        target: bool,
        deps: Vec<Arc<Recipe>>,
        work: Box<dyn Work>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            target,
            deps,
            work,
            guard: Mutex::new(()),
            lifecycle: StdMutex::new(Lifecycle::new()),
        })
    }

    /// Display name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this recipe is selectable from the build surface
    #[must_use]
    pub fn is_target(&self) -> bool {
        self.target
    }

    /// This recipe's own output artifact
    #[must_use]
    pub fn output(&self) -> Artifact {
        self.work.output()
    }

    /// The combined artifact of all dependency outputs plus the work's
    /// declared inputs
    #[must_use]
    pub fn input(&self) -> Artifact {
        let mut members: Vec<Artifact> = self.deps.iter().map(|dep| dep.output()).collect();
        members.push(self.work.input_artifacts());
        Artifact::poly(members)
    }

    /// Immediate dependencies, sorted by name for deterministic display
    #[must_use]
    pub fn direct_dependencies(&self) -> Vec<Arc<Recipe>> {
        let mut deps = self.deps.clone();
        deps.sort_by(|a, b| a.name.cmp(&b.name));
        deps
    }

    /// Transitive dependency closure, deduplicated by name
    #[must_use]
    pub fn transitive_dependencies(&self) -> Vec<Arc<Recipe>> {
        let mut seen: IndexMap<String, Arc<Recipe>> = IndexMap::new();
        let mut stack: Vec<Arc<Recipe>> = self.deps.iter().cloned().rev().collect();

        while let Some(dep) = stack.pop() {
            if seen.contains_key(&dep.name) {
                continue;
            }
            stack.extend(dep.deps.iter().cloned().rev());
            seen.insert(dep.name.clone(), dep);
        }

        seen.into_values().collect()
    }

    /// The work's human-readable description, if any
    #[must_use]
    pub fn display_info(&self) -> Option<String> {
        self.work.display()
    }

    /// Lifecycle snapshot for reporting
    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle.lock().expect("lifecycle lock poisoned").clone()
    }

    /// Whether the output is at least as fresh as the input
    ///
    /// A Null output is never done by freshness; the work's explicit
    /// completion state decides instead.
    #[must_use]
    pub fn is_done(&self) -> bool {
        let output = self.output();
        if output.is_null() {
            self.work.completed()
        } else {
            output.exists() && output.age() <= self.input().age()
        }
    }

    /// Resolve this recipe: bring its output up to date
    ///
    /// Skips immediately when already done. Otherwise, under this node's
    /// guard (re-checking doneness after acquisition, so a second arrival
    /// through a diamond merely observes completion), resolves all direct
    /// dependencies concurrently, asserts each is actually done, performs
    /// the work, and re-asserts the staleness rule as a post-condition.
    pub fn resolve(self: Arc<Self>) -> BoxFuture<'static, BuildResult<Artifact>> {
        let this = self;
        async move {
            if this.is_done() {
                this.mark_skipped();
                debug!(recipe = %this.name, "skip (up to date)");
                return Ok(this.output());
            }

            let _guard = this.guard.lock().await;
            if this.is_done() {
                this.mark_skipped();
                debug!(recipe = %this.name, "skip (resolved while waiting)");
                return Ok(this.output());
            }

            this.mark_started();
            info!(recipe = %this.name, "start");

            match this.run_work().await {
                Ok(artifact) => {
                    info!(recipe = %this.name, "ok");
                    Ok(artifact)
                }
                Err(err) => {
                    error!(recipe = %this.name, error = %err, "fail");
                    Err(err)
                }
            }
        }
        .boxed()
    }

    async fn run_work(&self) -> BuildResult<Artifact> {
        join_all_aggregated(self.deps.iter().cloned().map(Recipe::resolve)).await?;

        for dep in &self.deps {
            if !dep.is_done() {
                return Err(BuildError::DependencyUnresolved {
                    recipe: self.name.clone(),
                    dependency: dep.name.clone(),
                });
            }
        }

        let input = self.input();
        self.work.perform(&input).await?;
        self.mark_finished();

        if !self.is_done() {
            return Err(BuildError::StaleOutput {
                recipe: self.name.clone(),
            });
        }

        Ok(self.output())
    }

    /// Delete this recipe's output if it exists; dependencies are untouched
    pub async fn clean(&self) -> BuildResult<()> {
        debug!(recipe = %self.name, "clean");
        self.output().clean().await
    }

    /// Recursively purge dependencies, deepest-first, then clean self
    ///
    /// Cleaning an absent output is a no-op, so purging an already-clean
    /// subtree deletes nothing and does not error.
    pub fn purge(self: Arc<Self>) -> BoxFuture<'static, BuildResult<()>> {
        let this = self;
        async move {
            join_all_aggregated(this.deps.iter().cloned().map(Recipe::purge)).await?;
            this.clean().await
        }
        .boxed()
    }

    fn mark_skipped(&self) {
        let mut lifecycle = self.lifecycle.lock().expect("lifecycle lock poisoned");
        lifecycle.skipped = true;
        if lifecycle.finished.is_none() {
            lifecycle.finished = Some(Utc::now());
        }
    }

    fn mark_started(&self) {
        let mut lifecycle = self.lifecycle.lock().expect("lifecycle lock poisoned");
        if lifecycle.started.is_none() {
            lifecycle.started = Some(Utc::now());
        }
    }

    fn mark_finished(&self) {
        let mut lifecycle = self.lifecycle.lock().expect("lifecycle lock poisoned");
        if lifecycle.finished.is_none() {
            lifecycle.finished = Some(Utc::now());
        }
    }
}

impl fmt::Debug for Recipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recipe")
            .field("name", &self.name)
            .field("target", &self.target)
            .field("deps", &self.deps.iter().map(|d| d.name.clone()).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::work::{Func, Group};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Work that writes fixed contents to a file, counting invocations.
    struct WriteFile {
        path: std::path::PathBuf,
        contents: String,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Work for WriteFile {
        fn output(&self) -> Artifact {
            Artifact::file(&self.path)
        }

        async fn perform(&self, _input: &Artifact) -> BuildResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::fs::write(&self.path, &self.contents)
                .await
                .map_err(|e| BuildError::io(&self.path, &e))
        }
    }

    /// Work claiming a file output it never writes.
    struct NeverWrites {
        path: std::path::PathBuf,
    }

    #[async_trait]
    impl Work for NeverWrites {
        fn output(&self) -> Artifact {
            Artifact::file(&self.path)
        }

        async fn perform(&self, _input: &Artifact) -> BuildResult<()> {
            Ok(())
        }
    }

    fn write_file(
        dir: &std::path::Path,
        name: &str,
        calls: &Arc<AtomicUsize>,
    ) -> Box<WriteFile> {
        Box::new(WriteFile {
            path: dir.join(name),
            contents: name.to_string(),
            calls: calls.clone(),
        })
    }

    #[tokio::test]
    async fn test_resolve_writes_output() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let recipe = Recipe::new("out", true, vec![], write_file(dir.path(), "out.txt", &calls));

        let artifact = recipe.clone().resolve().await.unwrap();
        assert!(artifact.exists());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(recipe.is_done());
    }

    #[tokio::test]
    async fn test_resolve_skips_when_done() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let recipe = Recipe::new("out", true, vec![], write_file(dir.path(), "out.txt", &calls));

        recipe.clone().resolve().await.unwrap();
        recipe.clone().resolve().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(recipe.lifecycle().skipped);
    }

    #[tokio::test]
    async fn test_missing_output_is_not_done() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let recipe = Recipe::new("out", true, vec![], write_file(dir.path(), "out.txt", &calls));
        assert!(!recipe.is_done());
    }

    #[tokio::test]
    async fn test_staleness_output_newer_than_dependency() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));

        let dep = Recipe::new("dep", false, vec![], write_file(dir.path(), "dep.txt", &calls));
        let top = Recipe::new(
            "top",
            true,
            vec![dep.clone()],
            write_file(dir.path(), "top.txt", &calls),
        );

        // Write the dependency first, the output strictly after.
        std::fs::write(dir.path().join("dep.txt"), "dep").unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        std::fs::write(dir.path().join("top.txt"), "top").unwrap();

        assert!(top.is_done());

        // Resolving performs no work on either recipe.
        top.clone().resolve().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stale_output_is_rebuilt() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));

        let dep = Recipe::new("dep", false, vec![], write_file(dir.path(), "dep.txt", &calls));
        let top = Recipe::new(
            "top",
            true,
            vec![dep.clone()],
            write_file(dir.path(), "top.txt", &calls),
        );

        // Output exists but the dependency was touched after it.
        std::fs::write(dir.path().join("top.txt"), "old").unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        std::fs::write(dir.path().join("dep.txt"), "newer").unwrap();

        assert!(!top.is_done());
        top.clone().resolve().await.unwrap();
        // The dependency was fresh, so only the top recipe re-ran.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(top.is_done());
    }

    #[tokio::test]
    async fn test_diamond_runs_shared_recipe_once() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));

        let base = Recipe::new("base", false, vec![], write_file(dir.path(), "base.txt", &calls));
        let left = Recipe::new(
            "left",
            true,
            vec![base.clone()],
            write_file(dir.path(), "left.txt", &calls),
        );
        let right = Recipe::new(
            "right",
            true,
            vec![base.clone()],
            write_file(dir.path(), "right.txt", &calls),
        );

        let (l, r) = tokio::join!(left.resolve(), right.resolve());
        l.unwrap();
        r.unwrap();

        // base + left + right: exactly three invocations, base not doubled.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_post_condition_failure() {
        let dir = tempfile::tempdir().unwrap();
        let recipe = Recipe::new(
            "ghost",
            true,
            vec![],
            Box::new(NeverWrites {
                path: dir.path().join("ghost.txt"),
            }),
        );

        let err = recipe.resolve().await.unwrap_err();
        assert_eq!(
            err,
            BuildError::StaleOutput {
                recipe: "ghost".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_dependency_failure_aborts_dependent() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));

        let bad = Recipe::new(
            "bad",
            false,
            vec![],
            Box::new(NeverWrites {
                path: dir.path().join("bad.txt"),
            }),
        );
        let top = Recipe::new(
            "top",
            true,
            vec![bad],
            write_file(dir.path(), "top.txt", &calls),
        );

        assert!(top.resolve().await.is_err());
        // The dependent's own work never ran.
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_null_output_uses_explicit_completion() {
        let group = Recipe::new("all", true, vec![], Box::new(Group::new()));
        assert!(!group.is_done());
        group.clone().resolve().await.unwrap();
        assert!(group.is_done());
    }

    #[tokio::test]
    async fn test_clean_touches_only_own_output() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));

        let dep = Recipe::new("dep", false, vec![], write_file(dir.path(), "dep.txt", &calls));
        let top = Recipe::new(
            "top",
            true,
            vec![dep.clone()],
            write_file(dir.path(), "top.txt", &calls),
        );

        top.clone().resolve().await.unwrap();
        top.clean().await.unwrap();

        assert!(!dir.path().join("top.txt").exists());
        assert!(dir.path().join("dep.txt").exists());
    }

    #[tokio::test]
    async fn test_purge_removes_whole_subtree() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));

        let dep = Recipe::new("dep", false, vec![], write_file(dir.path(), "dep.txt", &calls));
        let top = Recipe::new(
            "top",
            true,
            vec![dep.clone()],
            write_file(dir.path(), "top.txt", &calls),
        );

        top.clone().resolve().await.unwrap();
        top.purge().await.unwrap();

        assert!(!dir.path().join("top.txt").exists());
        assert!(!dir.path().join("dep.txt").exists());
    }

    #[tokio::test]
    async fn test_purge_of_clean_subtree_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));

        let dep = Recipe::new("dep", false, vec![], write_file(dir.path(), "dep.txt", &calls));
        let top = Recipe::new(
            "top",
            true,
            vec![dep],
            write_file(dir.path(), "top.txt", &calls),
        );

        // Nothing was ever built; purge must not error or create anything.
        top.purge().await.unwrap();
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_func_work_produces_value() {
        let recipe = Recipe::new(
            "version",
            false,
            vec![],
            Box::new(Func::new(Artifact::value("1.2.3"), |_input| {
                Box::pin(async { Ok(()) })
            })),
        );

        let artifact = recipe.resolve().await.unwrap();
        assert_eq!(artifact.to_params(None), vec!["1.2.3"]);
    }

    #[test]
    fn test_direct_dependencies_sorted_by_name() {
        let b = Recipe::new("bravo", false, vec![], Box::new(Group::new()));
        let a = Recipe::new("alpha", false, vec![], Box::new(Group::new()));
        let top = Recipe::new("top", true, vec![b, a], Box::new(Group::new()));

        let names: Vec<String> = top
            .direct_dependencies()
            .iter()
            .map(|d| d.name().to_string())
            .collect();
        assert_eq!(names, vec!["alpha", "bravo"]);
    }

    #[test]
    fn test_transitive_dependencies_dedup() {
        let base = Recipe::new("base", false, vec![], Box::new(Group::new()));
        let left = Recipe::new("left", false, vec![base.clone()], Box::new(Group::new()));
        let right = Recipe::new("right", false, vec![base.clone()], Box::new(Group::new()));
        let top = Recipe::new("top", true, vec![left, right], Box::new(Group::new()));

        let names: Vec<String> = top
            .transitive_dependencies()
            .iter()
            .map(|d| d.name().to_string())
            .collect();
        assert_eq!(names, vec!["left", "base", "right"]);
    }
}
