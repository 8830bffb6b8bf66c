//! The build engine: from requested target names to resolved artifacts.

use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use indexmap::IndexMap;
use tracing::debug;

use buttress_core::{Artifact, BuildError, BuildResult};

use crate::aggregate::join_all_aggregated;
use crate::recipe::Recipe;
use crate::registry::{Provision, Registry};
use crate::report::BuildReport;
use crate::tree::TreeEntry;

/// What a build invocation is asked to do
///
/// Threaded explicitly through the engine call chain; never stored as
/// process-wide state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Goal {
    /// Bring the requested targets up to date
    #[default]
    Build,
    /// Delete the requested targets' outputs
    Clean,
    /// Delete the requested targets' outputs and those of all their
    /// transitive dependencies
    Purge,
}

/// Drives requested targets to completion or failure
#[derive(Debug, Default)]
pub struct BuildEngine {
    registry: Registry,
}

impl BuildEngine {
    /// Create an engine over a registration table
    #[must_use]
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }

    /// The registration table
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Mutable access to the registration table
    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    /// Names selectable from the build surface, in registration order
    #[must_use]
    pub fn target_names(&self) -> Vec<&str> {
        self.registry.target_names()
    }

    /// The default target name, if any
    #[must_use]
    pub fn default_target_name(&self) -> Option<&str> {
        self.registry.default_target_name()
    }

    /// Compile requested names into concrete recipes
    ///
    /// An empty request falls back to the default target. Names must be
    /// registered, must provide recipes (not plain values), and must be
    /// marked as targets.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::NoDefaultTarget`], [`BuildError::UnknownTarget`],
    /// [`BuildError::NotARecipe`], [`BuildError::NotATarget`], or
    /// [`BuildError::CycleDetected`].
    pub fn compile_targets(&self, names: &[String]) -> BuildResult<Vec<(String, Arc<Recipe>)>> {
        let requested: Vec<String> = if names.is_empty() {
            match self.registry.default_target_name() {
                Some(default) => vec![default.to_string()],
                None => return Err(BuildError::NoDefaultTarget),
            }
        } else {
            names.to_vec()
        };

        debug!(targets = ?requested, "compiling targets");
        let compiled = self.registry.compile(&requested)?;

        let mut recipes = Vec::with_capacity(compiled.len());
        for (name, provision) in compiled {
            match provision {
                Provision::Recipe(recipe) => {
                    if !recipe.is_target() {
                        return Err(BuildError::NotATarget { name });
                    }
                    recipes.push((name, recipe));
                }
                Provision::Artifact(_) => return Err(BuildError::NotARecipe { name }),
            }
        }

        Ok(recipes)
    }

    /// Drive the compiled recipes to completion under the given goal
    ///
    /// Targets run as a concurrency fan-out; sibling failures are aggregated
    /// rather than racing. On success, returns target name → resolved
    /// artifact, in request order.
    ///
    /// # Errors
    ///
    /// Returns the (possibly aggregated) failure of any target branch.
    pub async fn resolve(
        &self,
        recipes: &[(String, Arc<Recipe>)],
        goal: Goal,
    ) -> BuildResult<IndexMap<String, Artifact>> {
        let branches: Vec<BoxFuture<'static, BuildResult<Artifact>>> = recipes
            .iter()
            .map(|(_, recipe)| {
                let recipe = Arc::clone(recipe);
                match goal {
                    Goal::Build => async move { recipe.resolve().await }.boxed(),
                    Goal::Clean => {
                        async move { recipe.clean().await.map(|()| recipe.output()) }.boxed()
                    }
                    Goal::Purge => {
                        async move { recipe.clone().purge().await.map(|()| recipe.output()) }.boxed()
                    }
                }
            })
            .collect();

        let artifacts = join_all_aggregated(branches).await?;

        Ok(recipes
            .iter()
            .map(|(name, _)| name.clone())
            .zip(artifacts)
            .collect())
    }

    /// The dependency tree of one target, for display
    ///
    /// # Errors
    ///
    /// Returns an error when the name is unknown or provides a plain value.
    pub fn tree(&self, name: &str) -> BuildResult<TreeEntry> {
        let compiled = self.registry.compile(&[name.to_string()])?;
        match &compiled[name] {
            Provision::Recipe(recipe) => {
                let cwd = std::env::current_dir().ok();
                Ok(TreeEntry::from_recipe(recipe, cwd.as_deref()))
            }
            Provision::Artifact(_) => Err(BuildError::NotARecipe {
                name: name.to_string(),
            }),
        }
    }

    /// Assemble the build history report for one invocation's recipes
    #[must_use]
    pub fn report(&self, name: &str, recipes: &[(String, Arc<Recipe>)]) -> BuildReport {
        BuildReport::new(name, recipes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Blueprint;
    use crate::work::{Func, Group};
    use std::path::Path;

    fn write_target(registry: &mut Registry, name: &'static str, deps: &'static [&'static str], dir: &Path) {
        let path = dir.join(format!("{name}.txt"));
        registry.target(name, deps, move |_| {
            let path = path.clone();
            Ok(Blueprint::work(Func::new(
                Artifact::file(&path),
                move |_input| {
                    let path = path.clone();
                    Box::pin(async move {
                        tokio::fs::write(&path, "x")
                            .await
                            .map_err(|e| BuildError::io(&path, &e))
                    })
                },
            )))
        });
    }

    #[tokio::test]
    async fn test_build_goal_resolves_targets() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = Registry::new();
        write_target(&mut registry, "alpha", &[], dir.path());
        write_target(&mut registry, "beta", &[], dir.path());
        let engine = BuildEngine::new(registry);

        let recipes = engine
            .compile_targets(&["alpha".to_string(), "beta".to_string()])
            .unwrap();
        let results = engine.resolve(&recipes, Goal::Build).await.unwrap();

        assert_eq!(results.len(), 2);
        assert!(results["alpha"].exists());
        assert!(dir.path().join("beta.txt").exists());
    }

    #[tokio::test]
    async fn test_clean_goal_removes_only_target_output() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = Registry::new();
        write_target(&mut registry, "dep", &[], dir.path());
        write_target(&mut registry, "top", &["dep"], dir.path());
        let engine = BuildEngine::new(registry);

        let recipes = engine.compile_targets(&["top".to_string()]).unwrap();
        engine.resolve(&recipes, Goal::Build).await.unwrap();
        engine.resolve(&recipes, Goal::Clean).await.unwrap();

        assert!(!dir.path().join("top.txt").exists());
        assert!(dir.path().join("dep.txt").exists());
    }

    #[tokio::test]
    async fn test_purge_goal_removes_subtree() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = Registry::new();
        write_target(&mut registry, "dep", &[], dir.path());
        write_target(&mut registry, "top", &["dep"], dir.path());
        let engine = BuildEngine::new(registry);

        let recipes = engine.compile_targets(&["top".to_string()]).unwrap();
        engine.resolve(&recipes, Goal::Build).await.unwrap();
        engine.resolve(&recipes, Goal::Purge).await.unwrap();

        assert!(!dir.path().join("top.txt").exists());
        assert!(!dir.path().join("dep.txt").exists());
    }

    #[tokio::test]
    async fn test_default_target_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = Registry::new();
        write_target(&mut registry, "all", &[], dir.path());
        registry.set_default("all");
        let engine = BuildEngine::new(registry);

        let recipes = engine.compile_targets(&[]).unwrap();
        assert_eq!(recipes.len(), 1);
        assert_eq!(recipes[0].0, "all");
    }

    #[test]
    fn test_no_default_errors() {
        let engine = BuildEngine::new(Registry::new());
        assert_eq!(
            engine.compile_targets(&[]).unwrap_err(),
            BuildError::NoDefaultTarget
        );
    }

    #[test]
    fn test_unknown_target_errors() {
        let engine = BuildEngine::new(Registry::new());
        let err = engine
            .compile_targets(&["ghost".to_string()])
            .unwrap_err();
        assert_eq!(
            err,
            BuildError::UnknownTarget {
                name: "ghost".to_string()
            }
        );
    }

    #[test]
    fn test_non_target_recipe_rejected() {
        let mut registry = Registry::new();
        registry.provide("helper", &[], |_| Ok(Blueprint::work(Group::new())));
        let engine = BuildEngine::new(registry);

        let err = engine
            .compile_targets(&["helper".to_string()])
            .unwrap_err();
        assert_eq!(
            err,
            BuildError::NotATarget {
                name: "helper".to_string()
            }
        );
    }

    #[test]
    fn test_value_provision_rejected_as_target() {
        let mut registry = Registry::new();
        registry.target("value", &[], |_| {
            Ok(Blueprint::Artifact(Artifact::value(1)))
        });
        let engine = BuildEngine::new(registry);

        let err = engine
            .compile_targets(&["value".to_string()])
            .unwrap_err();
        assert_eq!(
            err,
            BuildError::NotARecipe {
                name: "value".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_sibling_target_failures_aggregate() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = Registry::new();
        write_target(&mut registry, "good", &[], dir.path());
        registry.target("bad_one", &[], |_| {
            Ok(Blueprint::work(Func::new(Artifact::Null, |_| {
                Box::pin(async {
                    Err(BuildError::Misconfigured {
                        reason: "one".to_string(),
                    })
                })
            })))
        });
        registry.target("bad_two", &[], |_| {
            Ok(Blueprint::work(Func::new(Artifact::Null, |_| {
                Box::pin(async {
                    Err(BuildError::Misconfigured {
                        reason: "two".to_string(),
                    })
                })
            })))
        });
        let engine = BuildEngine::new(registry);

        let recipes = engine
            .compile_targets(&[
                "bad_one".to_string(),
                "good".to_string(),
                "bad_two".to_string(),
            ])
            .unwrap();
        let err = engine.resolve(&recipes, Goal::Build).await.unwrap_err();

        let flattened = err.flatten();
        assert_eq!(flattened.len(), 2);
        // The good target still completed.
        assert!(dir.path().join("good.txt").exists());
    }

    #[test]
    fn test_tree_of_value_provision_rejected() {
        let mut registry = Registry::new();
        registry.provide("value", &[], |_| {
            Ok(Blueprint::Artifact(Artifact::value(1)))
        });
        let engine = BuildEngine::new(registry);

        assert!(matches!(
            engine.tree("value").unwrap_err(),
            BuildError::NotARecipe { .. }
        ));
    }
}
