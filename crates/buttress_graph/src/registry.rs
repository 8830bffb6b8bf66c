//! The registration table: names to recipe factories.
//!
//! Graph discovery is an explicit table built at startup, mapping each
//! name to a factory plus its declared dependency names, resolved by
//! memoized topological evaluation. Each name evaluates at most once per
//! compilation, so a diamond dependency converges on a single shared
//! recipe node.

use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};

use buttress_core::{Artifact, BuildError, BuildResult};

use crate::recipe::{Recipe, Work};

/// What a registered name provides: a recipe, or a plain value
#[derive(Debug, Clone)]
pub enum Provision {
    /// A buildable recipe
    Recipe(Arc<Recipe>),
    /// A plain artifact (e.g. a discovered file list)
    Artifact(Artifact),
}

impl Provision {
    /// The provision viewed as an artifact: a recipe contributes its output
    #[must_use]
    pub fn artifact(&self) -> Artifact {
        match self {
            Self::Recipe(recipe) => recipe.output(),
            Self::Artifact(artifact) => artifact.clone(),
        }
    }
}

/// The compiled provisions of a factory's declared dependencies
#[derive(Debug, Default)]
pub struct ProvisionSet {
    entries: IndexMap<String, Provision>,
}

impl ProvisionSet {
    /// Create an empty set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a provision under a name
    pub fn insert(&mut self, name: impl Into<String>, provision: Provision) {
        self.entries.insert(name.into(), provision);
    }

    /// Look up a provision by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Provision> {
        self.entries.get(name)
    }

    /// The named dependency as an artifact
    ///
    /// # Errors
    ///
    /// Returns an error when the name was not declared as a dependency.
    pub fn artifact(&self, name: &str) -> BuildResult<Artifact> {
        self.get(name)
            .map(Provision::artifact)
            .ok_or_else(|| BuildError::Misconfigured {
                reason: format!("'{name}' is not a declared dependency"),
            })
    }

    /// The named dependency as a recipe
    ///
    /// # Errors
    ///
    /// Returns an error when the name was not declared, or provides a plain
    /// value instead of a recipe.
    pub fn recipe(&self, name: &str) -> BuildResult<Arc<Recipe>> {
        match self.get(name) {
            Some(Provision::Recipe(recipe)) => Ok(Arc::clone(recipe)),
            Some(Provision::Artifact(_)) => Err(BuildError::NotARecipe {
                name: name.to_string(),
            }),
            None => Err(BuildError::Misconfigured {
                reason: format!("'{name}' is not a declared dependency"),
            }),
        }
    }

    /// All recipe provisions, in declaration order
    #[must_use]
    pub fn recipes(&self) -> Vec<Arc<Recipe>> {
        self.entries
            .values()
            .filter_map(|provision| match provision {
                Provision::Recipe(recipe) => Some(Arc::clone(recipe)),
                Provision::Artifact(_) => None,
            })
            .collect()
    }
}

/// What a factory yields: work to wrap in a recipe, or a plain artifact
pub enum Blueprint {
    /// Work to wrap into a recipe node whose direct dependencies are the
    /// declared dependencies that compiled to recipes
    Work(Box<dyn Work>),
    /// A plain artifact provision
    Artifact(Artifact),
}

impl Blueprint {
    /// Wrap a work implementation
    #[must_use]
    pub fn work(work: impl Work + 'static) -> Self {
        Self::Work(Box::new(work))
    }
}

type Factory = Box<dyn Fn(&ProvisionSet) -> BuildResult<Blueprint> + Send + Sync>;

struct Entry {
    deps: Vec<String>,
    target: bool,
    factory: Factory,
}

/// Registration table mapping names to recipe factories
#[derive(Default)]
pub struct Registry {
    entries: IndexMap<String, Entry>,
    default: Option<String>,
}

impl Registry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a target: a recipe selectable from the build surface
    pub fn target<F>(&mut self, name: impl Into<String>, deps: &[&str], factory: F) -> &mut Self
    where
        F: Fn(&ProvisionSet) -> BuildResult<Blueprint> + Send + Sync + 'static,
    {
        self.register(name.into(), deps, true, factory);
        self
    }

    /// Register a provider: a recipe or value reachable only as a dependency
    pub fn provide<F>(&mut self, name: impl Into<String>, deps: &[&str], factory: F) -> &mut Self
    where
        F: Fn(&ProvisionSet) -> BuildResult<Blueprint> + Send + Sync + 'static,
    {
        self.register(name.into(), deps, false, factory);
        self
    }

    /// Mark a registered name as the default target
    pub fn set_default(&mut self, name: impl Into<String>) -> &mut Self {
        self.default = Some(name.into());
        self
    }

    fn register<F>(&mut self, name: String, deps: &[&str], target: bool, factory: F)
    where
        F: Fn(&ProvisionSet) -> BuildResult<Blueprint> + Send + Sync + 'static,
    {
        self.entries.insert(
            name,
            Entry {
                deps: deps.iter().map(ToString::to_string).collect(),
                target,
                factory: Box::new(factory),
            },
        );
    }

    /// Whether a name is registered
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Names registered as targets, in registration order
    #[must_use]
    pub fn target_names(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.target)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// The default target name, if one was set
    #[must_use]
    pub fn default_target_name(&self) -> Option<&str> {
        self.default.as_deref()
    }

    /// Compile the requested names into provisions
    ///
    /// All names share one memoization table, so recipes reached through
    /// several paths compile to the same shared node.
    ///
    /// # Errors
    ///
    /// Returns an error on unknown names, dependency cycles, or a failing
    /// factory.
    pub fn compile(&self, names: &[String]) -> BuildResult<IndexMap<String, Provision>> {
        let mut cache: IndexMap<String, Provision> = IndexMap::new();
        let mut visiting: IndexSet<String> = IndexSet::new();

        for name in names {
            self.compile_one(name, &mut cache, &mut visiting)?;
        }

        Ok(names
            .iter()
            .map(|name| (name.clone(), cache[name.as_str()].clone()))
            .collect())
    }

    fn compile_one(
        &self,
        name: &str,
        cache: &mut IndexMap<String, Provision>,
        visiting: &mut IndexSet<String>,
    ) -> BuildResult<Provision> {
        if let Some(provision) = cache.get(name) {
            return Ok(provision.clone());
        }
        if !visiting.insert(name.to_string()) {
            return Err(BuildError::CycleDetected {
                name: name.to_string(),
            });
        }

        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| BuildError::UnknownTarget {
                name: name.to_string(),
            })?;

        let mut provisions = ProvisionSet::new();
        for dep in &entry.deps {
            let provision = self.compile_one(dep, cache, visiting)?;
            provisions.insert(dep.clone(), provision);
        }

        let provision = match (entry.factory)(&provisions)? {
            Blueprint::Work(work) => {
                Provision::Recipe(Recipe::new(name, entry.target, provisions.recipes(), work))
            }
            Blueprint::Artifact(artifact) => Provision::Artifact(artifact),
        };

        visiting.shift_remove(name);
        cache.insert(name.to_string(), provision.clone());
        Ok(provision)
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("names", &self.entries.keys().collect::<Vec<_>>())
            .field("default", &self.default)
            .finish()
    }
}
