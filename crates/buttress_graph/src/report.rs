//! Build history reports.
//!
//! One invocation's recipe lifecycles, serialized to JSON for tooling.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use uuid::Uuid;

use buttress_core::{BuildError, BuildResult};

use crate::recipe::Recipe;

/// Lifecycle summary of one recipe in one invocation
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    /// Recipe name
    pub name: String,
    /// When resolution started, if it did
    pub started: Option<DateTime<Utc>>,
    /// When resolution finished, if it did
    pub finished: Option<DateTime<Utc>>,
    /// Whether the recipe was skipped as already done
    pub skipped: bool,
    /// Whether the recipe ended in a completed state
    pub succeeded: bool,
}

impl JobReport {
    fn from_recipe(recipe: &Recipe) -> Self {
        let lifecycle = recipe.lifecycle();
        Self {
            name: recipe.name().to_string(),
            started: lifecycle.started,
            finished: lifecycle.finished,
            skipped: lifecycle.skipped,
            succeeded: lifecycle.skipped || lifecycle.finished.is_some(),
        }
    }
}

/// Build history for one invocation
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    /// Unique report id
    pub id: Uuid,
    /// Invocation name (typically the requested targets)
    pub name: String,
    /// User that ran the build, when known
    pub user: Option<String>,
    /// Earliest job start
    pub started: Option<DateTime<Utc>>,
    /// Latest job finish
    pub finished: Option<DateTime<Utc>>,
    /// Per-recipe summaries, sorted by start time
    pub jobs: Vec<JobReport>,
}

impl BuildReport {
    /// Assemble a report over the given targets and their dependencies
    #[must_use]
    pub fn new(name: impl Into<String>, targets: &[(String, Arc<Recipe>)]) -> Self {
        let mut recipes: IndexMap<String, Arc<Recipe>> = IndexMap::new();
        for (_, recipe) in targets {
            recipes.insert(recipe.name().to_string(), Arc::clone(recipe));
            for dep in recipe.transitive_dependencies() {
                recipes.insert(dep.name().to_string(), dep);
            }
        }

        let mut jobs: Vec<JobReport> = recipes
            .values()
            .map(|recipe| JobReport::from_recipe(recipe))
            .collect();
        jobs.sort_by_key(|job| job.started);

        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            user: std::env::var("USER").ok(),
            started: jobs.iter().filter_map(|job| job.started).min(),
            finished: jobs.iter().filter_map(|job| job.finished).max(),
            jobs,
        }
    }

    /// Serialize to a JSON value
    ///
    /// # Errors
    ///
    /// Returns an internal error if serialization fails.
    pub fn to_json(&self) -> BuildResult<serde_json::Value> {
        serde_json::to_value(self).map_err(|err| BuildError::Internal {
            message: format!("report serialization failed: {err}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::work::Group;

    #[tokio::test]
    async fn test_report_covers_dependencies() {
        let dep = Recipe::new("dep", false, vec![], Box::new(Group::new()));
        let top = Recipe::new("top", true, vec![dep], Box::new(Group::new()));
        top.clone().resolve().await.unwrap();

        let report = BuildReport::new("top", &[("top".to_string(), top)]);
        assert_eq!(report.jobs.len(), 2);
        assert!(report.jobs.iter().all(|job| job.succeeded));
        assert!(report.started.is_some());
        assert!(report.finished.is_some());
    }

    #[tokio::test]
    async fn test_report_json_shape() {
        let top = Recipe::new("solo", true, vec![], Box::new(Group::new()));
        top.clone().resolve().await.unwrap();

        let report = BuildReport::new("solo", &[("solo".to_string(), top)]);
        let json = report.to_json().unwrap();

        assert_eq!(json["name"], "solo");
        assert!(json["id"].is_string());
        assert_eq!(json["jobs"].as_array().unwrap().len(), 1);
        assert_eq!(json["jobs"][0]["name"], "solo");
        assert_eq!(json["jobs"][0]["succeeded"], true);
    }

    #[test]
    fn test_unresolved_recipe_reports_unsucceeded() {
        let top = Recipe::new("never", true, vec![], Box::new(Group::new()));
        let report = BuildReport::new("never", &[("never".to_string(), top)]);
        assert!(!report.jobs[0].succeeded);
        assert!(report.started.is_none());
    }
}
