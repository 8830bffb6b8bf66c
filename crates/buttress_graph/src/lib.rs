//! BUTTRESS Recipe Graph
//!
//! Recipes with declared dependencies, an explicit registration table that
//! compiles names into a shared-node DAG, and the concurrent resolution
//! engine with staleness checks, clean/purge semantics, and error
//! aggregation across parallel branches.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod aggregate;
pub mod engine;
pub mod recipe;
pub mod registry;
pub mod report;
pub mod tree;
pub mod work;

// Re-exports
pub use aggregate::join_all_aggregated;
pub use engine::{BuildEngine, Goal};
pub use recipe::{Lifecycle, Recipe, Work};
pub use registry::{Blueprint, Provision, ProvisionSet, Registry};
pub use report::{BuildReport, JobReport};
pub use tree::TreeEntry;
