//! BUTTRESS Core Types
//!
//! The artifact model, the build error taxonomy, and parameter digestion
//! shared by the graph and shell crates. Artifacts derive their state
//! (existence, age) from the world at query time and cache nothing.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod age;
pub mod artifact;
pub mod error;
pub mod params;

// Re-exports
pub use age::Age;
pub use artifact::Artifact;
pub use error::{BuildError, BuildResult};
pub use params::{EnvMap, EnvValue, digest_env, relative_to, shell_join, shell_quote};
