//! Artifacts: what recipes produce.
//!
//! An artifact is the represented output (or absence thereof) of a recipe:
//! a file on disk, an in-memory value, nothing, or an ordered aggregate of
//! these. Existence and age are read from the world at query time; an
//! artifact holds no cached state of its own.

use std::collections::VecDeque;
use std::fmt;
use std::path::{Path, PathBuf};

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::age::Age;
use crate::error::{BuildError, BuildResult};
use crate::params::relative_to;

/// The output (or absence thereof) of a recipe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Artifact {
    /// Nothing; never exists
    Null,
    /// An in-memory computed result; always exists, never goes stale
    Value(serde_json::Value),
    /// A file or directory on disk
    File(PathBuf),
    /// An ordered, de-duplicated collection of leaf artifacts
    ///
    /// Construct through [`Artifact::poly`], which flattens and de-duplicates;
    /// the variant itself places no constraint on its contents.
    Poly(Vec<Artifact>),
}

impl Artifact {
    /// Wrap an in-memory value
    #[must_use]
    pub fn value(value: impl Into<serde_json::Value>) -> Self {
        Self::Value(value.into())
    }

    /// Wrap a filesystem path
    #[must_use]
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }

    /// Build a Poly artifact from the given members
    ///
    /// Nested Poly members contribute their own leaves, not themselves; Null
    /// members are dropped; duplicate leaves collapse to the first-seen
    /// occurrence, by content equality. The flattening is worklist-based,
    /// preserving left-to-right order.
    #[must_use]
    pub fn poly(members: impl IntoIterator<Item = Artifact>) -> Self {
        let mut stack: VecDeque<Artifact> = members.into_iter().collect();
        let mut leaves: Vec<Artifact> = Vec::new();

        while let Some(member) = stack.pop_front() {
            match member {
                Self::Poly(children) => {
                    for child in children.into_iter().rev() {
                        stack.push_front(child);
                    }
                }
                Self::Null => {}
                leaf => {
                    if !leaves.contains(&leaf) {
                        leaves.push(leaf);
                    }
                }
            }
        }

        Self::Poly(leaves)
    }

    /// Whether the represented output currently exists
    #[must_use]
    pub fn exists(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Value(_) => true,
            Self::File(path) => path.exists(),
            Self::Poly(members) => members.iter().all(Self::exists),
        }
    }

    /// Time since the represented output was last produced
    ///
    /// Files age from their modification time; values and nothing are
    /// ageless; an aggregate is as old as its freshest (youngest) member,
    /// or infinitely old when empty.
    #[must_use]
    pub fn age(&self) -> Age {
        match self {
            Self::Null | Self::Value(_) => Age::Infinite,
            Self::File(path) => path
                .metadata()
                .and_then(|meta| meta.modified())
                .map_or(Age::Infinite, Age::since),
            Self::Poly(members) => members
                .iter()
                .map(Self::age)
                .min()
                .unwrap_or(Age::Infinite),
        }
    }

    /// True when this artifact represents nothing real
    #[must_use]
    pub fn is_null(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Poly(members) => members.iter().all(Self::is_null),
            _ => false,
        }
    }

    /// The leaf artifacts, in order
    ///
    /// A leaf yields itself; an aggregate yields its transitive leaves.
    #[must_use]
    pub fn leaves(&self) -> Vec<&Artifact> {
        let mut stack: VecDeque<&Artifact> = VecDeque::from([self]);
        let mut result = Vec::new();

        while let Some(artifact) = stack.pop_front() {
            match artifact {
                Self::Poly(members) => {
                    for member in members.iter().rev() {
                        stack.push_front(member);
                    }
                }
                Self::Null => {}
                leaf => result.push(leaf),
            }
        }

        result
    }

    /// The underlying value as JSON
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Value(value) => value.clone(),
            Self::File(path) => serde_json::Value::String(path.display().to_string()),
            Self::Poly(members) => {
                serde_json::Value::Array(members.iter().map(Self::to_json).collect())
            }
        }
    }

    /// Flatten into string tokens for command interpolation
    ///
    /// File paths are expressed relative to `cwd` when given, purely for
    /// legibility of the rendered command line.
    #[must_use]
    pub fn to_params(&self, cwd: Option<&Path>) -> Vec<String> {
        match self {
            Self::Null => Vec::new(),
            Self::Value(value) => value_tokens(value),
            Self::File(path) => {
                let shown = match cwd {
                    Some(pivot) => relative_to(pivot, path),
                    None => path.clone(),
                };
                vec![shown.display().to_string()]
            }
            Self::Poly(members) => members
                .iter()
                .flat_map(|member| member.to_params(cwd))
                .collect(),
        }
    }

    /// Reverse the state this artifact represents
    ///
    /// Deletes files (directories recursively); a no-op for values, for
    /// nothing, and for paths that do not exist. Aggregate members clean
    /// concurrently and failures are aggregated.
    pub async fn clean(&self) -> BuildResult<()> {
        match self {
            Self::Null | Self::Value(_) => Ok(()),
            Self::File(path) => clean_path(path).await,
            Self::Poly(_) => {
                // Leaves are never aggregates themselves; only files need
                // reversing.
                let results = join_all(self.leaves().into_iter().filter_map(|leaf| {
                    match leaf {
                        Self::File(path) => Some(clean_path(path)),
                        _ => None,
                    }
                }))
                .await;
                let errors: Vec<BuildError> =
                    results.into_iter().filter_map(Result::err).collect();
                if errors.is_empty() {
                    Ok(())
                } else {
                    Err(BuildError::aggregate(errors))
                }
            }
        }
    }
}

impl Default for Artifact {
    fn default() -> Self {
        Self::Null
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "(nothing)"),
            Self::Value(value) => write!(f, "{}", value),
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Poly(members) => {
                let rendered: Vec<String> =
                    members.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", rendered.join(", "))
            }
        }
    }
}

impl From<PathBuf> for Artifact {
    fn from(path: PathBuf) -> Self {
        Self::File(path)
    }
}

impl From<&Path> for Artifact {
    fn from(path: &Path) -> Self {
        Self::File(path.to_path_buf())
    }
}

/// Flatten a JSON value into interpolatable string tokens
fn value_tokens(value: &serde_json::Value) -> Vec<String> {
    match value {
        serde_json::Value::Null => Vec::new(),
        serde_json::Value::String(s) => vec![s.clone()],
        serde_json::Value::Array(items) => items.iter().flat_map(value_tokens).collect(),
        other => vec![other.to_string()],
    }
}

/// Delete a file, or a directory recursively; missing paths are a no-op
async fn clean_path(path: &Path) -> BuildResult<()> {
    let meta = match tokio::fs::symlink_metadata(path).await {
        Ok(meta) => meta,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "clean: nothing to delete");
            return Ok(());
        }
        Err(err) => return Err(BuildError::io(path, &err)),
    };

    info!(path = %path.display(), "delete");
    let removed = if meta.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    };

    match removed {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(BuildError::io(path, &err)),
    }
}
