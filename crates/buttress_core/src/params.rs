//! Parameter and environment digestion for command interpolation.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// An environment value: a single token or a joinable list of tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnvValue {
    /// A single value, passed through as-is
    Single(String),
    /// Multiple values, joined into one shell-escaped string
    Many(Vec<String>),
}

/// An ordered environment/parameter map
pub type EnvMap = IndexMap<String, EnvValue>;

impl From<&str> for EnvValue {
    fn from(value: &str) -> Self {
        Self::Single(value.to_string())
    }
}

impl From<String> for EnvValue {
    fn from(value: String) -> Self {
        Self::Single(value)
    }
}

impl From<Vec<String>> for EnvValue {
    fn from(values: Vec<String>) -> Self {
        Self::Many(values)
    }
}

impl From<Vec<&str>> for EnvValue {
    fn from(values: Vec<&str>) -> Self {
        Self::Many(values.into_iter().map(String::from).collect())
    }
}

/// Digest an environment map into flat strings
///
/// List values join into shell-escaped, space-separated tokens; single
/// values pass through untouched. Ordering is preserved.
#[must_use]
pub fn digest_env(env: &EnvMap) -> IndexMap<String, String> {
    env.iter()
        .map(|(key, value)| {
            let flat = match value {
                EnvValue::Single(s) => s.clone(),
                EnvValue::Many(items) => shell_join(items),
            };
            (key.clone(), flat)
        })
        .collect()
}

/// Shell-escape one token for POSIX `sh`
///
/// Tokens made of safe characters pass through; anything else is wrapped in
/// single quotes, with embedded single quotes spliced out.
#[must_use]
pub fn shell_quote(token: &str) -> String {
    if token.is_empty() {
        return "''".to_string();
    }

    let safe = token.chars().all(|c| {
        c.is_ascii_alphanumeric() || matches!(c, '@' | '%' | '+' | '=' | ':' | ',' | '.' | '/' | '_' | '-')
    });
    if safe {
        token.to_string()
    } else {
        format!("'{}'", token.replace('\'', r#"'"'"'"#))
    }
}

/// Shell-escape and space-join tokens
#[must_use]
pub fn shell_join<I, S>(tokens: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tokens
        .into_iter()
        .map(|token| shell_quote(token.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Express `path` relative to `pivot` when possible
///
/// Paths outside the pivot are returned unchanged. Cosmetic only; callers
/// must not rely on this for process execution.
#[must_use]
pub fn relative_to(pivot: &Path, path: &Path) -> PathBuf {
    path.strip_prefix(pivot)
        .map_or_else(|_| path.to_path_buf(), Path::to_path_buf)
}
