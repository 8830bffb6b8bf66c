//! Error aggregation across parallel fan-outs.
//!
//! A fan-out must not lose sibling failures to a first-exception-wins race:
//! every branch runs to completion, and all failures are reported together.

use std::future::Future;

use buttress_core::{BuildError, BuildResult};
use futures::future::join_all;
use tracing::debug;

/// Run branches concurrently, preserving every failure
///
/// One task is spawned per branch and all are joined before returning. If
/// every branch succeeds, their results come back in branch order. If any
/// fail, the failures are collected in branch order into a single aggregate
/// error (a lone failure passes through undecorated). A panicked branch
/// surfaces as an internal error rather than disappearing.
pub async fn join_all_aggregated<F, T>(branches: impl IntoIterator<Item = F>) -> BuildResult<Vec<T>>
where
    F: Future<Output = BuildResult<T>> + Send + 'static,
    T: Send + 'static,
{
    let handles: Vec<_> = branches.into_iter().map(tokio::spawn).collect();
    let joined = join_all(handles).await;

    let mut results = Vec::with_capacity(joined.len());
    let mut errors = Vec::new();

    for outcome in joined {
        match outcome {
            Ok(Ok(value)) => results.push(value),
            Ok(Err(err)) => errors.push(err),
            Err(join_err) => errors.push(BuildError::Internal {
                message: format!("fan-out branch panicked: {join_err}"),
            }),
        }
    }

    if errors.is_empty() {
        Ok(results)
    } else {
        debug!(failed = errors.len(), "fan-out completed with failures");
        Err(BuildError::aggregate(errors))
    }
}
