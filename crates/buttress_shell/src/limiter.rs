//! Bounded concurrency for subshells.
//!
//! However wide the dependency fan-out, at most this many subprocesses run
//! at once. The limiter is passed to shell works explicitly (typically by
//! sharing one `Shell` factory) rather than living in process-global state.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use buttress_core::{BuildError, BuildResult};

/// Caps the number of simultaneously running subshells
#[derive(Debug, Clone)]
pub struct ShellLimiter {
    semaphore: Arc<Semaphore>,
    max: usize,
}

impl ShellLimiter {
    /// Create a limiter admitting at most `max` concurrent subshells
    ///
    /// A `max` of zero is clamped to one.
    #[must_use]
    pub fn new(max: usize) -> Self {
        let max = max.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max)),
            max,
        }
    }

    /// The host's available parallelism, falling back to one
    #[must_use]
    pub fn default_parallelism() -> usize {
        std::thread::available_parallelism()
            .map(std::num::NonZero::get)
            .unwrap_or(1)
    }

    /// The configured maximum
    #[must_use]
    pub fn max(&self) -> usize {
        self.max
    }

    /// Currently available slots
    #[must_use]
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Acquire a slot, waiting until one frees up
    ///
    /// The permit releases its slot when dropped, on every exit path.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the semaphore was closed, which the
    /// limiter itself never does.
    pub async fn acquire(&self) -> BuildResult<OwnedSemaphorePermit> {
        Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|err| BuildError::Internal {
                message: format!("shell limiter closed: {err}"),
            })
    }
}

impl Default for ShellLimiter {
    fn default() -> Self {
        Self::new(Self::default_parallelism())
    }
}
