//! Artifact age.
//!
//! Freshness is measured as time elapsed since last modification. Artifacts
//! that do not exist (or that have no meaningful modification time) carry an
//! infinite age, which compares greater than every finite age.

use std::fmt;
use std::time::{Duration, SystemTime};

/// Elapsed time since an artifact was last produced
///
/// `Finite` ages order by duration; `Infinite` is greater than all of them,
/// so a missing input can never make an existing output look stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Age {
    /// Time since last modification
    Finite(Duration),
    /// Absent or ageless
    Infinite,
}

impl Age {
    /// Age of something modified at `when`, measured against the current
    /// wall clock. Timestamps in the future clamp to zero.
    #[must_use]
    pub fn since(when: SystemTime) -> Self {
        Self::Finite(
            SystemTime::now()
                .duration_since(when)
                .unwrap_or(Duration::ZERO),
        )
    }

    /// A zero age (freshly produced)
    #[must_use]
    pub const fn zero() -> Self {
        Self::Finite(Duration::ZERO)
    }

    /// True for the infinite age
    #[must_use]
    pub const fn is_infinite(&self) -> bool {
        matches!(self, Self::Infinite)
    }

    /// The underlying duration, if finite
    #[must_use]
    pub const fn as_duration(&self) -> Option<Duration> {
        match self {
            Self::Finite(d) => Some(*d),
            Self::Infinite => None,
        }
    }
}

impl Default for Age {
    fn default() -> Self {
        Self::Infinite
    }
}

impl fmt::Display for Age {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Finite(d) => write!(f, "{:.3}s", d.as_secs_f64()),
            Self::Infinite => write!(f, "inf"),
        }
    }
}

impl From<Duration> for Age {
    fn from(d: Duration) -> Self {
        Self::Finite(d)
    }
}
