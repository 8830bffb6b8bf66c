//! BUTTRESS Shell Execution
//!
//! Runs one external command as a recipe's work: a shared bounded limiter
//! caps simultaneous subshells, command templates interpolate shell-escaped
//! input/output/parameter tokens, and captured stdout/stderr lines are
//! multiplexed into an ordered, timestamped sink.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod limiter;
pub mod result;
pub mod sink;
pub mod template;
pub mod work;

// Re-exports
pub use limiter::ShellLimiter;
pub use result::ShellResult;
pub use sink::{OutputLine, OutputSink, StreamKind};
pub use template::render;
pub use work::{Shell, ShellBuilder, ShellWork};
