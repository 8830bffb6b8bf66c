//! Command-line options for build binaries.

use clap::Parser;

use buttress_graph::Goal;
use buttress_shell::ShellLimiter;

/// Build parameters
///
/// The surface a `bake`-style build binary exposes: target selection, the
/// clean/purge modes, verbosity, and the subshell limit.
#[derive(Debug, Clone, Parser)]
#[command(name = "bake", about = "Perform a build operation based on registered targets")]
pub struct BakeOptions {
    /// Targets to operate on; the default target when empty
    pub targets: Vec<String>,

    /// Clean the outputs of the given (or default) targets
    #[arg(short = 'c', long)]
    pub clean: bool,

    /// Clean the targets' outputs and those of all their dependencies
    #[arg(short = 'x', long)]
    pub purge: bool,

    /// Print extra information at run time
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Print nothing during builds unless something goes wrong
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Print a tree illustrating the targets' dependencies
    #[arg(long)]
    pub tree: bool,

    /// List available build targets
    #[arg(short = 'l', long)]
    pub list: bool,

    /// Print diagnostic info, including error detail
    #[arg(short = 'D', long)]
    pub debug: bool,

    /// Maximum number of simultaneously running subshells
    /// (default: the number of CPU cores)
    #[arg(short = 'm', long = "max")]
    pub max_shells: Option<usize>,
}

impl BakeOptions {
    /// The goal implied by the mode flags; purge wins over clean
    #[must_use]
    pub fn goal(&self) -> Goal {
        if self.purge {
            Goal::Purge
        } else if self.clean {
            Goal::Clean
        } else {
            Goal::Build
        }
    }

    /// Whether diagnostic output is enabled, by flag or by the
    /// `BUTTRESS_DEBUG` environment variable
    #[must_use]
    pub fn debug_enabled(&self) -> bool {
        self.debug || std::env::var_os("BUTTRESS_DEBUG").is_some()
    }

    /// A limiter honoring `--max`, sized to the host otherwise
    #[must_use]
    pub fn limiter(&self) -> ShellLimiter {
        match self.max_shells {
            Some(max) => ShellLimiter::new(max),
            None => ShellLimiter::default(),
        }
    }
}

impl Default for BakeOptions {
    fn default() -> Self {
        Self::parse_from(["bake"])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_targets_and_flags() {
        let options =
            BakeOptions::parse_from(["bake", "-c", "-v", "tests", "demos"]);
        assert_eq!(options.targets, vec!["tests", "demos"]);
        assert!(options.clean);
        assert!(options.verbose);
        assert!(!options.purge);
        assert_eq!(options.goal(), Goal::Clean);
    }

    #[test]
    fn test_purge_wins_over_clean() {
        let options = BakeOptions::parse_from(["bake", "-c", "-x"]);
        assert_eq!(options.goal(), Goal::Purge);
    }

    #[test]
    fn test_default_goal_is_build() {
        let options = BakeOptions::default();
        assert_eq!(options.goal(), Goal::Build);
        assert!(options.targets.is_empty());
    }

    #[test]
    fn test_max_shells_sizes_limiter() {
        let options = BakeOptions::parse_from(["bake", "--max", "3"]);
        assert_eq!(options.limiter().max(), 3);

        let options = BakeOptions::parse_from(["bake", "-m", "2"]);
        assert_eq!(options.limiter().max(), 2);
    }

    #[test]
    fn test_list_and_tree_flags() {
        let options = BakeOptions::parse_from(["bake", "--list"]);
        assert!(options.list);

        let options = BakeOptions::parse_from(["bake", "--tree", "all"]);
        assert!(options.tree);
        assert_eq!(options.targets, vec!["all"]);
    }
}
