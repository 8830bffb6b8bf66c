//! BUTTRESS CLI Surface
//!
//! The entry point build binaries call: parses options, installs the
//! tracing subscriber, hands the build function a context carrying a
//! limiter-sized shell factory, then drives the engine and reports a
//! styled OK/FAIL with a matching exit code.
//!
//! A build binary is the analogue of a `Makefile`: a small `main` that
//! registers its recipes and finishes with [`bake`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod options;

pub use options::BakeOptions;

use std::process::ExitCode;

use clap::Parser;
use console::style;
use tracing::{debug, error, info};

use buttress_core::{BuildError, BuildResult};
use buttress_graph::BuildEngine;
use buttress_shell::Shell;

/// What a build function receives: the parsed options and a shell factory
/// wired to the invocation's subshell limit
#[derive(Debug)]
pub struct BakeContext {
    options: BakeOptions,
    shell: Shell,
}

impl BakeContext {
    /// Create a context from parsed options
    #[must_use]
    pub fn new(options: BakeOptions) -> Self {
        let shell = Shell::with_limiter(options.limiter());
        Self { options, shell }
    }

    /// The parsed build parameters
    #[must_use]
    pub fn options(&self) -> &BakeOptions {
        &self.options
    }

    /// The shell factory for this invocation
    ///
    /// All commands built from it (or from factories derived via
    /// [`Shell::env`]) share one concurrency limiter.
    #[must_use]
    pub fn shell(&self) -> Shell {
        self.shell.clone()
    }
}

/// Parse the command line and run a build
///
/// The build function registers recipes and returns the engine; this driver
/// does the rest. Intended as the last call of a build binary's `main`.
pub fn bake<F>(build: F) -> ExitCode
where
    F: FnOnce(&BakeContext) -> BuildResult<BuildEngine>,
{
    bake_with(BakeOptions::parse(), build)
}

/// Run a build with pre-parsed options
pub fn bake_with<F>(options: BakeOptions, build: F) -> ExitCode
where
    F: FnOnce(&BakeContext) -> BuildResult<BuildEngine>,
{
    init_tracing(&options);
    let context = BakeContext::new(options);

    match run(&context, build) {
        Ok(()) => {
            if !context.options.quiet {
                eprintln!("{}", style("OK").green().bold());
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            if context.options.debug_enabled() {
                for underlying in err.flatten() {
                    error!(error = %underlying, "build error");
                }
            } else {
                error!("{err}");
            }
            eprintln!("{}", style("FAIL").red().bold());
            ExitCode::FAILURE
        }
    }
}

fn run<F>(context: &BakeContext, build: F) -> BuildResult<()>
where
    F: FnOnce(&BakeContext) -> BuildResult<BuildEngine>,
{
    let engine = build(context)?;
    let options = context.options();

    if options.list {
        for name in engine.target_names() {
            println!("{name}");
        }
        return Ok(());
    }

    if options.tree {
        return print_trees(&engine, &options.targets);
    }

    let recipes = engine.compile_targets(&options.targets)?;
    let goal = options.goal();
    info!(targets = ?recipes.iter().map(|(name, _)| name).collect::<Vec<_>>(), ?goal, "resolving");

    let runtime = tokio::runtime::Runtime::new().map_err(|err| BuildError::Internal {
        message: format!("failed to start runtime: {err}"),
    })?;
    runtime.block_on(engine.resolve(&recipes, goal))?;

    let names: Vec<String> = recipes.iter().map(|(name, _)| name.clone()).collect();
    let report = engine.report(&names.join(" "), &recipes).to_json()?;
    debug!(report = %report, "build report");

    Ok(())
}

fn print_trees(engine: &BuildEngine, targets: &[String]) -> BuildResult<()> {
    let names: Vec<String> = if targets.is_empty() {
        match engine.default_target_name() {
            Some(default) => vec![default.to_string()],
            None => return Err(BuildError::NoDefaultTarget),
        }
    } else {
        targets.to_vec()
    };

    for name in &names {
        for line in engine.tree(name)?.render() {
            println!("{line}");
        }
    }
    Ok(())
}

fn init_tracing(options: &BakeOptions) {
    let filter = if options.quiet {
        "error"
    } else if options.debug_enabled() || options.verbose {
        "debug"
    } else {
        "info"
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .try_init();
}
