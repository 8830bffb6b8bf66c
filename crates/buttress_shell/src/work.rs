//! External commands as recipe work.
//!
//! A `Shell` factory carries a merged base environment and the shared
//! limiter; its builder configures one command. Execution acquires a
//! limiter slot, renders the template, spawns through `sh -c`, multiplexes
//! captured output, and records the return code exactly once.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Mutex;

use async_trait::async_trait;
use indexmap::IndexMap;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tracing::{debug, error, trace};

use buttress_core::{
    Artifact, BuildError, BuildResult, EnvMap, EnvValue, digest_env, shell_join, shell_quote,
};
use buttress_graph::Work;

use crate::limiter::ShellLimiter;
use crate::result::ShellResult;
use crate::sink::OutputSink;
use crate::template;

/// Factory for shell works sharing one environment and one limiter
#[derive(Debug, Clone)]
pub struct Shell {
    env: EnvMap,
    limiter: ShellLimiter,
}

impl Shell {
    /// A factory over the inherited process environment and a limiter sized
    /// to the host's parallelism
    #[must_use]
    pub fn new() -> Self {
        Self::with_limiter(ShellLimiter::default())
    }

    /// A factory over the inherited process environment and the given
    /// limiter
    #[must_use]
    pub fn with_limiter(limiter: ShellLimiter) -> Self {
        let mut env = EnvMap::new();
        for (key, value) in std::env::vars() {
            env.insert(key, EnvValue::Single(value));
        }
        Self { env, limiter }
    }

    /// The shared limiter
    #[must_use]
    pub fn limiter(&self) -> &ShellLimiter {
        &self.limiter
    }

    /// A derived factory with additional environment overrides
    #[must_use]
    pub fn env<K, V>(&self, vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<EnvValue>,
    {
        let mut next = self.clone();
        for (key, value) in vars {
            next.env.insert(key.into(), value.into());
        }
        next
    }

    /// Start building a command from a template
    #[must_use]
    pub fn cmd(&self, template: impl Into<String>) -> ShellBuilder {
        ShellBuilder {
            template: template.into(),
            env: self.env.clone(),
            limiter: self.limiter.clone(),
            cwd: None,
            stdin: None,
            inputs: Vec::new(),
            output: Artifact::Null,
            params: EnvMap::new(),
            echo: true,
            interactive: false,
            success_codes: BTreeSet::from([0]),
        }
    }
}

impl Default for Shell {
    fn default() -> Self {
        Self::new()
    }
}

/// Configures one shell command
#[derive(Debug, Clone)]
pub struct ShellBuilder {
    template: String,
    env: EnvMap,
    limiter: ShellLimiter,
    cwd: Option<PathBuf>,
    stdin: Option<String>,
    inputs: Vec<Artifact>,
    output: Artifact,
    params: EnvMap,
    echo: bool,
    interactive: bool,
    success_codes: BTreeSet<i32>,
}

impl ShellBuilder {
    /// Set the working directory (default: the current directory)
    #[must_use]
    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Add an environment override for this command
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<EnvValue>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Bind a named template parameter
    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl Into<EnvValue>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Provide a standard-input payload
    #[must_use]
    pub fn stdin(mut self, payload: impl Into<String>) -> Self {
        self.stdin = Some(payload.into());
        self
    }

    /// Declare an input artifact beyond dependency outputs
    #[must_use]
    pub fn input(mut self, artifact: Artifact) -> Self {
        self.inputs.push(artifact);
        self
    }

    /// Declare the output artifact
    #[must_use]
    pub fn output(mut self, artifact: impl Into<Artifact>) -> Self {
        self.output = artifact.into();
        self
    }

    /// Declare the output as a file path
    #[must_use]
    pub fn output_file(self, path: impl Into<PathBuf>) -> Self {
        self.output(Artifact::file(path))
    }

    /// Echo captured stdout into the log (default true)
    #[must_use]
    pub fn echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    /// Inherit the controlling terminal instead of capturing output
    #[must_use]
    pub fn interactive(mut self) -> Self {
        self.interactive = true;
        self
    }

    /// Replace the success return-code set (default `{0}`)
    #[must_use]
    pub fn success_codes(mut self, codes: impl IntoIterator<Item = i32>) -> Self {
        self.success_codes = codes.into_iter().collect();
        self
    }

    /// Finish configuration
    ///
    /// # Errors
    ///
    /// Misconfiguration is raised here, eagerly: an interactive command
    /// combined with a programmatic stdin payload, or a non-file output.
    pub fn build(self) -> BuildResult<ShellWork> {
        if self.interactive && self.stdin.is_some() {
            return Err(BuildError::Misconfigured {
                reason: "an interactive shell can't take a programmatic stdin payload"
                    .to_string(),
            });
        }

        let result = ShellResult::new(self.output, self.success_codes)?;

        Ok(ShellWork {
            template: self.template,
            env: self.env,
            params: self.params,
            limiter: self.limiter,
            cwd: self.cwd,
            stdin: self.stdin,
            inputs: self.inputs,
            echo: self.echo,
            interactive: self.interactive,
            result,
            last_command: Mutex::new(None),
        })
    }
}

/// One shell command as recipe work
pub struct ShellWork {
    template: String,
    env: EnvMap,
    params: EnvMap,
    limiter: ShellLimiter,
    cwd: Option<PathBuf>,
    stdin: Option<String>,
    inputs: Vec<Artifact>,
    echo: bool,
    interactive: bool,
    result: ShellResult,
    last_command: Mutex<Option<String>>,
}

impl ShellWork {
    /// The execution state: return code, captured output, backing artifact
    #[must_use]
    pub fn result(&self) -> &ShellResult {
        &self.result
    }

    fn working_dir(&self) -> BuildResult<PathBuf> {
        match &self.cwd {
            Some(cwd) => Ok(cwd.clone()),
            None => std::env::current_dir().map_err(|err| BuildError::io(".", &err)),
        }
    }

    /// Render the command template
    ///
    /// `{input}`/`{output}` become shell-escaped, cwd-relativized,
    /// space-joined parameter lists; every other placeholder draws from the
    /// merged environment/parameter map, each value escaped individually.
    fn render_command(&self, input: &Artifact) -> BuildResult<String> {
        let cwd = self.working_dir()?;

        let mut map: IndexMap<String, String> = IndexMap::new();
        for (key, value) in self.env.iter().chain(self.params.iter()) {
            map.insert(key.clone(), escape_value(value));
        }
        map.insert(
            "input".to_string(),
            shell_join(input.to_params(Some(&cwd))),
        );
        map.insert(
            "output".to_string(),
            shell_join(self.result.file().to_params(Some(&cwd))),
        );

        template::render(&self.template, &map)
    }

    fn command_base(&self, command: &str) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c").arg(command).envs(digest_env(&self.env));
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }
        cmd
    }

    async fn run_piped(&self, command: &str) -> BuildResult<()> {
        let mut child = self
            .command_base(command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| BuildError::Spawn {
                command: command.to_string(),
                message: err.to_string(),
            })?;

        // Write and close stdin; closing unconditionally keeps commands
        // that read stdin from hanging.
        let mut stdin_handle = child.stdin.take();
        if let (Some(payload), Some(handle)) = (&self.stdin, stdin_handle.as_mut()) {
            handle
                .write_all(payload.as_bytes())
                .await
                .map_err(|err| BuildError::Spawn {
                    command: command.to_string(),
                    message: format!("failed to write stdin: {err}"),
                })?;
        }
        drop(stdin_handle);

        let stdout = child.stdout.take().ok_or_else(|| BuildError::Internal {
            message: "piped child has no stdout handle".to_string(),
        })?;
        let stderr = child.stderr.take().ok_or_else(|| BuildError::Internal {
            message: "piped child has no stderr handle".to_string(),
        })?;

        let sink = collect_lines(
            BufReader::new(stdout).lines(),
            BufReader::new(stderr).lines(),
        )
        .await;

        let status = child.wait().await.map_err(|err| BuildError::Spawn {
            command: command.to_string(),
            message: format!("failed to wait: {err}"),
        })?;

        let code = status.code().unwrap_or(-1);
        self.result.set_returncode(code)?;
        self.result.set_sink(sink);

        if !self.result.succeeded() {
            let stderr_lines = self.result.stderr();
            for line in &stderr_lines {
                error!("{line}");
            }
            return Err(BuildError::ShellFailure {
                command: command.to_string(),
                code,
                stderr: stderr_lines,
            });
        }

        for line in self.result.stdout() {
            if self.echo {
                debug!("{line}");
            } else {
                trace!("{line}");
            }
        }
        for line in self.result.stderr() {
            debug!("{line}");
        }

        Ok(())
    }

    async fn run_interactive(&self, command: &str) -> BuildResult<()> {
        let status = self
            .command_base(command)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|err| BuildError::Spawn {
                command: command.to_string(),
                message: err.to_string(),
            })?;

        let code = status.code().unwrap_or(-1);
        self.result.set_returncode(code)?;

        if !self.result.succeeded() {
            return Err(BuildError::ShellFailure {
                command: command.to_string(),
                code,
                stderr: Vec::new(),
            });
        }
        Ok(())
    }

    fn previous_failure(&self) -> BuildError {
        let command = self
            .last_command
            .lock()
            .expect("command lock poisoned")
            .clone()
            .unwrap_or_else(|| self.template.clone());
        BuildError::ShellFailure {
            command,
            code: self.result.returncode().unwrap_or(-1),
            stderr: self.result.stderr(),
        }
    }
}

impl std::fmt::Debug for ShellWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShellWork")
            .field("template", &self.template)
            .field("interactive", &self.interactive)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Work for ShellWork {
    fn output(&self) -> Artifact {
        self.result.file().clone()
    }

    fn completed(&self) -> bool {
        self.result.succeeded()
    }

    fn input_artifacts(&self) -> Artifact {
        Artifact::poly(self.inputs.iter().cloned())
    }

    fn display(&self) -> Option<String> {
        Some(self.template.clone())
    }

    async fn perform(&self, input: &Artifact) -> BuildResult<()> {
        // A return code means this command already ran in this invocation.
        if self.result.has_returncode() {
            if self.result.succeeded() {
                debug!(template = %self.template, "command already completed");
                return Ok(());
            }
            return Err(self.previous_failure());
        }

        let _permit = self.limiter.acquire().await?;

        let command = self.render_command(input)?;
        *self.last_command.lock().expect("command lock poisoned") = Some(command.clone());
        debug!(command = %command, "spawning");

        if self.interactive {
            self.run_interactive(&command).await
        } else {
            self.run_piped(&command).await
        }
    }
}

fn escape_value(value: &EnvValue) -> String {
    match value {
        EnvValue::Single(s) => shell_quote(s),
        EnvValue::Many(items) => shell_join(items),
    }
}

/// Multiplex two line streams into one sink
///
/// One pending read per open stream; whichever produces a line first is
/// routed to the sink with a capture timestamp and re-armed, until both
/// streams are exhausted.
async fn collect_lines<O, E>(mut stdout: Lines<O>, mut stderr: Lines<E>) -> OutputSink
where
    O: AsyncBufRead + Unpin,
    E: AsyncBufRead + Unpin,
{
    let mut sink = OutputSink::new();
    let mut out_open = true;
    let mut err_open = true;

    while out_open || err_open {
        tokio::select! {
            line = stdout.next_line(), if out_open => match line {
                Ok(Some(line)) => sink.output(line),
                Ok(None) => out_open = false,
                Err(err) => {
                    debug!(error = %err, "stdout read failed");
                    out_open = false;
                }
            },
            line = stderr.next_line(), if err_open => match line {
                Ok(Some(line)) => sink.error(line),
                Ok(None) => err_open = false,
                Err(err) => {
                    debug!(error = %err, "stderr read failed");
                    err_open = false;
                }
            },
        }
    }

    sink
}
