//! Process execution through the system shell.
//!
//! [`ShellCommand`] is a small builder around [`tokio::process::Command`]
//! with output capture, an optional timeout and debug logging of what ran
//! and how long it took. [`ShellRunner`] uses it to run each finalized
//! command line through `sh -c` (`cmd /C` on Windows).
//!
//! ```rust,no_run
//! use ghflow::runner::ShellCommand;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let output = ShellCommand::new("git")
//!     .args(["rev-parse", "--abbrev-ref", "HEAD"])
//!     .current_dir("/path/to/repo")
//!     .with_context("current-branch")
//!     .execute()
//!     .await?;
//! println!("{}", output.stdout.trim());
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result, anyhow};
use futures::FutureExt;
use futures::future::BoxFuture;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::time::timeout;

use super::{CommandOutput, CommandRunner};

/// Default time a command may run before it is abandoned.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Builder for one process invocation.
///
/// Defaults: output captured, 5 minute timeout, current directory and
/// environment inherited from the parent process.
#[derive(Debug, Clone)]
pub struct ShellCommand {
    /// Program to launch
    program: String,

    /// Arguments passed to the program
    args: Vec<String>,

    /// Working directory (defaults to the current directory)
    current_dir: Option<PathBuf>,

    /// Extra environment variables
    env_vars: Vec<(String, String)>,

    /// Maximum duration to wait for completion (None = no timeout)
    timeout_duration: Option<Duration>,

    /// Label included in log lines to tell concurrent commands apart
    context: Option<String>,
}

impl ShellCommand {
    /// Start a command for `program`.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            env_vars: Vec::new(),
            timeout_duration: Some(DEFAULT_TIMEOUT),
            context: None,
        }
    }

    /// A command that runs `line` through the platform shell.
    pub fn shell_line(shell: &str, line: &str) -> Self {
        let flag = if cfg!(windows) && shell.eq_ignore_ascii_case("cmd") { "/C" } else { "-c" };
        Self::new(shell).args([flag, line])
    }

    /// Add one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run in `dir` instead of the current directory.
    #[must_use]
    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Set an environment variable for this command only.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.push((key.into(), value.into()));
        self
    }

    /// Set a custom timeout (None for no timeout).
    #[must_use]
    pub const fn with_timeout(mut self, duration: Option<Duration>) -> Self {
        self.timeout_duration = duration;
        self
    }

    /// Set a label for log lines (e.g. the spec name).
    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    fn display_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn prefix(&self) -> String {
        self.context.as_ref().map(|ctx| format!("({ctx}) ")).unwrap_or_default()
    }

    /// Run the command and capture its output.
    ///
    /// A non-zero exit is reported through [`CommandOutput::exit_code`], not
    /// as an error.
    ///
    /// # Errors
    ///
    /// Fails when the process cannot be spawned or exceeds the timeout.
    pub async fn execute(self) -> Result<CommandOutput> {
        let start = Instant::now();
        let line = self.display_line();
        let prefix = self.prefix();

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(ref dir) = self.current_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &self.env_vars {
            tracing::trace!(target: "runner", "Setting env var: {}={}", key, value);
            cmd.env(key, value);
        }
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        tracing::debug!(target: "runner", "{}Executing command: {}", prefix, line);

        let output_future = cmd.output();
        let output = if let Some(duration) = self.timeout_duration {
            if let Ok(result) = timeout(duration, output_future).await {
                result.with_context(|| format!("Failed to execute {line}"))?
            } else {
                tracing::warn!(
                    target: "runner",
                    "{}Command timed out after {} seconds: {}",
                    prefix,
                    duration.as_secs(),
                    line
                );
                return Err(anyhow!(
                    "Command timed out after {} seconds. It may be waiting for input \
                     (authentication prompt, pager, editor). Try running it manually: {}",
                    duration.as_secs(),
                    line
                ));
            }
        } else {
            output_future.await.with_context(|| format!("Failed to execute {line}"))?
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let exit_code = output.status.code();

        if output.status.success() {
            if !stdout.is_empty() {
                tracing::trace!(target: "runner", "{}{}", prefix, stdout.trim());
            }
        } else {
            tracing::debug!(target: "runner", "{}Command failed with exit code: {:?}", prefix, exit_code);
            if !stderr.is_empty() {
                tracing::debug!(target: "runner", "{}Error: {}", prefix, stderr.trim());
            }
        }

        let elapsed = start.elapsed();
        if elapsed.as_secs() > 1 {
            tracing::info!(target: "runner::perf", "{}{} took {:.2}s", prefix, line, elapsed.as_secs_f64());
        } else if elapsed.as_millis() > 100 {
            tracing::debug!(target: "runner::perf", "{}{} took {}ms", prefix, line, elapsed.as_millis());
        }

        Ok(CommandOutput {
            stdout,
            stderr,
            exit_code,
        })
    }
}

/// [`CommandRunner`] that runs command lines through the system shell.
#[derive(Debug, Clone)]
pub struct ShellRunner {
    shell: String,
    working_dir: Option<PathBuf>,
    timeout_duration: Option<Duration>,
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self {
            shell: default_shell().to_string(),
            working_dir: None,
            timeout_duration: Some(DEFAULT_TIMEOUT),
        }
    }
}

/// `sh` on Unix, `cmd` on Windows.
#[must_use]
pub const fn default_shell() -> &'static str {
    if cfg!(windows) { "cmd" } else { "sh" }
}

impl ShellRunner {
    /// Runner using the platform shell in the current directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `shell` instead of the platform default.
    #[must_use]
    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    /// Run every command in `dir`, e.g. the repository root.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Per-command timeout (None for no timeout).
    #[must_use]
    pub const fn with_timeout(mut self, duration: Option<Duration>) -> Self {
        self.timeout_duration = duration;
        self
    }

    /// The shell program in use.
    #[must_use]
    pub fn shell(&self) -> &str {
        &self.shell
    }
}

impl CommandRunner for ShellRunner {
    fn run<'a>(&'a self, command: &'a str) -> BoxFuture<'a, Result<CommandOutput>> {
        let mut cmd =
            ShellCommand::shell_line(&self.shell, command).with_timeout(self.timeout_duration);
        if let Some(ref dir) = self.working_dir {
            cmd = cmd.current_dir(dir);
        }
        cmd.execute().boxed()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_execute_captures_stdout() {
        let output = ShellCommand::new("echo").arg("hello").execute().await.unwrap();
        assert!(output.is_success());
        assert_eq!(output.stdout, "hello\n");
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_not_an_error() {
        let output = ShellCommand::shell_line("sh", "echo oops >&2; exit 3").execute().await.unwrap();
        assert_eq!(output.exit_code, Some(3));
        assert_eq!(output.stderr.trim(), "oops");
        assert!(!output.is_success());
    }

    #[tokio::test]
    async fn test_missing_program_is_an_error() {
        let err = ShellCommand::new("ghflow-definitely-not-installed").execute().await.unwrap_err();
        assert!(err.to_string().contains("Failed to execute"));
    }

    #[tokio::test]
    async fn test_timeout() {
        let err = ShellCommand::new("sleep")
            .arg("5")
            .with_timeout(Some(Duration::from_millis(50)))
            .execute()
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_env_and_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ShellRunner::new().with_working_dir(dir.path());
        let output = runner.run("pwd").await.unwrap();
        let printed = std::fs::canonicalize(output.stdout.trim()).unwrap();
        assert_eq!(printed, std::fs::canonicalize(dir.path()).unwrap());

        let output = ShellCommand::shell_line("sh", "printf %s \"$GHFLOW_TEST\"")
            .env("GHFLOW_TEST", "set")
            .execute()
            .await
            .unwrap();
        assert_eq!(output.stdout, "set");
    }
}
