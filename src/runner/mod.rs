//! Execution adapter boundary.
//!
//! The engine never launches processes itself. It hands each finalized
//! command line to a [`CommandRunner`] and interprets the returned
//! [`CommandOutput`]. [`ShellRunner`] is the production implementation; tests
//! use the scripted runner from `test_utils`.

pub mod shell;

use futures::future::BoxFuture;

pub use shell::{ShellCommand, ShellRunner};

/// Captured result of one command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Standard output
    pub stdout: String,
    /// Standard error
    pub stderr: String,
    /// Exit code; `None` when the process was killed by a signal
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    /// Output of a command that exited with status 0.
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: Some(0),
        }
    }

    /// Output of a command that exited with `code`.
    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            exit_code: Some(code),
        }
    }

    /// Whether the command exited with status 0.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.exit_code, Some(0))
    }
}

/// Runs finalized command lines.
///
/// Implementations must not block the async executor: sibling dependencies
/// are resolved concurrently and each awaits its own `run`.
///
/// `Err` means the command could not be run at all (spawn failure, timeout).
/// A command that ran and exited non-zero is an `Ok` output with a non-zero
/// `exit_code`.
pub trait CommandRunner: Send + Sync {
    /// Run one command line and capture its output.
    fn run<'a>(&'a self, command: &'a str) -> BoxFuture<'a, anyhow::Result<CommandOutput>>;
}
