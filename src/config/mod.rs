//! Engine settings.
//!
//! [`EngineConfig`] holds the few knobs the engine and its default shell
//! runner take. It can be built in code, parsed from TOML and adjusted from
//! the environment:
//!
//! ```toml
//! verbose = true
//! shell = "bash"
//! timeout_secs = 60
//! working_dir = "/home/me/src/project"
//! ```
//!
//! Every field is optional; missing fields keep their defaults.
//!
//! # Environment Variables
//!
//! - `GHFLOW_VERBOSE`: `1`/`true`/`yes`/`on` or `0`/`false`/`no`/`off`
//! - `GHFLOW_SHELL`: shell program used to run commands

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

use crate::runner::ShellRunner;
use crate::runner::shell::{DEFAULT_TIMEOUT, default_shell};

/// Environment variable toggling verbose command logging.
pub const VERBOSE_ENV: &str = "GHFLOW_VERBOSE";

/// Environment variable overriding the shell.
pub const SHELL_ENV: &str = "GHFLOW_SHELL";

/// Settings for an [`Engine`](crate::engine::Engine) and its shell runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Log each finalized command at `info` instead of `debug`.
    pub verbose: bool,

    /// Shell used to run command lines (`sh` on Unix, `cmd` on Windows).
    pub shell: String,

    /// Per-command timeout in seconds; `0` disables the timeout.
    pub timeout_secs: u64,

    /// Directory commands run in; the current directory when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            shell: default_shell().to_string(),
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            working_dir: None,
        }
    }
}

impl EngineConfig {
    /// Parse settings from TOML text.
    ///
    /// # Errors
    ///
    /// Fails on invalid TOML or fields of the wrong type.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).context("Failed to parse engine config")
    }

    /// Read settings from a TOML file.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be read or parsed.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read engine config from {}", path.display()))?;

        let config = Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse engine config from {}", path.display()))?;
        tracing::debug!(target: "config", "Loaded engine config from {}", path.display());
        Ok(config)
    }

    /// Apply `GHFLOW_VERBOSE` and `GHFLOW_SHELL` from the process
    /// environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    /// Apply overrides read through `lookup`, which maps a variable name to
    /// its value.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(VERBOSE_ENV) {
            match parse_flag(&raw) {
                Some(verbose) => self.verbose = verbose,
                None => tracing::warn!(
                    target: "config",
                    "Ignoring {}={:?}: expected true/false, yes/no, on/off or 1/0",
                    VERBOSE_ENV,
                    raw
                ),
            }
        }
        if let Some(shell) = lookup(SHELL_ENV).filter(|s| !s.trim().is_empty()) {
            self.shell = shell.trim().to_string();
        }
    }

    /// The per-command timeout, `None` when disabled.
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        if self.timeout_secs == 0 { None } else { Some(Duration::from_secs(self.timeout_secs)) }
    }

    /// A shell runner with these settings.
    #[must_use]
    pub fn runner(&self) -> ShellRunner {
        let runner = ShellRunner::new().with_shell(self.shell.clone()).with_timeout(self.timeout());
        match self.working_dir {
            Some(ref dir) => runner.with_working_dir(dir.clone()),
            None => runner,
        }
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
