//! Test utilities for ghflow
//!
//! Available to unit tests and, through the `test-utils` feature, to the
//! integration suite.
//!
//! - [`init_test_logging`] installs a tracing subscriber once per test binary
//! - [`ScriptedRunner`] is an in-process [`CommandRunner`] that answers
//!   `echo` like a shell, returns scripted output for other commands and
//!   records every invocation
//!
//! # Example
//!
//! ```rust,no_run
//! use ghflow::core::Params;
//! use ghflow::engine::Engine;
//! use ghflow::spec::CommandSpec;
//! use ghflow::test_utils::ScriptedRunner;
//!
//! # async fn example() {
//! let runner = ScriptedRunner::new();
//! let engine = Engine::new(runner.clone());
//! engine.register(CommandSpec::builder("A", "echo A").build().unwrap()).unwrap();
//!
//! engine.resolve("A", Params::new()).await.unwrap();
//! assert_eq!(runner.count("echo A"), 1);
//! # }
//! ```

use anyhow::anyhow;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once, PoisonError};
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::runner::{CommandOutput, CommandRunner};

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Only the first call has an effect. With `Some(level)` that level is used;
/// with `None` logging is enabled only when `RUST_LOG` is set.
///
/// ```bash
/// RUST_LOG=engine=debug,runner=trace cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .with_ansi(true)
            .try_init();
    });
}

#[derive(Debug, Clone)]
enum Response {
    Output(CommandOutput),
    Error(String),
}

#[derive(Debug, Default)]
struct ScriptedState {
    responses: Mutex<HashMap<String, Response>>,
    invocations: Mutex<Vec<String>>,
    delay: Mutex<Option<Duration>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

/// In-process [`CommandRunner`] for tests.
///
/// Commands with a scripted response get that response. Unscripted
/// `echo ...` commands print their arguments followed by a newline; any
/// other unscripted command exits 127. Clones share responses and the
/// invocation log, so a test can keep one clone while the engine owns
/// another.
#[derive(Debug, Clone, Default)]
pub struct ScriptedRunner {
    state: Arc<ScriptedState>,
}

impl ScriptedRunner {
    /// A runner with no scripted responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep for `delay` inside every invocation, so concurrent callers
    /// overlap.
    #[must_use]
    pub fn with_delay(self, delay: Duration) -> Self {
        *self.state.delay.lock().unwrap_or_else(PoisonError::into_inner) = Some(delay);
        self
    }

    fn script(&self, command: impl Into<String>, response: Response) {
        self.state
            .responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(command.into(), response);
    }

    /// Make `command` succeed with `stdout`.
    pub fn respond(&self, command: impl Into<String>, stdout: impl Into<String>) {
        self.script(command, Response::Output(CommandOutput::success(stdout)));
    }

    /// Make `command` exit with `code` and `stderr`.
    pub fn fail(&self, command: impl Into<String>, code: i32, stderr: impl Into<String>) {
        self.script(command, Response::Output(CommandOutput::failure(code, stderr)));
    }

    /// Make `command` impossible to run, as if spawning it failed.
    pub fn error(&self, command: impl Into<String>, message: impl Into<String>) {
        self.script(command, Response::Error(message.into()));
    }

    /// Every command run so far, in order.
    #[must_use]
    pub fn invocations(&self) -> Vec<String> {
        self.state.invocations.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// How often `command` ran.
    #[must_use]
    pub fn count(&self, command: &str) -> usize {
        self.state
            .invocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|c| *c == command)
            .count()
    }

    /// Total number of invocations.
    #[must_use]
    pub fn total(&self) -> usize {
        self.state.invocations.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Highest number of invocations that were running at the same time.
    #[must_use]
    pub fn peak_concurrency(&self) -> usize {
        self.state.peak.load(Ordering::SeqCst)
    }

    fn respond_to(&self, command: &str) -> Response {
        self.state.invocations.lock().unwrap_or_else(PoisonError::into_inner).push(command.to_string());

        let scripted =
            self.state.responses.lock().unwrap_or_else(PoisonError::into_inner).get(command).cloned();
        scripted.unwrap_or_else(|| match command.strip_prefix("echo") {
            Some(rest) if rest.is_empty() || rest.starts_with(' ') => {
                Response::Output(CommandOutput::success(format!("{}\n", rest.trim_start())))
            }
            _ => Response::Output(CommandOutput::failure(
                127,
                format!("sh: {}: command not found\n", command.split_whitespace().next().unwrap_or("")),
            )),
        })
    }
}

impl CommandRunner for ScriptedRunner {
    fn run<'a>(&'a self, command: &'a str) -> BoxFuture<'a, anyhow::Result<CommandOutput>> {
        async move {
            let response = self.respond_to(command);
            let delay = *self.state.delay.lock().unwrap_or_else(PoisonError::into_inner);

            let running = self.state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.state.peak.fetch_max(running, Ordering::SeqCst);
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            self.state.in_flight.fetch_sub(1, Ordering::SeqCst);

            match response {
                Response::Output(output) => Ok(output),
                Response::Error(message) => Err(anyhow!(message)),
            }
        }
        .boxed()
    }
}
