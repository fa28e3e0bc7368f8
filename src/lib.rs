//! ghflow - dependency-aware command resolution for git/gh workflow tooling
//!
//! Workflow tools built on `git` and `gh` keep asking the same questions: which
//! branch is checked out, what is its upstream, what is the title of issue 7.
//! Each answer is the output of a shell command, and many commands need the
//! answers of others spliced into their own command line. ghflow declares
//! each such value once, as a [`CommandSpec`](spec::CommandSpec), and resolves
//! values on demand:
//!
//! - dependencies resolve first, siblings concurrently
//! - every (spec, parameter binding) pair runs its command at most once per
//!   [`Engine`](engine::Engine), even when requested concurrently
//! - a spec may split its output into typed, individually addressable outputs
//!
//! # Architecture Overview
//!
//! - [`spec`] - immutable command declarations and their templates
//! - [`registry`] - validated store of specs, cycle detection, lookup
//! - [`cache`] - write-once memoized results, exportable as a snapshot
//! - [`engine`] - the resolution algorithm and its per-binding locking
//! - [`runner`] - the execution adapter boundary and the shell runner
//! - [`parsers`] - ready-made output parsers (JSON object, `key=value` lines)
//! - [`config`] - engine settings from TOML and the environment
//! - [`core`] - values, parameters and the error type
//!
//! # Example
//!
//! ```rust,no_run
//! use ghflow::core::{Params, ValueType};
//! use ghflow::engine::Engine;
//! use ghflow::parsers;
//! use ghflow::runner::ShellRunner;
//! use ghflow::spec::CommandSpec;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let engine = Engine::new(ShellRunner::new());
//!
//! engine.register_all(vec![
//!     CommandSpec::builder("issue", "gh issue view {number} --json title,number")
//!         .parameter("number", ValueType::Int)
//!         .output("title", ValueType::Str)
//!         .output("number", ValueType::Int)
//!         .parser(parsers::json_object)
//!         .build()?,
//!     CommandSpec::builder("branch", "git branch --show-current")
//!         .description("Current branch")
//!         .build()?,
//! ])?;
//!
//! let title = engine.resolve("title", Params::new().with("number", 7)).await?;
//! let branch = engine.resolve("branch", Params::new()).await?;
//! println!("{branch}: {title}");
//! # Ok(())
//! # }
//! ```
//!
//! # Logging
//!
//! The library logs through `tracing` and never installs a subscriber.
//! Targets: `engine` (finalized commands, at `info` in verbose mode),
//! `registry`, `cache`, `config`, `runner` and `runner::perf`.

pub mod cache;
pub mod config;
pub mod core;
pub mod engine;
pub mod parsers;
pub mod registry;
pub mod runner;
pub mod spec;

// Test utilities (available for both unit and integration tests)
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
