//! Integration test suite for ghflow
//!
//! End-to-end tests driving the public API: registration of whole workflow
//! tables, resolution through scripted and real shells, concurrency and
//! error reporting.
//!
//! # Running Integration Tests
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! # Test Organization
//!
//! - **workflow**: a git/gh workflow table resolved with a scripted runner
//! - **concurrency**: memoization under concurrent callers
//! - **errors**: registration and resolution failures as users see them
//! - **shell**: the shell runner against `sh` and a real git repository

// Shared fixtures (from parent tests/ directory)
#[path = "../common/mod.rs"]
mod common;

mod concurrency;
mod errors;
#[cfg(unix)]
mod shell;
mod workflow;
