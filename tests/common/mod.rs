//! Common fixtures for ghflow integration tests
//!
//! A small git/gh workflow table shared by the suites, plus a scripted runner
//! pre-loaded with the output those commands would print.

// Not every suite uses every fixture
#![allow(dead_code)]

use anyhow::{Context, Result};
use ghflow::core::ValueType;
use ghflow::engine::Engine;
use ghflow::parsers;
use ghflow::spec::CommandSpec;
use ghflow::test_utils::{ScriptedRunner, init_test_logging};
use std::path::Path;
use std::process::Command;

pub const ISSUE_COMMAND: &str = "gh issue view 42 --json title,number,state";
pub const ISSUE_JSON: &str = r#"{"title": "Crash on empty config", "number": 42, "state": "OPEN"}"#;

/// The declarations of a "start work on an issue" workflow, listed in no
/// particular order.
pub fn workflow_specs() -> Vec<CommandSpec> {
    vec![
        CommandSpec::builder("start_branch", "git checkout -b {slug} {default_branch}")
            .description("Create the work branch")
            .depends_on_all(["slug", "default_branch"])
            .build()
            .expect("start_branch"),
        CommandSpec::builder("slug", "echo {user}/{title_word}")
            .depends_on_all(["user", "title_word"])
            .build()
            .expect("slug"),
        CommandSpec::builder("title_word", "echo crash")
            .build()
            .expect("title_word"),
        CommandSpec::builder("user", "gh api user --jq .login")
            .build()
            .expect("user"),
        CommandSpec::builder("default_branch", "git symbolic-ref --short refs/remotes/origin/HEAD")
            .build()
            .expect("default_branch"),
        CommandSpec::builder("issue", "gh issue view {number} --json title,number,state")
            .parameter("number", ValueType::Int)
            .output("title", ValueType::Str)
            .output("number", ValueType::Int)
            .output("state", ValueType::Str)
            .parser(parsers::json_object)
            .build()
            .expect("issue"),
    ]
}

/// Scripted answers for every command in [`workflow_specs`].
pub fn workflow_runner() -> ScriptedRunner {
    let runner = ScriptedRunner::new();
    runner.respond("gh api user --jq .login", "octocat\n");
    runner.respond("git symbolic-ref --short refs/remotes/origin/HEAD", "origin/main\n");
    runner.respond("git checkout -b octocat/crash origin/main", "");
    runner.respond(ISSUE_COMMAND, ISSUE_JSON);
    runner
}

/// An engine with the workflow registered, and a handle on its runner.
pub fn workflow_engine() -> (Engine, ScriptedRunner) {
    init_test_logging(None);
    let runner = workflow_runner();
    let engine = Engine::new(runner.clone());
    engine.register_all(workflow_specs()).expect("workflow registers");
    (engine, runner)
}

/// Initialise a git repository with one commit on branch `main`.
pub fn init_git_repo(path: &Path) -> Result<()> {
    let git = |args: &[&str]| -> Result<()> {
        let output = Command::new("git")
            .args(args)
            .current_dir(path)
            .output()
            .with_context(|| format!("Failed to run git {}", args.join(" ")))?;
        anyhow::ensure!(
            output.status.success(),
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr)
        );
        Ok(())
    };

    git(&["init", "--quiet"])?;
    git(&["config", "user.email", "test@ghflow.example"])?;
    git(&["config", "user.name", "Test User"])?;
    git(&["checkout", "--quiet", "-b", "main"])?;
    std::fs::write(path.join("README.md"), "# test\n").context("Failed to write README")?;
    git(&["add", "."])?;
    git(&["commit", "--quiet", "-m", "Initial commit"])?;
    Ok(())
}
