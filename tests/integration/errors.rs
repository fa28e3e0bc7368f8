use ghflow::core::{EngineError, ErrorKind, Params, user_friendly_error};
use ghflow::engine::{Engine, Resolved};
use ghflow::spec::CommandSpec;
use ghflow::test_utils::ScriptedRunner;

use crate::common::{workflow_engine, workflow_runner, workflow_specs};

#[test]
fn test_cycle_in_table_is_named() {
    let engine = Engine::new(ScriptedRunner::new());
    let a = CommandSpec::builder("A", "echo {B}").depends_on("B").build().unwrap();
    let b = CommandSpec::builder("B", "echo {A}").depends_on("A").build().unwrap();

    let err = engine.register_all(vec![a, b]).unwrap_err();
    assert_eq!(err.to_string(), "Circular dependency detected: A → B → A");
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(engine.spec_names().is_empty());
}

#[test]
fn test_missing_dependency_fails_before_resolution() {
    let runner = ScriptedRunner::new();
    let engine = Engine::new(runner.clone());
    let d = CommandSpec::builder("D", "echo {E}").depends_on("E").build().unwrap();

    let err = engine.register(d).unwrap_err();
    let ctx = user_friendly_error(anyhow::Error::from(err));
    assert!(ctx.to_string().contains("'E'"));
    assert!(ctx.suggestion.is_some());
    assert_eq!(runner.total(), 0);
}

#[test]
fn test_partial_table_registers_nothing() {
    let engine = Engine::new(workflow_runner());
    let mut specs = workflow_specs();
    specs.retain(|spec| spec.name() != "user");

    let err = engine.register_all(specs).unwrap_err();
    assert!(matches!(err, EngineError::UnregisteredDependency { dependency, .. } if dependency == "user"));
    assert!(engine.spec_names().is_empty());
}

#[tokio::test]
async fn test_failed_command_reaches_the_user() {
    let (engine, runner) = workflow_engine();
    runner.fail("gh api user --jq .login", 4, "gh: To get started with GitHub CLI, please run: gh auth login\n");

    let err = engine.resolve("start_branch", Params::new()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Execution);

    let ctx = user_friendly_error(anyhow::Error::from(err));
    assert_eq!(
        ctx.details.as_deref(),
        Some("gh: To get started with GitHub CLI, please run: gh auth login")
    );
    assert!(ctx.to_string().starts_with("Command failed with exit code 4: gh api user --jq .login"));
}

#[tokio::test]
async fn test_soft_failure_leaves_engine_usable() {
    let (engine, runner) = workflow_engine();
    runner.fail("gh api user --jq .login", 1, "HTTP 401\n");

    let outcome = engine.resolve_soft("slug", Params::new()).await.unwrap();
    let Resolved::Failed(failure) = outcome else {
        panic!("expected a failure, got {outcome:?}");
    };
    assert_eq!(failure.command, "gh api user --jq .login");
    assert_eq!(failure.stderr, "HTTP 401\n");

    runner.respond("gh api user --jq .login", "octocat\n");
    let outcome = engine.resolve_soft("slug", Params::new()).await.unwrap();
    assert_eq!(outcome.into_value(), Some("octocat/crash".into()));
}

#[tokio::test]
async fn test_typo_gets_a_suggestion() {
    let (engine, _runner) = workflow_engine();
    let err = engine.resolve("defualt_branch", Params::new()).await.unwrap_err();

    let ctx = user_friendly_error(anyhow::Error::from(err));
    assert_eq!(ctx.suggestion.as_deref(), Some("Did you mean: default_branch, start_branch?"));
}
