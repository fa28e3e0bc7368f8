use ghflow::config::EngineConfig;
use ghflow::core::{EngineError, Params, Value, ValueType};
use ghflow::engine::Engine;
use ghflow::parsers;
use ghflow::runner::ShellRunner;
use ghflow::spec::CommandSpec;
use ghflow::test_utils::init_test_logging;
use std::time::Duration;
use tempfile::TempDir;

use crate::common::init_git_repo;

#[tokio::test]
async fn test_echo_chain_through_sh() {
    init_test_logging(None);
    let engine = Engine::new(ShellRunner::new());
    engine.register(CommandSpec::builder("A", "echo A").build().unwrap()).unwrap();
    engine.register(CommandSpec::builder("B", "echo {A}-B").depends_on("A").build().unwrap()).unwrap();

    assert_eq!(engine.resolve("B", Params::new()).await.unwrap(), Value::from("A-B"));
}

#[tokio::test]
async fn test_shell_braces_survive_escaping() {
    let engine = Engine::new(ShellRunner::new());
    engine
        .register(
            CommandSpec::builder("NAME", "name=ghflow; echo \"${{name}}-{suffix}\"")
                .parameter("suffix", ValueType::Str)
                .build()
                .unwrap(),
        )
        .unwrap();

    let value = engine.resolve("NAME", Params::new().with("suffix", "rs")).await.unwrap();
    assert_eq!(value, Value::from("ghflow-rs"));
}

#[tokio::test]
async fn test_json_outputs_from_a_real_command() {
    let engine = Engine::new(ShellRunner::new());
    engine
        .register(
            CommandSpec::builder("PR", "printf '{\"number\": %s, \"draft\": true}' {number}")
                .parameter("number", ValueType::Int)
                .output("number", ValueType::Int)
                .output("draft", ValueType::Bool)
                .parser(parsers::json_object)
                .build()
                .unwrap(),
        )
        .unwrap();

    let params = Params::new().with("number", 12);
    assert_eq!(engine.resolve("draft", params.clone()).await.unwrap(), Value::Bool(true));
    assert_eq!(engine.resolve("number", params).await.unwrap(), Value::Int(12));
}

#[tokio::test]
async fn test_non_zero_exit_keeps_stderr() {
    let engine = Engine::new(ShellRunner::new());
    engine
        .register(CommandSpec::builder("FAIL", "echo 'no such ref' >&2; exit 2").build().unwrap())
        .unwrap();

    let err = engine.resolve("FAIL", Params::new()).await.unwrap_err();
    assert_eq!(
        err,
        EngineError::CommandFailed {
            command: "echo 'no such ref' >&2; exit 2".to_string(),
            exit_code: Some(2),
            stderr: "no such ref\n".to_string(),
        }
    );
}

#[tokio::test]
async fn test_timeout_is_a_runner_failure() {
    let runner = ShellRunner::new().with_timeout(Some(Duration::from_millis(100)));
    let engine = Engine::new(runner);
    engine.register(CommandSpec::builder("SLOW", "sleep 5").build().unwrap()).unwrap();

    let err = engine.resolve("SLOW", Params::new()).await.unwrap_err();
    assert!(matches!(&err, EngineError::RunnerFailed { reason, .. } if reason.contains("timed out")));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_git_values_from_configured_repository() {
    init_test_logging(None);
    let temp = TempDir::new().unwrap();
    init_git_repo(temp.path()).unwrap();

    let config_path = temp.path().join("ghflow.toml");
    tokio::fs::write(&config_path, format!("working_dir = {:?}\ntimeout_secs = 30\n", temp.path()))
        .await
        .unwrap();
    let mut config = EngineConfig::load_from(&config_path).await.unwrap();
    config.apply_overrides_from(|_| None);

    let engine = Engine::from_config(&config);
    engine
        .register_all(vec![
            CommandSpec::builder("subject", "git log -1 --format=%s {branch}")
                .depends_on("branch")
                .build()
                .unwrap(),
            CommandSpec::builder("branch", "git rev-parse --abbrev-ref HEAD").build().unwrap(),
        ])
        .unwrap();

    assert_eq!(engine.resolve("branch", Params::new()).await.unwrap(), Value::from("main"));
    assert_eq!(engine.resolve("subject", Params::new()).await.unwrap(), Value::from("Initial commit"));
}
