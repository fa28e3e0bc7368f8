use ghflow::cache::CacheSnapshot;
use ghflow::core::{Params, Value};
use ghflow::engine::Engine;

use crate::common::{ISSUE_COMMAND, workflow_engine, workflow_runner, workflow_specs};

#[tokio::test]
async fn test_register_all_orders_the_table() {
    let (engine, _runner) = workflow_engine();

    let names = engine.spec_names();
    let position = |name: &str| names.iter().position(|n| n == name).unwrap();
    assert!(position("user") < position("slug"));
    assert!(position("title_word") < position("slug"));
    assert!(position("slug") < position("start_branch"));
    assert!(position("default_branch") < position("start_branch"));
    assert_eq!(names.len(), 6);
}

#[tokio::test]
async fn test_resolve_workflow_step() {
    let (engine, runner) = workflow_engine();

    let value = engine.resolve("start_branch", Params::new()).await.unwrap();
    assert_eq!(value, Value::from(""));
    assert_eq!(runner.count("git checkout -b octocat/crash origin/main"), 1);
    assert_eq!(engine.cached("slug", &Params::new()), Some(Value::from("octocat/crash")));

    // The last command only runs after every dependency resolved.
    let invocations = runner.invocations();
    assert_eq!(invocations.last().map(String::as_str), Some("git checkout -b octocat/crash origin/main"));
    assert_eq!(invocations.len(), 5);
}

#[tokio::test]
async fn test_issue_outputs() {
    let (engine, runner) = workflow_engine();
    let params = Params::new().with("number", 42);

    assert_eq!(
        engine.resolve("title", params.clone()).await.unwrap(),
        Value::from("Crash on empty config")
    );
    assert_eq!(engine.resolve("state", params.clone()).await.unwrap(), Value::from("OPEN"));
    assert_eq!(engine.resolve("number", params).await.unwrap(), Value::Int(42));
    assert_eq!(runner.count(ISSUE_COMMAND), 1);
}

#[tokio::test]
async fn test_snapshot_survives_serialization() {
    let (engine, _runner) = workflow_engine();
    engine.resolve("start_branch", Params::new()).await.unwrap();
    engine.resolve("issue", Params::new().with("number", 42)).await.unwrap();

    let json = serde_json::to_string_pretty(&engine.snapshot()).unwrap();
    let snapshot: CacheSnapshot = serde_json::from_str(&json).unwrap();

    let runner = workflow_runner();
    let restored = Engine::new(runner.clone());
    restored.register_all(workflow_specs()).unwrap();
    assert!(restored.restore(snapshot) > 0);

    assert_eq!(
        restored.resolve("title", Params::new().with("number", 42)).await.unwrap(),
        Value::from("Crash on empty config")
    );
    restored.resolve("start_branch", Params::new()).await.unwrap();
    assert_eq!(runner.total(), 0, "every value came from the snapshot");
}
