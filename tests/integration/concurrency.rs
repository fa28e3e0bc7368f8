use futures::future::join_all;
use ghflow::core::{Params, Value, ValueType};
use ghflow::engine::Engine;
use ghflow::spec::CommandSpec;
use ghflow::test_utils::{ScriptedRunner, init_test_logging};
use std::time::Duration;

fn delayed_engine() -> (Engine, ScriptedRunner) {
    init_test_logging(None);
    let runner = ScriptedRunner::new().with_delay(Duration::from_millis(30));
    (Engine::new(runner.clone()), runner)
}

#[tokio::test]
async fn test_many_callers_one_run() {
    let (engine, runner) = delayed_engine();
    engine.register(CommandSpec::builder("A", "echo A").build().unwrap()).unwrap();
    engine.register(CommandSpec::builder("B", "echo {A}-B").depends_on("A").build().unwrap()).unwrap();

    let results = join_all((0..16).map(|i| {
        let engine = engine.clone();
        let name = if i % 2 == 0 { "A" } else { "B" };
        async move { engine.resolve(name, Params::new()).await }
    }))
    .await;

    for (i, result) in results.into_iter().enumerate() {
        let expected = if i % 2 == 0 { "A" } else { "A-B" };
        assert_eq!(result.unwrap(), Value::from(expected));
    }
    assert_eq!(runner.count("echo A"), 1);
    assert_eq!(runner.count("echo A-B"), 1);
}

#[tokio::test]
async fn test_spawned_tasks_share_the_engine() {
    let (engine, runner) = delayed_engine();
    engine
        .register(CommandSpec::builder("C", "echo {n}").parameter("n", ValueType::Int).build().unwrap())
        .unwrap();

    let handles: Vec<_> = (0..12_i64)
        .map(|i| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.resolve("C", Params::new().with("n", i % 3)).await })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let value = handle.await.unwrap().unwrap();
        assert_eq!(value, Value::from((i % 3).to_string()));
    }
    assert_eq!(runner.total(), 3, "one run per binding");
}

#[tokio::test]
async fn test_bindings_do_not_serialize() {
    let (engine, runner) = delayed_engine();
    engine
        .register(CommandSpec::builder("C", "echo {n}").parameter("n", ValueType::Int).build().unwrap())
        .unwrap();

    join_all((0..4_i64).map(|i| engine.resolve("C", Params::new().with("n", i)))).await;
    assert_eq!(runner.total(), 4);
    assert_eq!(runner.peak_concurrency(), 4);
}
