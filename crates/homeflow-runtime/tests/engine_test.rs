mod common;

use common::{create_engine, create_engine_with, ctx, mock, test_config};
use homeflow_core::{FlowDesc, FlowError, FunctionArguments, OperatorIO, StepDesc, ValidationError};
use homeflow_runtime::storage::EMBEDDED_SOURCE;
use homeflow_runtime::{EngineConfig, FlowEngine};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn stored_config(dir: &std::path::Path) -> EngineConfig {
    EngineConfig {
        flows_dir: Some(dir.to_path_buf()),
        ..test_config()
    }
}

#[tokio::test]
async fn test_invalid_flow_is_rejected_without_changes() {
    let (engine, _) = create_engine();
    let desc = FlowDesc::new(vec![StepDesc::new("unknown", "x")]);

    let err = engine.add_flow(&ctx(), "broken", desc, false).await.unwrap_err();

    assert!(matches!(
        err,
        FlowError::Validation(ValidationError::UnknownOperator { .. })
    ));
    assert!(engine.flow_desc("broken").is_none());
}

#[tokio::test]
async fn test_existing_flow_needs_overwrite() {
    let (engine, _) = create_engine();
    let first = FlowDesc::new(vec![mock("echo").with_arg("output", "one")]);
    let second = FlowDesc::new(vec![mock("echo").with_arg("output", "two")]);

    engine.add_flow(&ctx(), "f", first, false).await.unwrap();
    let err = engine.add_flow(&ctx(), "f", second.clone(), false).await.unwrap_err();
    assert!(matches!(err, FlowError::AlreadyExists(ref id) if id == "f"));
    assert_eq!(err.status_code(), 409);

    engine.add_flow(&ctx(), "f", second, true).await.unwrap();
    let output = engine
        .execute_flow(&ctx(), "f", FunctionArguments::new(), OperatorIO::empty())
        .await;
    assert_eq!(output, OperatorIO::plain("two"));
}

#[tokio::test]
async fn test_rejected_add_leaves_file_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let engine = FlowEngine::new(stored_config(dir.path()), CancellationToken::new()).unwrap();
    let path = dir.path().join("f.json");
    let first = FlowDesc::new(vec![StepDesc::new("system", "echo").with_arg("output", "one")]);
    let second = FlowDesc::new(vec![StepDesc::new("system", "echo").with_arg("output", "two")]);

    engine.add_flow(&ctx(), "f", first, false).await.unwrap();
    let original = std::fs::read_to_string(&path).unwrap();
    assert!(original.contains("\"one\""));

    let err = engine.add_flow(&ctx(), "f", second.clone(), false).await.unwrap_err();
    assert!(matches!(err, FlowError::AlreadyExists(_)));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), original);

    engine.add_flow(&ctx(), "f", second, true).await.unwrap();
    let replaced = std::fs::read_to_string(&path).unwrap();
    assert!(replaced.contains("\"two\""));
    assert!(!replaced.contains("\"one\""));
    let output = engine
        .execute_flow(&ctx(), "f", FunctionArguments::new(), OperatorIO::empty())
        .await;
    assert_eq!(output, OperatorIO::plain("two"));
}

#[tokio::test]
async fn test_flow_ids_must_be_usable_as_file_names() {
    let (engine, _) = create_engine();
    for id in ["", "a/b", "a\\b", ".", "..", "_"] {
        let err = engine
            .add_flow(&ctx(), id, FlowDesc::new(vec![mock("echo")]), false)
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::InvalidFlowId(_)), "{:?}", id);
    }
}

#[tokio::test]
async fn test_flows_are_persisted_and_reloaded() {
    let dir = tempfile::tempdir().unwrap();
    let desc = FlowDesc::new(vec![StepDesc::new("system", "echo").with_arg("output", "saved")])
        .with_tags(["room:kitchen"]);

    {
        let engine = FlowEngine::new(stored_config(dir.path()), CancellationToken::new()).unwrap();
        engine.add_flow(&ctx(), "kitchen", desc, false).await.unwrap();
        engine
            .add_ephemeral_flow(&ctx(), "scratch", FlowDesc::new(vec![StepDesc::new("system", "noop")]), false)
            .await
            .unwrap();
    }
    assert!(dir.path().join("kitchen.json").exists());
    assert!(!dir.path().join("scratch.json").exists());

    let engine = FlowEngine::new(stored_config(dir.path()), CancellationToken::new()).unwrap();
    let loaded = engine.flow_desc("kitchen").expect("flow survives restart");
    assert_eq!(loaded.id, "kitchen");
    assert_eq!(loaded.tags, vec!["room:kitchen"]);
    assert!(engine.flow_desc("scratch").is_none());

    let output = engine
        .execute_flow(&ctx(), "kitchen", FunctionArguments::new(), OperatorIO::empty())
        .await;
    assert_eq!(output, OperatorIO::plain("saved"));
}

#[tokio::test]
async fn test_delete_removes_flow_and_file() {
    let dir = tempfile::tempdir().unwrap();
    let engine = FlowEngine::new(stored_config(dir.path()), CancellationToken::new()).unwrap();
    engine
        .add_flow(&ctx(), "gone", FlowDesc::new(vec![StepDesc::new("system", "noop")]), false)
        .await
        .unwrap();

    let removed = engine.delete_flow(&ctx(), "gone").await.unwrap();
    assert_eq!(removed.id, "gone");
    assert!(engine.flow_desc("gone").is_none());
    assert!(!dir.path().join("gone.json").exists());

    let err = engine.delete_flow(&ctx(), "gone").await.unwrap_err();
    assert!(matches!(err, FlowError::FlowNotFound(_)));
}

#[tokio::test]
async fn test_embedded_ping_flow() {
    let engine = FlowEngine::new(EngineConfig::default(), CancellationToken::new()).unwrap();

    let desc = engine.flow_desc("ping").expect("ping is embedded");
    assert_eq!(desc.source, EMBEDDED_SOURCE);

    let output = engine
        .execute_flow(&ctx(), "ping", FunctionArguments::new(), OperatorIO::empty())
        .await;
    assert_eq!(output, OperatorIO::plain("pong"));

    let err = engine
        .add_flow(&ctx(), "ping", FlowDesc::new(vec![StepDesc::new("system", "noop")]), false)
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::AlreadyExists(_)));
}

#[tokio::test]
async fn test_stored_flow_does_not_replace_embedded_flow() {
    let dir = tempfile::tempdir().unwrap();
    let custom = FlowDesc::new(vec![StepDesc::new("system", "echo").with_arg("output", "hijacked")]);
    std::fs::write(
        dir.path().join("ping.json"),
        serde_json::to_string(&custom).unwrap(),
    )
    .unwrap();

    let config = EngineConfig {
        flows_dir: Some(dir.path().to_path_buf()),
        ..EngineConfig::default()
    };
    let engine = FlowEngine::new(config, CancellationToken::new()).unwrap();

    assert_eq!(engine.flow_desc("ping").unwrap().source, EMBEDDED_SOURCE);
    let output = engine
        .execute_flow(&ctx(), "ping", FunctionArguments::new(), OperatorIO::empty())
        .await;
    assert_eq!(output, OperatorIO::plain("pong"));

    let forced = FlowDesc::new(vec![StepDesc::new("system", "echo").with_arg("output", "forced")]);
    engine.add_flow(&ctx(), "ping", forced, true).await.unwrap();
    let output = engine
        .execute_flow(&ctx(), "ping", FunctionArguments::new(), OperatorIO::empty())
        .await;
    assert_eq!(output, OperatorIO::plain("forced"));
}

#[tokio::test]
async fn test_check_flow_reports_problems() {
    let (engine, _) = create_engine();
    engine
        .add_flow(&ctx(), "fine", FlowDesc::new(vec![mock("echo")]), false)
        .await
        .unwrap();

    assert!(engine.check_flow("fine").is_empty());

    let missing = engine.check_flow("absent");
    assert_eq!(missing.status_code(), 404);

    let desc = FlowDesc::new(vec![mock("echo").with_input_from("later"), mock("echo").with_name("later")]);
    let err = engine.check_flow_desc(&desc, "draft").unwrap_err();
    assert_eq!(
        err.to_string(),
        "Step \"#0\" references unknown inputFrom \"later\""
    );
}

#[tokio::test]
async fn test_operator_names_are_case_insensitive() {
    let (engine, _) = create_engine();
    assert!(engine.has_operator("MOCK"));
    assert!(engine.has_operator("System"));
    assert_eq!(
        engine.operator_names(),
        vec!["flow", "flowbytag", "mock", "system"]
    );
}

#[tokio::test]
async fn test_system_reload_and_shutdown_signal_owner() {
    let token = CancellationToken::new();
    let engine = FlowEngine::new(test_config(), token.clone()).unwrap();

    engine
        .execute_operator(&ctx(), "system", "reload", FunctionArguments::new(), OperatorIO::empty())
        .await;
    assert!(token.is_cancelled());
    assert!(engine.reload_requested());

    let token = CancellationToken::new();
    let engine = FlowEngine::new(test_config(), token.clone()).unwrap();
    engine
        .execute_operator(&ctx(), "system", "shutdown", FunctionArguments::new(), OperatorIO::empty())
        .await;
    assert!(token.is_cancelled());
    assert!(!engine.reload_requested());
}

#[tokio::test]
async fn test_system_functions() {
    let (engine, _) = create_engine();
    engine
        .add_flow(&ctx(), "lamp", FlowDesc::new(vec![mock("echo")]).with_tags(["light"]), false)
        .await
        .unwrap();

    let call = |function: &'static str, args: FunctionArguments, input: OperatorIO| {
        let engine: Arc<FlowEngine> = engine.clone();
        async move {
            engine
                .execute_operator(&ctx(), "system", function, args, input)
                .await
        }
    };

    let desc = call("getFlow", FunctionArguments::single("name", "lamp"), OperatorIO::empty()).await;
    assert!(desc.is_object());
    assert_eq!(desc.to_json()["tags"][0], "light");

    let missing = call("getFlow", FunctionArguments::single("name", "nope"), OperatorIO::empty()).await;
    assert_eq!(missing.status_code(), 404);

    let no_arg = call("getFlow", FunctionArguments::new(), OperatorIO::empty()).await;
    assert_eq!(no_arg.status_code(), 400);

    let by_tag = call("getFlowDescByTag", FunctionArguments::single("tag", "light"), OperatorIO::empty()).await;
    assert!(by_tag.to_json().get("lamp").is_some());

    let none = call("getFlowDescByTag", FunctionArguments::single("tag", "heating"), OperatorIO::empty()).await;
    assert_eq!(none, OperatorIO::error(404, "No flows with tags heating"));

    let failed = call("fail", FunctionArguments::new(), OperatorIO::empty()).await;
    assert_eq!(failed, OperatorIO::error(500, "Fail requested"));

    let no_input = call("hasInput", FunctionArguments::new(), OperatorIO::empty()).await;
    assert_eq!(no_input, OperatorIO::error(400, "Expected input"));

    let passed = call("hasInput", FunctionArguments::new(), OperatorIO::plain("x")).await;
    assert_eq!(passed, OperatorIO::plain("x"));

    let unknown = call("frobnicate", FunctionArguments::new(), OperatorIO::empty()).await;
    assert_eq!(unknown, OperatorIO::error(400, "Unknown function: frobnicate"));

    let deleted = call("deleteFlow", FunctionArguments::single("name", "lamp"), OperatorIO::empty()).await;
    assert!(deleted.is_object());
    assert!(engine.flow_desc("lamp").is_none());
}

#[tokio::test]
async fn test_reset_alert_through_system_operator() {
    let (engine, _) = create_engine();
    let desc = FlowDesc::new(vec![mock("panic")]);
    engine
        .execute_ad_hoc_flow(&ctx(), "f", desc, FunctionArguments::new(), OperatorIO::empty())
        .await;
    assert_eq!(engine.metrics().active_alerts, 1);

    let args: FunctionArguments = [("name", "operatorPanic.mock.panic"), ("category", "system")]
        .into_iter()
        .collect();
    engine
        .execute_operator(&ctx(), "system", "resetAlert", args, OperatorIO::empty())
        .await;

    assert!(engine.alerts().active().is_empty());
}

#[tokio::test]
async fn test_config_from_file_keeps_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("homeflow.json");
    std::fs::write(&path, r#"{"operation_timeout_secs": 5, "load_embedded_flows": false}"#).unwrap();

    let config = EngineConfig::from_file(&path).unwrap();

    assert_eq!(config.operation_timeout().as_secs(), 5);
    assert!(!config.load_embedded_flows);
    assert_eq!(config.flow_timeout_secs, EngineConfig::default().flow_timeout_secs);
}

#[tokio::test]
async fn test_engine_without_flows_dir_keeps_flows_in_memory() {
    let (engine, _) = create_engine_with(test_config());
    engine
        .add_flow(&ctx(), "mem", FlowDesc::new(vec![mock("echo")]), false)
        .await
        .unwrap();
    assert_eq!(engine.metrics().flows, 1);
}
