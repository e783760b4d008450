mod common;

use common::{create_engine, ctx, mock};
use homeflow_core::{FlowDesc, FunctionArguments, OperatorIO, StepDesc};
use homeflow_runtime::FlowEngine;
use std::sync::Arc;

async fn add(engine: &Arc<FlowEngine>, id: &str, output: &str, tags: &[&str]) {
    let desc = FlowDesc::new(vec![mock("echo").with_arg("output", output)])
        .with_tags(tags.iter().copied());
    engine.add_flow(&ctx(), id, desc, false).await.unwrap();
}

async fn house() -> Arc<FlowEngine> {
    let (engine, _) = create_engine();
    add(&engine, "kitchenLight", "kitchen on", &["light", "room:kitchen"]).await;
    add(&engine, "hallLight", "hall on", &["light", "room:hall"]).await;
    add(&engine, "heating", "warm", &["climate", "room:kitchen"]).await;
    engine
}

#[tokio::test]
async fn test_single_match_runs_the_flow_directly() {
    let engine = house().await;

    let output = engine
        .execute_flow_by_tags(&ctx(), &["light", "room:kitchen"], FunctionArguments::new(), OperatorIO::empty())
        .await;

    assert_eq!(output, OperatorIO::plain("kitchen on"));
}

#[tokio::test]
async fn test_several_matches_return_outputs_by_flow_id() {
    let engine = house().await;

    let output = engine
        .execute_flow_by_tags(&ctx(), &["light"], FunctionArguments::new(), OperatorIO::empty())
        .await;

    let outputs = output.as_outputs().expect("composite flows return a map");
    assert_eq!(outputs["kitchenLight"], OperatorIO::plain("kitchen on"));
    assert_eq!(outputs["hallLight"], OperatorIO::plain("hall on"));
    assert!(!outputs.contains_key("heating"));
}

#[tokio::test]
async fn test_tag_groups_combine_or_within_and_across() {
    let engine = house().await;
    let groups = vec![
        vec!["light".to_string(), "climate".to_string()],
        vec!["room:kitchen".to_string()],
    ];

    let output = engine
        .execute_flow_by_tag_groups(&ctx(), &groups, FunctionArguments::new(), OperatorIO::empty())
        .await;

    let outputs = output.as_outputs().unwrap();
    assert_eq!(outputs["kitchenLight"], OperatorIO::plain("kitchen on"));
    assert_eq!(outputs["heating"], OperatorIO::plain("warm"));
    assert!(!outputs.contains_key("hallLight"));
}

#[tokio::test]
async fn test_no_match_and_no_tags() {
    let engine = house().await;

    let none = engine
        .execute_flow_by_tags(&ctx(), &["garage"], FunctionArguments::new(), OperatorIO::empty())
        .await;
    assert_eq!(none.status_code(), 404);

    let empty: [&str; 0] = [];
    let nothing = engine
        .execute_flow_by_tags(&ctx(), &empty, FunctionArguments::new(), OperatorIO::empty())
        .await;
    assert_eq!(nothing, OperatorIO::error(400, "No tags given"));
}

#[tokio::test]
async fn test_tag_keys_match_case_insensitively() {
    let engine = house().await;
    let found = engine.flow_descs_by_tag(&["ROOM:hall"]);
    assert_eq!(found.keys().collect::<Vec<_>>(), vec!["hallLight"]);

    let values_are_exact = engine.flow_descs_by_tag(&["room:HALL"]);
    assert!(values_are_exact.is_empty());
}

#[tokio::test]
async fn test_tag_map_and_values() {
    let engine = house().await;

    let map = engine.tag_map();
    assert_eq!(map["room"], vec!["hall", "kitchen"]);
    assert!(map["light"].is_empty());

    assert_eq!(engine.tag_values("room", &["light"]), vec!["hall", "kitchen"]);
    assert_eq!(engine.tag_values("room", &["climate"]), vec!["kitchen"]);
    let none: [&str; 0] = [];
    assert!(engine.tag_values("", &none).is_empty());

    let tags: Vec<_> = engine.tags().into_iter().collect();
    assert_eq!(tags, vec!["climate", "light", "room:hall", "room:kitchen"]);
}

#[tokio::test]
async fn test_flowbytag_operator_uses_function_and_additional_tags() {
    let engine = house().await;
    let desc = FlowDesc::new(vec![
        StepDesc::new("flowbytag", "light").with_arg("additionalTags", "room:hall")
    ]);

    let output = engine
        .execute_ad_hoc_flow(&ctx(), "caller", desc, FunctionArguments::new(), OperatorIO::empty())
        .await;

    assert_eq!(output, OperatorIO::plain("hall on"));
}
