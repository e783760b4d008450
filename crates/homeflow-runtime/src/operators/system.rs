use super::engine_gone;
use crate::engine::FlowEngine;
use async_trait::async_trait;
use homeflow_core::status::{BAD_REQUEST, INTERNAL_SERVER_ERROR, NOT_FOUND};
use homeflow_core::{Context, FunctionArguments, Operator, OperatorIO};
use std::collections::BTreeMap;
use std::sync::Weak;

const FUNCTIONS: &[&str] = &[
    "shutdown",
    "reload",
    "getFlow",
    "deleteFlow",
    "getFlowDescByTag",
    "metrics",
    "alerts",
    "resetAlert",
    "noop",
    "fail",
    "echo",
    "hasInput",
    "version",
];

/// Engine administration and a few utility functions
pub struct OpSystem {
    engine: Weak<FlowEngine>,
}

impl OpSystem {
    pub fn new(engine: Weak<FlowEngine>) -> Self {
        Self { engine }
    }
}

fn missing_argument(name: &str) -> OperatorIO {
    OperatorIO::error(BAD_REQUEST, format!("Missing argument \"{}\"", name))
}

#[async_trait]
impl Operator for OpSystem {
    fn name(&self) -> &str {
        "system"
    }

    async fn execute(
        &self,
        ctx: &Context,
        function: &str,
        args: FunctionArguments,
        input: OperatorIO,
    ) -> OperatorIO {
        let Some(engine) = self.engine.upgrade() else {
            return engine_gone();
        };

        match function.to_lowercase().as_str() {
            "stop" | "shutdown" => {
                engine.request_shutdown();
                OperatorIO::empty()
            }
            "reload" => {
                engine.request_reload();
                OperatorIO::empty()
            }
            "getflow" | "getflowdesc" => {
                let Some(name) = args.get("name") else {
                    return missing_argument("name");
                };
                match engine.flow_desc(name) {
                    Some(desc) => OperatorIO::object_from(&desc),
                    None => OperatorIO::error(NOT_FOUND, format!("No flow with name \"{}\" found", name)),
                }
            }
            "deleteflow" => {
                let Some(name) = args.get("name") else {
                    return missing_argument("name");
                };
                match engine.delete_flow(ctx, name).await {
                    Ok(desc) => OperatorIO::object_from(&desc),
                    Err(e) => OperatorIO::from_error(&e),
                }
            }
            "getflowdescbytag" => {
                let mut tags: Vec<String> = args
                    .get_joined("tags")
                    .map(|t| {
                        t.split(',')
                            .filter(|s| !s.is_empty())
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default();
                if let Some(tag) = args.get("tag").filter(|t| !t.is_empty()) {
                    tags.push(tag.to_string());
                }
                let flows = engine.flow_descs_by_tag(&tags);
                if flows.is_empty() {
                    return OperatorIO::error(NOT_FOUND, format!("No flows with tags {}", tags.join(",")));
                }
                OperatorIO::object_from(&flows)
            }
            "metrics" => OperatorIO::object_from(&engine.metrics()),
            "alerts" => OperatorIO::object_from(&engine.alerts().active()),
            "resetalert" => {
                let Some(name) = args.get("name") else {
                    return missing_argument("name");
                };
                engine
                    .reset_system_alert(ctx, name, args.get_or("category", ""))
                    .await;
                OperatorIO::empty()
            }
            "noop" => OperatorIO::empty(),
            "fail" => OperatorIO::error(INTERNAL_SERVER_ERROR, "Fail requested"),
            "echo" => match args.get("output") {
                Some(output) => OperatorIO::plain(output),
                None => input,
            },
            "hasinput" => {
                if input.is_empty() {
                    OperatorIO::error(BAD_REQUEST, "Expected input")
                } else {
                    input
                }
            }
            "version" => OperatorIO::plain(env!("CARGO_PKG_VERSION")),
            _ => OperatorIO::error(BAD_REQUEST, format!("Unknown function: {}", function)),
        }
    }

    fn functions(&self) -> Vec<String> {
        FUNCTIONS.iter().map(|f| f.to_string()).collect()
    }

    fn possible_args(&self, function: &str) -> Vec<String> {
        let args: &[&str] = match function.to_lowercase().as_str() {
            "getflow" | "getflowdesc" | "deleteflow" => &["name"],
            "getflowdescbytag" => &["tags", "tag"],
            "resetalert" => &["name", "category"],
            "echo" => &["output"],
            _ => &[],
        };
        args.iter().map(|a| a.to_string()).collect()
    }

    fn arg_suggestions(
        &self,
        function: &str,
        arg: &str,
        _other_args: &FunctionArguments,
    ) -> BTreeMap<String, String> {
        let Some(engine) = self.engine.upgrade() else {
            return BTreeMap::new();
        };
        let function = function.to_lowercase();
        match (function.as_str(), arg) {
            ("resetalert", "name") => engine
                .alerts()
                .active()
                .into_iter()
                .map(|a| (a.name.clone(), a.name))
                .collect(),
            ("resetalert", "category") => engine
                .alerts()
                .active()
                .into_iter()
                .map(|a| (a.category.clone(), a.category))
                .collect(),
            (_, "name") => engine
                .all_flow_descs()
                .into_keys()
                .map(|id| (id.clone(), id))
                .collect(),
            ("getflowdescbytag", "tag" | "tags") => {
                engine.tags().into_iter().map(|t| (t.clone(), t)).collect()
            }
            _ => BTreeMap::new(),
        }
    }
}
