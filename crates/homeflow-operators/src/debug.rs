use async_trait::async_trait;
use homeflow_core::status::BAD_REQUEST;
use homeflow_core::{Context, FunctionArguments, Operator, OperatorIO};
use serde_json::json;

/// Logs and inspects whatever flows through it
pub struct OpDebug;

#[async_trait]
impl Operator for OpDebug {
    fn name(&self) -> &str {
        "debug"
    }

    async fn execute(
        &self,
        ctx: &Context,
        function: &str,
        args: FunctionArguments,
        input: OperatorIO,
    ) -> OperatorIO {
        match function.to_lowercase().as_str() {
            "log" => {
                let message = args.get_or("message", "(no message)");
                tracing::info!(
                    flow = ctx.flow().unwrap_or(""),
                    step = ctx.step().unwrap_or(""),
                    "DEBUG: {}",
                    message
                );
                for (key, values) in args.iter() {
                    tracing::info!("  {}: {:?}", key, values);
                }
                tracing::info!("  input: {}", input);
                input
            }
            "inspect" => OperatorIO::object(json!({
                "kind": input.kind(),
                "status": input.status_code(),
                "contentType": input.content_type(),
                "arguments": args.joined_map(),
                "input": input.to_json(),
                "flow": ctx.flow(),
                "step": ctx.step(),
                "nesting": ctx.nesting(),
            })),
            _ => OperatorIO::error(BAD_REQUEST, format!("Unknown function: {}", function)),
        }
    }

    fn functions(&self) -> Vec<String> {
        vec!["log".to_string(), "inspect".to_string()]
    }

    fn possible_args(&self, function: &str) -> Vec<String> {
        match function.to_lowercase().as_str() {
            "log" => vec!["message".to_string()],
            _ => Vec::new(),
        }
    }
}
