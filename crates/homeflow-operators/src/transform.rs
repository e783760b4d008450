use async_trait::async_trait;
use homeflow_core::status::{BAD_REQUEST, NOT_FOUND};
use homeflow_core::{Context, FunctionArguments, Operator, OperatorIO};
use serde_json::Value;

/// JSON conversions of the step input
pub struct OpJson;

/// Walks a dotted path; numeric segments index into arrays
fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .filter(|segment| !segment.is_empty())
        .try_fold(value, |current, segment| match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
}

fn parse(input: &OperatorIO) -> Result<Value, OperatorIO> {
    if input.is_object() {
        return Ok(input.to_json());
    }
    serde_json::from_str(&input.get_string())
        .map_err(|e| OperatorIO::error(BAD_REQUEST, format!("JSON parse error: {}", e)))
}

#[async_trait]
impl Operator for OpJson {
    fn name(&self) -> &str {
        "json"
    }

    async fn execute(
        &self,
        _ctx: &Context,
        function: &str,
        args: FunctionArguments,
        input: OperatorIO,
    ) -> OperatorIO {
        match function.to_lowercase().as_str() {
            "parse" => match parse(&input) {
                Ok(value) => OperatorIO::object(value),
                Err(e) => e,
            },
            "stringify" => {
                let value = input.to_json();
                let text = if args.get("pretty").is_some_and(|p| p == "true") {
                    serde_json::to_string_pretty(&value)
                } else {
                    serde_json::to_string(&value)
                };
                match text {
                    Ok(text) => OperatorIO::plain(text).with_content_type("application/json"),
                    Err(e) => OperatorIO::error(BAD_REQUEST, format!("JSON stringify error: {}", e)),
                }
            }
            "get" => {
                let Some(path) = args.get("path") else {
                    return OperatorIO::error(BAD_REQUEST, "Missing argument \"path\"");
                };
                let value = match parse(&input) {
                    Ok(value) => value,
                    Err(e) => return e,
                };
                match lookup(&value, path) {
                    Some(Value::String(s)) => OperatorIO::plain(s.clone()),
                    Some(found) => OperatorIO::object(found.clone()),
                    None => OperatorIO::error(NOT_FOUND, format!("Path \"{}\" not found", path)),
                }
            }
            "build" => OperatorIO::object_from(&args.joined_map()),
            _ => OperatorIO::error(BAD_REQUEST, format!("Unknown function: {}", function)),
        }
    }

    fn functions(&self) -> Vec<String> {
        ["parse", "stringify", "get", "build"]
            .iter()
            .map(|f| f.to_string())
            .collect()
    }

    fn possible_args(&self, function: &str) -> Vec<String> {
        match function.to_lowercase().as_str() {
            "stringify" => vec!["pretty".to_string()],
            "get" => vec!["path".to_string()],
            _ => Vec::new(),
        }
    }
}
