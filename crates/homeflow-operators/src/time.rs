use async_trait::async_trait;
use chrono::Utc;
use homeflow_core::status::{BAD_REQUEST, SERVICE_UNAVAILABLE};
use homeflow_core::{parse_duration, Context, FunctionArguments, Operator, OperatorIO};
use std::collections::BTreeMap;
use std::fmt::Write;
use std::time::Duration;

const DEFAULT_SLEEP: Duration = Duration::from_secs(1);

/// Delays and clock readings
pub struct OpTime;

impl OpTime {
    /// Waits for `duration` (default 1s) and passes the input through.
    /// Returns early when the step is cancelled.
    async fn sleep(&self, ctx: &Context, args: &FunctionArguments, input: OperatorIO) -> OperatorIO {
        let delay = match args.get("duration") {
            Some(text) => match parse_duration(text) {
                Ok(d) => d,
                Err(e) => return OperatorIO::error(BAD_REQUEST, e.to_string()),
            },
            None => DEFAULT_SLEEP,
        };

        tracing::debug!("Sleeping for {:?}", delay);
        tokio::select! {
            _ = ctx.cancellation().cancelled() => {
                OperatorIO::error(SERVICE_UNAVAILABLE, "Sleep cancelled")
            }
            _ = tokio::time::sleep(delay) => input,
        }
    }
}

#[async_trait]
impl Operator for OpTime {
    fn name(&self) -> &str {
        "time"
    }

    async fn execute(
        &self,
        ctx: &Context,
        function: &str,
        args: FunctionArguments,
        input: OperatorIO,
    ) -> OperatorIO {
        match function.to_lowercase().as_str() {
            "sleep" => self.sleep(ctx, &args, input).await,
            "now" => {
                let now = Utc::now();
                let Some(format) = args.get("format") else {
                    return OperatorIO::plain(now.to_rfc3339());
                };
                let mut text = String::new();
                match write!(text, "{}", now.format(format)) {
                    Ok(()) => OperatorIO::plain(text),
                    Err(_) => OperatorIO::error(BAD_REQUEST, format!("Invalid time format \"{}\"", format)),
                }
            }
            "unix" => OperatorIO::integer(Utc::now().timestamp()),
            _ => OperatorIO::error(BAD_REQUEST, format!("Unknown function: {}", function)),
        }
    }

    fn functions(&self) -> Vec<String> {
        ["sleep", "now", "unix"].iter().map(|f| f.to_string()).collect()
    }

    fn possible_args(&self, function: &str) -> Vec<String> {
        match function.to_lowercase().as_str() {
            "sleep" => vec!["duration".to_string()],
            "now" => vec!["format".to_string()],
            _ => Vec::new(),
        }
    }

    fn arg_suggestions(
        &self,
        function: &str,
        arg: &str,
        _other_args: &FunctionArguments,
    ) -> BTreeMap<String, String> {
        let suggestions: &[(&str, &str)] = match (function.to_lowercase().as_str(), arg) {
            ("sleep", "duration") => &[("1 second", "1s"), ("10 seconds", "10s"), ("1 minute", "1m")],
            ("now", "format") => &[("Date", "%Y-%m-%d"), ("Time", "%H:%M:%S")],
            _ => &[],
        };
        suggestions
            .iter()
            .map(|(label, value)| (label.to_string(), value.to_string()))
            .collect()
    }
}
