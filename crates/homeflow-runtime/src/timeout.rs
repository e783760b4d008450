//! Bounded execution of operator calls and whole flows.
//!
//! A bounded call runs on its own task and races a timer. When the timer
//! wins the task is abandoned: it keeps running detached and its result is
//! discarded. Callers cancel the context token so cooperative operators can
//! stop early.

use futures::FutureExt;
use homeflow_core::{parse_duration, FlowDesc, OperatorIO, SystemAlert, SEVERITY_FAULT};
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

pub const FLOW_TIMEOUT_TAG: &str = "flowTimeout";
pub const OPERATION_TIMEOUT_TAG: &str = "operationTimeout";

/// How long timeout alerts stay active
pub const TIMEOUT_ALERT_EXPIRY: Duration = Duration::from_secs(5 * 60);

/// Why a bounded call did not produce an output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interrupted {
    TimedOut(Duration),
    Panicked(String),
}

/// Runs `fut` with an upper bound of `limit`. A zero limit runs it inline
/// without a timer; panics are contained either way.
pub async fn run_bounded<F>(limit: Duration, fut: F) -> Result<OperatorIO, Interrupted>
where
    F: Future<Output = OperatorIO> + Send + 'static,
{
    if limit.is_zero() {
        return AssertUnwindSafe(fut)
            .catch_unwind()
            .await
            .map_err(|payload| Interrupted::Panicked(panic_message(payload.as_ref())));
    }

    let handle = tokio::spawn(fut);
    match tokio::time::timeout(limit, handle).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(join_error)) if join_error.is_panic() => Err(Interrupted::Panicked(panic_message(
            join_error.into_panic().as_ref(),
        ))),
        Ok(Err(join_error)) => Err(Interrupted::Panicked(join_error.to_string())),
        Err(_) => Err(Interrupted::TimedOut(limit)),
    }
}

/// Reads a duration tag from the flow, falling back to `default` when it is
/// absent or malformed
pub fn timeout_from_tags(desc: &FlowDesc, tag: &str, default: Duration) -> Duration {
    let value = desc.tag_value(tag);
    if value.is_empty() {
        return default;
    }
    match parse_duration(value) {
        Ok(d) => d,
        Err(e) => {
            tracing::warn!("Ignoring tag {} of flow \"{}\": {}", tag, desc.id, e);
            default
        }
    }
}

pub(crate) fn timeout_alert(name: String, message: String) -> SystemAlert {
    SystemAlert::new(name, "system", SEVERITY_FAULT, message).expires_in(TIMEOUT_ALERT_EXPIRY)
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn times_out_slow_calls() {
        let result = run_bounded(Duration::from_millis(20), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            OperatorIO::empty()
        })
        .await;
        assert_eq!(result, Err(Interrupted::TimedOut(Duration::from_millis(20))));
    }

    #[tokio::test]
    async fn contains_panics_with_and_without_timer() {
        for limit in [Duration::ZERO, Duration::from_secs(1)] {
            let result = run_bounded(limit, async move {
                if limit < Duration::from_secs(10) {
                    panic!("operator exploded");
                }
                OperatorIO::empty()
            })
            .await;
            assert_eq!(result, Err(Interrupted::Panicked("operator exploded".into())));
        }
    }

    #[test]
    fn malformed_tags_fall_back_to_default() {
        let default = Duration::from_secs(60);
        let desc = FlowDesc::default().with_tags(["operationTimeout:soon"]);
        assert_eq!(timeout_from_tags(&desc, OPERATION_TIMEOUT_TAG, default), default);

        let desc = FlowDesc::default().with_tags(["operationTimeout:150ms"]);
        assert_eq!(
            timeout_from_tags(&desc, OPERATION_TIMEOUT_TAG, default),
            Duration::from_millis(150)
        );
        assert_eq!(timeout_from_tags(&desc, FLOW_TIMEOUT_TAG, default), default);
    }
}
