use super::{EventBus, ExecutionEvent};
use crate::hook::{AlertHook, ExecutionHook, FlowChangedHook, Hook, HookResult};
use crate::{Context, FunctionArguments, OperatorIO, StepDesc, SystemAlert};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

pub const EVENT_HOOK_NAME: &str = "events";

/// Hook that republishes every engine notification on an [`EventBus`]
pub struct EventBusHook {
    bus: Arc<EventBus>,
}

impl EventBusHook {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self { bus }
    }
}

impl Hook for EventBusHook {
    fn name(&self) -> &str {
        EVENT_HOOK_NAME
    }

    fn as_execution_hook(&self) -> Option<&dyn ExecutionHook> {
        Some(self)
    }

    fn as_flow_changed_hook(&self) -> Option<&dyn FlowChangedHook> {
        Some(self)
    }

    fn as_alert_hook(&self) -> Option<&dyn AlertHook> {
        Some(self)
    }
}

#[async_trait]
impl ExecutionHook for EventBusHook {
    async fn on_execute(
        &self,
        ctx: &Context,
        flow_id: &str,
        _main_args: &FunctionArguments,
        _main_input: &OperatorIO,
    ) -> HookResult {
        self.bus.emit(ExecutionEvent::FlowStarted {
            execution_id: ctx.id(),
            flow_id: flow_id.to_string(),
            timestamp: Utc::now(),
        });
        Ok(())
    }

    async fn on_execute_operation(
        &self,
        ctx: &Context,
        _input: &OperatorIO,
        output: &OperatorIO,
        flow_id: &str,
        step: &StepDesc,
    ) -> HookResult {
        self.bus.emit(ExecutionEvent::StepFinished {
            execution_id: ctx.id(),
            flow_id: flow_id.to_string(),
            step: step.name.clone(),
            operator: step.operator.clone(),
            function: step.function.clone(),
            status: output.status_code(),
            output_kind: output.kind().to_string(),
            error: output.error_message().map(str::to_string),
            timestamp: Utc::now(),
        });
        Ok(())
    }

    async fn on_execution_finished(
        &self,
        ctx: &Context,
        flow_id: &str,
        _main_args: &FunctionArguments,
        _main_input: &OperatorIO,
    ) -> HookResult {
        self.bus.emit(ExecutionEvent::FlowFinished {
            execution_id: ctx.id(),
            flow_id: flow_id.to_string(),
            timestamp: Utc::now(),
        });
        Ok(())
    }
}

#[async_trait]
impl FlowChangedHook for EventBusHook {
    async fn on_flow_changed(&self, _ctx: &Context, added: &[String], removed: &[String]) -> HookResult {
        self.bus.emit(ExecutionEvent::FlowsChanged {
            added: added.to_vec(),
            removed: removed.to_vec(),
            timestamp: Utc::now(),
        });
        Ok(())
    }
}

#[async_trait]
impl AlertHook for EventBusHook {
    async fn on_system_alert(&self, _ctx: &Context, alert: &SystemAlert) -> HookResult {
        self.bus.emit(ExecutionEvent::AlertRaised {
            name: alert.name.clone(),
            category: alert.category.clone(),
            severity: alert.severity,
            message: alert.message.clone(),
            timestamp: Utc::now(),
        });
        Ok(())
    }

    async fn on_reset_system_alert(&self, _ctx: &Context, name: &str, category: &str) -> HookResult {
        self.bus.emit(ExecutionEvent::AlertReset {
            name: name.to_string(),
            category: category.to_string(),
            timestamp: Utc::now(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn forwards_step_results_to_subscribers() {
        let bus = Arc::new(EventBus::new(16));
        let mut rx = bus.subscribe();
        let hook = EventBusHook::new(bus.clone());
        let step = StepDesc::new("system", "fail").with_name("s1");

        hook.on_execute_operation(
            &Context::new("test"),
            &OperatorIO::empty(),
            &OperatorIO::error(500, "Fail requested"),
            "flow",
            &step,
        )
        .await
        .unwrap();

        match rx.recv().await.unwrap() {
            ExecutionEvent::StepFinished { step, status, error, .. } => {
                assert_eq!(step, "s1");
                assert_eq!(status, 500);
                assert_eq!(error.as_deref(), Some("Fail requested"));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
