use crate::{Context, FunctionArguments, HookError, OperatorIO, StepDesc, SystemAlert};
use async_trait::async_trait;

pub type HookResult = Result<(), HookError>;

/// An observer registered with the engine.
///
/// A hook advertises which capability sets it implements by overriding the
/// matching `as_*` accessor.
pub trait Hook: Send + Sync {
    fn name(&self) -> &str;

    fn as_execution_hook(&self) -> Option<&dyn ExecutionHook> {
        None
    }

    fn as_flow_changed_hook(&self) -> Option<&dyn FlowChangedHook> {
        None
    }

    fn as_alert_hook(&self) -> Option<&dyn AlertHook> {
        None
    }
}

#[async_trait]
pub trait ExecutionHook: Send + Sync {
    /// Before a flow begins
    async fn on_execute(
        &self,
        _ctx: &Context,
        _flow_id: &str,
        _main_args: &FunctionArguments,
        _main_input: &OperatorIO,
    ) -> HookResult {
        Ok(())
    }

    /// After each step, whether it ran, was skipped, or failed
    async fn on_execute_operation(
        &self,
        _ctx: &Context,
        _input: &OperatorIO,
        _output: &OperatorIO,
        _flow_id: &str,
        _step: &StepDesc,
    ) -> HookResult {
        Ok(())
    }

    /// After a flow ended
    async fn on_execution_finished(
        &self,
        _ctx: &Context,
        _flow_id: &str,
        _main_args: &FunctionArguments,
        _main_input: &OperatorIO,
    ) -> HookResult {
        Ok(())
    }
}

#[async_trait]
pub trait FlowChangedHook: Send + Sync {
    async fn on_flow_changed(&self, ctx: &Context, added: &[String], removed: &[String]) -> HookResult;
}

#[async_trait]
pub trait AlertHook: Send + Sync {
    async fn on_system_alert(&self, ctx: &Context, alert: &SystemAlert) -> HookResult;

    async fn on_reset_system_alert(&self, ctx: &Context, name: &str, category: &str) -> HookResult;
}
