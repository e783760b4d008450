use crate::engine::FlowEngine;
use crate::timeout::panic_message;
use futures::FutureExt;
use homeflow_core::{
    Context, FunctionArguments, Hook, HookError, HookResult, OperatorIO, StepDesc, SystemAlert,
    SEVERITY_HOOK,
};
use std::collections::BTreeMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Registered hooks by name
#[derive(Default)]
pub struct HookRegistry {
    hooks: BTreeMap<String, Arc<dyn Hook>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, hook: Arc<dyn Hook>) -> Option<Arc<dyn Hook>> {
        let name = hook.name().to_string();
        tracing::debug!("Registering hook: {}", name);
        self.hooks.insert(name, hook)
    }

    pub fn remove(&mut self, name: &str) -> Option<Arc<dyn Hook>> {
        self.hooks.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.hooks.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.hooks.keys().cloned().collect()
    }

    /// Copy of the registered hooks, so no lock is held while they run
    pub fn snapshot(&self) -> Vec<Arc<dyn Hook>> {
        self.hooks.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

async fn guarded<F>(call: F) -> HookResult
where
    F: Future<Output = HookResult>,
{
    match AssertUnwindSafe(call).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(HookError::Panicked(panic_message(payload.as_ref()))),
    }
}

impl FlowEngine {
    fn hook_snapshot(&self) -> Vec<Arc<dyn Hook>> {
        self.hooks.read().snapshot()
    }

    async fn report_hook_failure(&self, ctx: &Context, kind: &str, hook: &str, err: HookError) {
        tracing::error!("{} \"{}\" failed: {}", kind, hook, err);
        let alert = SystemAlert::new(format!("{}{}", kind, hook), "system", SEVERITY_HOOK, err.to_string())
            .expires_in(self.config().alert_duration());
        self.set_system_alert(ctx, alert).await;
    }

    pub(crate) async fn fire_on_execute(
        &self,
        ctx: &Context,
        flow_id: &str,
        args: &FunctionArguments,
        input: &OperatorIO,
    ) {
        for hook in self.hook_snapshot() {
            let Some(exec) = hook.as_execution_hook() else {
                continue;
            };
            if let Err(e) = guarded(exec.on_execute(ctx, flow_id, args, input)).await {
                self.report_hook_failure(ctx, "ExecuteHook", hook.name(), e).await;
            }
        }
    }

    pub(crate) async fn fire_on_execute_operation(
        &self,
        ctx: &Context,
        input: &OperatorIO,
        output: &OperatorIO,
        flow_id: &str,
        step: &StepDesc,
    ) {
        for hook in self.hook_snapshot() {
            let Some(exec) = hook.as_execution_hook() else {
                continue;
            };
            if let Err(e) = guarded(exec.on_execute_operation(ctx, input, output, flow_id, step)).await {
                self.report_hook_failure(ctx, "ExecuteOperationHook", hook.name(), e).await;
            }
        }
    }

    pub(crate) async fn fire_on_execution_finished(
        &self,
        ctx: &Context,
        flow_id: &str,
        args: &FunctionArguments,
        input: &OperatorIO,
    ) {
        for hook in self.hook_snapshot() {
            let Some(exec) = hook.as_execution_hook() else {
                continue;
            };
            if let Err(e) = guarded(exec.on_execution_finished(ctx, flow_id, args, input)).await {
                self.report_hook_failure(ctx, "ExecutionFinishedHook", hook.name(), e).await;
            }
        }
    }

    pub(crate) async fn fire_flow_changed(&self, ctx: &Context, added: &[String], removed: &[String]) {
        for hook in self.hook_snapshot() {
            let Some(changed) = hook.as_flow_changed_hook() else {
                continue;
            };
            if let Err(e) = guarded(changed.on_flow_changed(ctx, added, removed)).await {
                self.report_hook_failure(ctx, "FlowChangedHook", hook.name(), e).await;
            }
        }
    }

    // Alert hook failures are logged, never raised as alerts.
    pub(crate) async fn fire_system_alert(&self, ctx: &Context, alert: &SystemAlert) {
        for hook in self.hook_snapshot() {
            let Some(alerts) = hook.as_alert_hook() else {
                continue;
            };
            if let Err(e) = guarded(alerts.on_system_alert(ctx, alert)).await {
                tracing::error!("Alert hook \"{}\" failed: {}", hook.name(), e);
            }
        }
    }

    pub(crate) async fn fire_reset_system_alert(&self, ctx: &Context, name: &str, category: &str) {
        for hook in self.hook_snapshot() {
            let Some(alerts) = hook.as_alert_hook() else {
                continue;
            };
            if let Err(e) = guarded(alerts.on_reset_system_alert(ctx, name, category)).await {
                tracing::error!("Alert hook \"{}\" failed: {}", hook.name(), e);
            }
        }
    }
}
