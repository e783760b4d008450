use crate::{FunctionArguments, Hook, OperatorIO};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub type ExecutionId = Uuid;

/// Capability interface every pluggable operator implements
#[async_trait]
pub trait Operator: Send + Sync {
    /// Name used to reference the operator from steps (matched case-insensitively)
    fn name(&self) -> &str;

    /// Execute `function` with the given arguments and input
    async fn execute(
        &self,
        ctx: &Context,
        function: &str,
        args: FunctionArguments,
        input: OperatorIO,
    ) -> OperatorIO;

    /// Functions this operator can execute
    fn functions(&self) -> Vec<String>;

    /// Argument names accepted by `function`
    fn possible_args(&self, _function: &str) -> Vec<String> {
        Vec::new()
    }

    /// Suggested values (display name -> value) for `arg`
    fn arg_suggestions(
        &self,
        _function: &str,
        _arg: &str,
        _other_args: &FunctionArguments,
    ) -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    /// Called once the engine is ready to receive triggers
    async fn start_listening(&self, _ctx: &Context) {}

    /// Called on graceful shutdown
    async fn shutdown(&self, _ctx: &Context) {}

    /// Optional hook registered alongside the operator
    fn hook(&self) -> Option<Arc<dyn Hook>> {
        None
    }
}

/// Runtime data of one execution tree.
///
/// Child contexts share the execution id and derive their cancellation
/// token from the parent, so cancelling a flow also cancels its steps.
#[derive(Clone, Debug)]
pub struct Context {
    id: ExecutionId,
    reason: String,
    created: DateTime<Utc>,
    nesting: usize,
    flow: Option<String>,
    step: Option<String>,
    cancellation: CancellationToken,
}

impl Context {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            id: ExecutionId::new_v4(),
            reason: reason.into(),
            created: Utc::now(),
            nesting: 0,
            flow: None,
            step: None,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> ExecutionId {
        self.id
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    /// How many flows deep this context is nested
    pub fn nesting(&self) -> usize {
        self.nesting
    }

    pub fn flow(&self) -> Option<&str> {
        self.flow.as_deref()
    }

    pub fn step(&self) -> Option<&str> {
        self.step.as_deref()
    }

    /// Context for executing a flow; cancelling it does not affect the parent
    pub fn child_for_flow(&self, flow_id: &str) -> Self {
        Self {
            nesting: self.nesting + 1,
            flow: Some(flow_id.to_string()),
            step: None,
            cancellation: self.cancellation.child_token(),
            ..self.clone()
        }
    }

    /// Context for executing one step of the current flow
    pub fn child_for_step(&self, step: &str) -> Self {
        Self {
            step: Some(step.to_string()),
            cancellation: self.cancellation.child_token(),
            ..self.clone()
        }
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new("")
    }
}
