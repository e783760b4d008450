#![allow(dead_code)]

use async_trait::async_trait;
use homeflow_core::hook::{ExecutionHook, FlowChangedHook, Hook, HookResult};
use homeflow_core::{Context, FunctionArguments, HookError, Operator, OperatorIO, StepDesc};
use homeflow_runtime::{EngineConfig, FlowEngine};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Operator used by the engine tests
#[derive(Default)]
pub struct MockOperator {
    pub calls: AtomicUsize,
    pub saw_cancellation: AtomicBool,
}

impl MockOperator {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Operator for MockOperator {
    fn name(&self) -> &str {
        "mock"
    }

    async fn execute(
        &self,
        ctx: &Context,
        function: &str,
        args: FunctionArguments,
        input: OperatorIO,
    ) -> OperatorIO {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match function {
            "echo" => match args.get("output") {
                Some(output) => OperatorIO::plain(output),
                None => input,
            },
            "args" => OperatorIO::object_from(&args.joined_map()),
            "object" => OperatorIO::object(json!({"light": {"state": "on"}, "level": 42})),
            "fail" => OperatorIO::error(500, "mock failure"),
            "hang" => {
                tokio::select! {
                    _ = ctx.cancellation().cancelled() => {
                        self.saw_cancellation.store(true, Ordering::SeqCst);
                        OperatorIO::error(503, "cancelled")
                    }
                    _ = tokio::time::sleep(Duration::from_secs(10)) => OperatorIO::empty(),
                }
            }
            "panic" => panic!("mock operator panicked"),
            _ => OperatorIO::error(400, format!("Unknown function: {}", function)),
        }
    }

    fn functions(&self) -> Vec<String> {
        ["echo", "args", "object", "fail", "hang", "panic"]
            .iter()
            .map(|f| f.to_string())
            .collect()
    }
}

pub fn test_config() -> EngineConfig {
    EngineConfig {
        load_embedded_flows: false,
        ..EngineConfig::default()
    }
}

/// Engine without embedded flows and with a registered [`MockOperator`]
pub fn create_engine() -> (Arc<FlowEngine>, Arc<MockOperator>) {
    create_engine_with(test_config())
}

pub fn create_engine_with(config: EngineConfig) -> (Arc<FlowEngine>, Arc<MockOperator>) {
    let engine = FlowEngine::new(config, CancellationToken::new()).unwrap();
    let mock = Arc::new(MockOperator::default());
    engine.add_operator(mock.clone());
    (engine, mock)
}

pub fn ctx() -> Context {
    Context::new("test")
}

pub fn mock(function: &str) -> StepDesc {
    StepDesc::new("mock", function)
}

/// Hook recording every notification it receives
#[derive(Default)]
pub struct RecordingHook {
    pub name: String,
    pub fail_steps: bool,
    pub panic_on_execute: bool,
    pub started: Mutex<Vec<String>>,
    pub steps: Mutex<Vec<(String, String, u16)>>,
    pub finished: Mutex<Vec<String>>,
    pub changes: Mutex<Vec<(Vec<String>, Vec<String>)>>,
}

impl RecordingHook {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }
}

impl Hook for RecordingHook {
    fn name(&self) -> &str {
        &self.name
    }

    fn as_execution_hook(&self) -> Option<&dyn ExecutionHook> {
        Some(self)
    }

    fn as_flow_changed_hook(&self) -> Option<&dyn FlowChangedHook> {
        Some(self)
    }
}

#[async_trait]
impl ExecutionHook for RecordingHook {
    async fn on_execute(
        &self,
        _ctx: &Context,
        flow_id: &str,
        _main_args: &FunctionArguments,
        _main_input: &OperatorIO,
    ) -> HookResult {
        if self.panic_on_execute {
            panic!("hook panicked");
        }
        self.started.lock().push(flow_id.to_string());
        Ok(())
    }

    async fn on_execute_operation(
        &self,
        _ctx: &Context,
        _input: &OperatorIO,
        output: &OperatorIO,
        flow_id: &str,
        step: &StepDesc,
    ) -> HookResult {
        self.steps
            .lock()
            .push((flow_id.to_string(), step.name.clone(), output.status_code()));
        if self.fail_steps {
            return Err(HookError::Failed("recording refused".into()));
        }
        Ok(())
    }

    async fn on_execution_finished(
        &self,
        _ctx: &Context,
        flow_id: &str,
        _main_args: &FunctionArguments,
        _main_input: &OperatorIO,
    ) -> HookResult {
        self.finished.lock().push(flow_id.to_string());
        Ok(())
    }
}

#[async_trait]
impl FlowChangedHook for RecordingHook {
    async fn on_flow_changed(&self, _ctx: &Context, added: &[String], removed: &[String]) -> HookResult {
        self.changes.lock().push((added.to_vec(), removed.to_vec()));
        Ok(())
    }
}
