use super::engine_gone;
use crate::engine::FlowEngine;
use async_trait::async_trait;
use homeflow_core::{Context, FunctionArguments, Operator, OperatorIO};
use std::collections::BTreeMap;
use std::sync::Weak;

/// Runs the flow named by the function
pub struct OpFlow {
    engine: Weak<FlowEngine>,
}

impl OpFlow {
    pub fn new(engine: Weak<FlowEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Operator for OpFlow {
    fn name(&self) -> &str {
        "flow"
    }

    async fn execute(
        &self,
        ctx: &Context,
        function: &str,
        args: FunctionArguments,
        input: OperatorIO,
    ) -> OperatorIO {
        // the caller's input already failed
        if input.is_error() {
            return input;
        }
        let Some(engine) = self.engine.upgrade() else {
            return engine_gone();
        };
        engine.execute_flow(ctx, function, args, input).await
    }

    fn functions(&self) -> Vec<String> {
        self.engine
            .upgrade()
            .map(|engine| engine.all_flow_descs().into_keys().collect())
            .unwrap_or_default()
    }

    /// Arguments of every step in the flow that receives the main arguments
    fn possible_args(&self, function: &str) -> Vec<String> {
        let Some(engine) = self.engine.upgrade() else {
            return Vec::new();
        };
        let Some(desc) = engine.flow_desc(function) else {
            return Vec::new();
        };
        desc.steps
            .iter()
            .filter(|step| step.use_main_args)
            .filter_map(|step| {
                engine
                    .operator(&step.operator)
                    .map(|op| op.possible_args(&step.function))
            })
            .flatten()
            .collect()
    }

    fn arg_suggestions(
        &self,
        function: &str,
        arg: &str,
        other_args: &FunctionArguments,
    ) -> BTreeMap<String, String> {
        let Some(engine) = self.engine.upgrade() else {
            return BTreeMap::new();
        };
        let Some(desc) = engine.flow_desc(function) else {
            return BTreeMap::new();
        };

        let mut suggestions = BTreeMap::new();
        for step in desc.steps.iter().filter(|step| step.use_main_args) {
            let Some(op) = engine.operator(&step.operator) else {
                continue;
            };
            let mut step_args = step.arguments.clone();
            for (key, value) in other_args.first_values_map() {
                step_args.insert(key, value);
            }
            suggestions.extend(op.arg_suggestions(&step.function, arg, &step_args));
        }
        suggestions
    }
}

/// Runs all flows with the tag named by the function, plus `additionalTags`
pub struct OpFlowByTag {
    engine: Weak<FlowEngine>,
}

impl OpFlowByTag {
    pub fn new(engine: Weak<FlowEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Operator for OpFlowByTag {
    fn name(&self) -> &str {
        "flowbytag"
    }

    async fn execute(
        &self,
        ctx: &Context,
        function: &str,
        args: FunctionArguments,
        input: OperatorIO,
    ) -> OperatorIO {
        if input.is_error() {
            return input;
        }
        let Some(engine) = self.engine.upgrade() else {
            return engine_gone();
        };

        let mut tags = Vec::new();
        if !function.is_empty() {
            tags.push(function.to_string());
        }
        if let Some(additional) = args.get_joined("additionalTags") {
            tags.extend(
                additional
                    .split(',')
                    .filter(|t| !t.is_empty())
                    .map(str::to_string),
            );
        }

        engine
            .execute_flow_by_tags(ctx, &tags, FunctionArguments::new(), OperatorIO::empty())
            .await
    }

    fn functions(&self) -> Vec<String> {
        self.engine
            .upgrade()
            .map(|engine| engine.tags().into_iter().collect())
            .unwrap_or_default()
    }

    fn possible_args(&self, _function: &str) -> Vec<String> {
        vec!["additionalTags".to_string()]
    }

    fn arg_suggestions(
        &self,
        _function: &str,
        _arg: &str,
        _other_args: &FunctionArguments,
    ) -> BTreeMap<String, String> {
        self.engine
            .upgrade()
            .map(|engine| engine.tags().into_iter().map(|t| (t.clone(), t)).collect())
            .unwrap_or_default()
    }
}
