use crate::engine::FlowEngine;
use crate::timeout::{
    run_bounded, timeout_alert, timeout_from_tags, Interrupted, FLOW_TIMEOUT_TAG,
    OPERATION_TIMEOUT_TAG,
};
use homeflow_core::status::{
    EXPECTATION_FAILED, GATEWAY_TIMEOUT, INTERNAL_SERVER_ERROR, NOT_FOUND, SERVICE_UNAVAILABLE,
};
use homeflow_core::{
    Context, FlowDesc, FunctionArguments, Operator, OperatorIO, StepDesc, SubstitutionError,
    SystemAlert, ROOT_SYMBOL, SEVERITY_FAULT,
};
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};
use tracing::Instrument;

static VARIABLE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").unwrap());

/// A single run of a completed flow description.
///
/// Holds the output of every step that ran so far; consumed by
/// [`Flow::execute`].
pub struct Flow {
    desc: FlowDesc,
    engine: Arc<FlowEngine>,
    outputs: BTreeMap<String, OperatorIO>,
}

impl Flow {
    /// `desc` must already be completed
    pub(crate) fn new(engine: Arc<FlowEngine>, desc: FlowDesc) -> Self {
        Self {
            desc,
            engine,
            outputs: BTreeMap::new(),
        }
    }

    pub fn desc(&self) -> &FlowDesc {
        &self.desc
    }

    pub fn flow_timeout(&self) -> Duration {
        timeout_from_tags(&self.desc, FLOW_TIMEOUT_TAG, self.engine.config().flow_timeout())
    }

    pub fn operation_timeout(&self) -> Duration {
        timeout_from_tags(
            &self.desc,
            OPERATION_TIMEOUT_TAG,
            self.engine.config().operation_timeout(),
        )
    }

    /// Runs all steps under the flow timeout
    pub async fn execute(self, ctx: &Context, args: FunctionArguments, input: OperatorIO) -> OperatorIO {
        let limit = self.flow_timeout();
        let engine = self.engine.clone();
        let flow_id = self.desc.id.clone();
        let display_name = self.desc.display_name.clone();
        let args_text = args.to_string();
        let started = Instant::now();

        let span = tracing::info_span!("flow", flow = %flow_id);
        let run = self.execute_steps(ctx.clone(), args, input).instrument(span);

        match run_bounded(limit, run).await {
            Ok(output) => output,
            Err(Interrupted::TimedOut(_)) => {
                ctx.cancel();
                let message = format!(
                    "Timeout after {:?} when executing flow \"{}\" with arguments \"{}\"",
                    started.elapsed(),
                    display_name,
                    args_text
                );
                engine
                    .set_system_alert(ctx, timeout_alert(format!("flowTimeout.{}", flow_id), message.clone()))
                    .await;
                OperatorIO::error(GATEWAY_TIMEOUT, message)
            }
            Err(Interrupted::Panicked(reason)) => {
                let message = format!("Panic while executing flow \"{}\": {}", flow_id, reason);
                tracing::error!("{}", message);
                let alert = SystemAlert::new("Panic", "system", SEVERITY_FAULT, message.clone())
                    .expires_in(engine.config().alert_duration());
                engine.set_system_alert(ctx, alert).await;
                OperatorIO::error(INTERNAL_SERVER_ERROR, message)
            }
        }
    }

    async fn execute_steps(mut self, ctx: Context, args: FunctionArguments, input: OperatorIO) -> OperatorIO {
        self.engine.flow_executions.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            "Executing flow \"{}\" (\"{}\") with arguments {}",
            self.desc.id,
            self.desc.display_name,
            args
        );

        self.outputs.insert(ROOT_SYMBOL.to_string(), input);
        let steps = self.desc.steps.clone();
        for step in &steps {
            if ctx.is_cancelled() {
                return OperatorIO::error(SERVICE_UNAVAILABLE, "Execution aborted");
            }
            let output = self.execute_step(&ctx, step, &args).await;
            self.outputs.insert(step.name.clone(), output);
        }

        tracing::debug!("Flow \"{}\" finished", self.desc.id);
        self.into_output()
    }

    fn into_output(mut self) -> OperatorIO {
        if self.desc.output_from.is_empty() {
            return OperatorIO::outputs(self.outputs);
        }
        match self.outputs.remove(&self.desc.output_from) {
            Some(output) => output,
            None => {
                tracing::error!("Output from \"{}\" not found", self.desc.output_from);
                OperatorIO::outputs(self.outputs)
            }
        }
    }

    async fn execute_step(&self, ctx: &Context, step: &StepDesc, main_args: &FunctionArguments) -> OperatorIO {
        self.engine.step_executions.fetch_add(1, Ordering::Relaxed);
        let step_ctx = ctx.child_for_step(&step.name);
        let span = tracing::debug_span!("step", step = %step.name, operator = %step.operator);

        async {
            let input = if step.input_from.is_empty() {
                OperatorIO::empty()
            } else {
                self.output_of(&step.input_from)
            };
            let output = self.resolve_and_call(&step_ctx, step, main_args, &input).await;
            self.engine
                .fire_on_execute_operation(&step_ctx, &input, &output, &self.desc.id, step)
                .await;
            output
        }
        .instrument(span)
        .await
    }

    async fn resolve_and_call(
        &self,
        ctx: &Context,
        step: &StepDesc,
        main_args: &FunctionArguments,
        input: &OperatorIO,
    ) -> OperatorIO {
        if input.is_error() {
            if !input.is_expectation_failed() {
                tracing::debug!(
                    "Not executing step \"{}\", because \"{}\" returned an error",
                    step.name,
                    step.input_from
                );
            }
            return input.clone();
        }

        if !step.execute_on_success_of.is_empty() && self.output_of(&step.execute_on_success_of).is_error() {
            return OperatorIO::error(
                EXPECTATION_FAILED,
                format!(
                    "Operation not executed because \"{}\" did not succeed",
                    step.execute_on_success_of
                ),
            );
        }
        if !step.execute_on_fail_of.is_empty() && !self.output_of(&step.execute_on_fail_of).is_error() {
            return OperatorIO::error(
                EXPECTATION_FAILED,
                format!(
                    "Operation not executed because \"{}\" did not fail",
                    step.execute_on_fail_of
                ),
            );
        }

        let mut args = match self.substitute(&step.arguments) {
            Ok(args) => args,
            Err(e) => {
                tracing::debug!("Step \"{}\" failed with error \"{}\"", step.name, e);
                return OperatorIO::error(NOT_FOUND, e.to_string());
            }
        };

        if step.use_main_args {
            for (key, values) in main_args.iter() {
                if args.has(key) {
                    tracing::warn!("Argument {} overwritten by main arg", key);
                }
                args.set(key, values.to_vec());
            }
        }

        if !step.arguments_from.is_empty() {
            let Some(source) = self.outputs.get(&step.arguments_from) else {
                return OperatorIO::error(
                    NOT_FOUND,
                    format!(
                        "Output of \"{}\" cannot be used as arguments, because there is no such output",
                        step.arguments_from
                    ),
                );
            };
            if source.is_error() {
                if !source.is_expectation_failed() {
                    tracing::debug!(
                        "Not executing step \"{}\", because \"{}\" returned an error",
                        step.name,
                        step.arguments_from
                    );
                }
                return source.clone();
            }
            match source.get_args_map() {
                Ok(map) => {
                    for (key, value) in map {
                        args.insert(key, value);
                    }
                }
                Err(e) => {
                    return OperatorIO::error(
                        INTERNAL_SERVER_ERROR,
                        format!(
                            "Output of \"{}\" cannot be used as arguments: {}",
                            step.arguments_from, e
                        ),
                    )
                }
            }
        }

        let Some(operator) = self.engine.operator(&step.operator) else {
            return OperatorIO::error(
                NOT_FOUND,
                format!("No operator with name \"{}\" found", step.operator),
            );
        };
        self.call_operator(ctx, operator, &step.function, args, input.clone())
            .await
    }

    async fn call_operator(
        &self,
        ctx: &Context,
        operator: Arc<dyn Operator>,
        function: &str,
        args: FunctionArguments,
        input: OperatorIO,
    ) -> OperatorIO {
        let op_name = operator.name().to_string();
        tracing::debug!(
            "Calling operator \"{}\", function \"{}\" with arguments {}",
            op_name,
            function,
            args
        );
        let args_text = args.to_string();
        let started = Instant::now();

        let call_ctx = ctx.clone();
        let call_function = function.to_string();
        let call = async move { operator.execute(&call_ctx, &call_function, args, input).await };

        match run_bounded(self.operation_timeout(), call).await {
            Ok(output) => output,
            Err(Interrupted::TimedOut(_)) => {
                ctx.cancel();
                let message = format!(
                    "Timeout after {:?} when calling operator \"{}\", function \"{}\" with arguments \"{}\"",
                    started.elapsed(),
                    op_name,
                    function,
                    args_text
                );
                let alert = timeout_alert(format!("operationTimeout.{}.{}", op_name, function), message.clone());
                self.engine.set_system_alert(ctx, alert).await;
                OperatorIO::error(GATEWAY_TIMEOUT, message)
            }
            Err(Interrupted::Panicked(reason)) => {
                let message = format!(
                    "Operator \"{}\" panicked in function \"{}\": {}",
                    op_name, function, reason
                );
                tracing::error!("{}", message);
                let alert = SystemAlert::new(
                    format!("operatorPanic.{}.{}", op_name, function),
                    "system",
                    SEVERITY_FAULT,
                    message.clone(),
                )
                .expires_in(self.engine.config().alert_duration());
                self.engine.set_system_alert(ctx, alert).await;
                OperatorIO::error(INTERNAL_SERVER_ERROR, message)
            }
        }
    }

    fn output_of(&self, name: &str) -> OperatorIO {
        self.outputs.get(name).cloned().unwrap_or_default()
    }

    /// Replaces `${output}` and `${output.field}` in every argument value
    fn substitute(&self, args: &FunctionArguments) -> Result<FunctionArguments, SubstitutionError> {
        let mut resolved = FunctionArguments::new();
        for (key, values) in args.iter() {
            let values = values
                .iter()
                .map(|v| self.substitute_value(v))
                .collect::<Result<Vec<_>, _>>()?;
            resolved.set(key, values);
        }
        Ok(resolved)
    }

    fn substitute_value(&self, value: &str) -> Result<String, SubstitutionError> {
        let mut first_error = None;
        let replaced = VARIABLE.replace_all(value, |caps: &Captures| {
            match self.lookup_variable(&caps[1]) {
                Ok(s) => s,
                Err(e) => {
                    first_error.get_or_insert(e);
                    String::new()
                }
            }
        });
        match first_error {
            Some(e) => Err(e),
            None => Ok(replaced.into_owned()),
        }
    }

    fn lookup_variable(&self, token: &str) -> Result<String, SubstitutionError> {
        if let Some(output) = self.outputs.get(token) {
            return Ok(output.get_string());
        }
        let Some((output_name, field)) = token.split_once('.') else {
            return Err(SubstitutionError::OutputNotFound(token.to_string()));
        };
        let output = self
            .outputs
            .get(output_name)
            .ok_or_else(|| SubstitutionError::OutputNotFound(output_name.to_string()))?;
        let map = output.get_args_map().map_err(|e| SubstitutionError::NotAMap {
            output: output_name.to_string(),
            field: field.to_string(),
            reason: e.to_string(),
        })?;
        map.get(field)
            .cloned()
            .ok_or_else(|| SubstitutionError::FieldNotFound {
                output: output_name.to_string(),
                field: field.to_string(),
            })
    }
}
