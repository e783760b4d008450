use crate::engine::FlowEngine;
use crate::flow::Flow;
use homeflow_core::status::{BAD_REQUEST, NOT_FOUND};
use homeflow_core::tags::single_tag_groups;
use homeflow_core::{Context, FlowDesc, FunctionArguments, OperatorIO, StepDesc, ROOT_SYMBOL};
use std::sync::Arc;

/// Tag added to flows the engine composes on the fly
pub const INTERNAL_TAG: &str = "internal";

impl FlowEngine {
    /// Runs a registered flow
    pub async fn execute_flow(
        self: &Arc<Self>,
        ctx: &Context,
        id: &str,
        args: FunctionArguments,
        input: OperatorIO,
    ) -> OperatorIO {
        match self.complete_flow_desc(id) {
            Ok(desc) => self.run_flow(ctx, desc, args, input).await,
            Err(e) => OperatorIO::from_error(&e),
        }
    }

    /// Runs a description that is not registered with the engine
    pub async fn execute_ad_hoc_flow(
        self: &Arc<Self>,
        ctx: &Context,
        id: &str,
        desc: FlowDesc,
        args: FunctionArguments,
        input: OperatorIO,
    ) -> OperatorIO {
        match self.check_flow_desc(&desc, id) {
            Ok(desc) => self.run_flow(ctx, desc, args, input).await,
            Err(e) => OperatorIO::from_error(&e),
        }
    }

    /// Calls a single operator function as a one-step flow, so hooks and
    /// timeouts apply as for any other flow. The step receives the main
    /// arguments and the main input.
    pub async fn execute_operator(
        self: &Arc<Self>,
        ctx: &Context,
        operator: &str,
        function: &str,
        args: FunctionArguments,
        input: OperatorIO,
    ) -> OperatorIO {
        let id = format!("OnDemand/{}/{}", operator, function);
        let desc = FlowDesc::new(vec![StepDesc::new(operator, function)
            .with_input_from(ROOT_SYMBOL)
            .with_main_args()])
            .with_tags([INTERNAL_TAG]);
        match self.check_flow_desc(&desc, &id) {
            Ok(desc) => self.run_flow(ctx, desc, args, input).await,
            Err(e) => OperatorIO::error(e.status_code(), format!("Flow preparation failed: {}", e)),
        }
    }

    /// Runs all flows carrying every one of `tags`
    pub async fn execute_flow_by_tags<S: AsRef<str>>(
        self: &Arc<Self>,
        ctx: &Context,
        tags: &[S],
        args: FunctionArguments,
        input: OperatorIO,
    ) -> OperatorIO {
        self.execute_flow_by_tag_groups(ctx, &single_tag_groups(tags), args, input)
            .await
    }

    /// Runs all flows carrying at least one tag of every group.
    ///
    /// A single match runs directly. Several matches are composed into one
    /// ad-hoc flow with a step per match, returning the outputs keyed by
    /// flow id.
    pub async fn execute_flow_by_tag_groups(
        self: &Arc<Self>,
        ctx: &Context,
        groups: &[Vec<String>],
        args: FunctionArguments,
        input: OperatorIO,
    ) -> OperatorIO {
        if groups.iter().all(|g| g.is_empty()) {
            return OperatorIO::error(BAD_REQUEST, "No tags given");
        }

        let ids: Vec<String> = self.flow_descs_by_tag_groups(groups).into_keys().collect();
        match ids.as_slice() {
            [] => OperatorIO::error(NOT_FOUND, format!("No flow with tags {:?} found", groups)),
            [id] => self.execute_flow(ctx, id, args, input).await,
            _ => {
                let steps = ids
                    .iter()
                    .map(|id| {
                        StepDesc::new("flow", id.as_str())
                            .with_name(id.as_str())
                            .with_input_from(ROOT_SYMBOL)
                            .with_main_args()
                    })
                    .collect();
                let mut desc = FlowDesc::new(steps).with_tags([INTERNAL_TAG]);
                desc.display_name = format!("Flows with tags {:?}", groups);
                let id = format!("ExecuteFlowByTag/{:?}", groups);
                self.execute_ad_hoc_flow(ctx, &id, desc, args, input).await
            }
        }
    }

    async fn run_flow(
        self: &Arc<Self>,
        ctx: &Context,
        desc: FlowDesc,
        args: FunctionArguments,
        input: OperatorIO,
    ) -> OperatorIO {
        let flow_ctx = ctx.child_for_flow(&desc.id);
        let flow_id = desc.id.clone();

        self.fire_on_execute(&flow_ctx, &flow_id, &args, &input).await;
        let output = Flow::new(self.clone(), desc)
            .execute(&flow_ctx, args.clone(), input.clone())
            .await;
        self.fire_on_execution_finished(&flow_ctx, &flow_id, &args, &input)
            .await;
        output
    }
}
