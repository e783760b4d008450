use crate::alerts::AlertBook;
use crate::dispatch::HookRegistry;
use crate::operators::{OpFlow, OpFlowByTag, OpSystem};
use crate::registry::OperatorRegistry;
use crate::storage::{self, validate_flow_id, FlowStore};
use chrono::{DateTime, Utc};
use homeflow_core::tags::{single_tag_groups, split_tag};
use homeflow_core::{
    Context, EventBus, EventBusHook, ExecutionEvent, FlowDesc, FlowError, Hook, Operator,
    OperatorIO, OperatorLookup, Result, SystemAlert, SEVERITY_FAULT,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Configuration for the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory of persisted flows; `None` keeps flows in memory only
    pub flows_dir: Option<PathBuf>,
    pub load_embedded_flows: bool,
    pub alert_duration_secs: u64,
    pub flow_timeout_secs: u64,
    pub operation_timeout_secs: u64,
    pub event_buffer_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            flows_dir: None,
            load_embedded_flows: true,
            alert_duration_secs: 3600,
            flow_timeout_secs: 120,
            operation_timeout_secs: 60,
            event_buffer_size: 1000,
        }
    }
}

impl EngineConfig {
    /// Reads the configuration from a JSON file; missing keys keep their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn alert_duration(&self) -> Duration {
        Duration::from_secs(self.alert_duration_secs)
    }

    pub fn flow_timeout(&self) -> Duration {
        Duration::from_secs(self.flow_timeout_secs)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }
}

/// Point-in-time view of the engine counters
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub flow_executions: u64,
    pub step_executions: u64,
    pub flows: usize,
    pub operators: usize,
    pub hooks: usize,
    pub active_alerts: usize,
    pub started: DateTime<Utc>,
    pub uptime_secs: i64,
}

/// Holds all flows, operators and hooks and runs flows on request.
///
/// The engine is shared as `Arc<FlowEngine>`. None of its locks is held
/// while an operator or hook runs, so both may call back into the engine.
pub struct FlowEngine {
    config: EngineConfig,
    pub(crate) flows: RwLock<BTreeMap<String, FlowDesc>>,
    pub(crate) operators: RwLock<OperatorRegistry>,
    pub(crate) hooks: RwLock<HookRegistry>,
    store: Option<FlowStore>,
    alerts: Arc<AlertBook>,
    event_bus: Arc<EventBus>,
    pub(crate) flow_executions: AtomicU64,
    pub(crate) step_executions: AtomicU64,
    started: DateTime<Utc>,
    reload_requested: AtomicBool,
    shutdown: CancellationToken,
}

impl FlowEngine {
    /// Creates the engine, loads embedded and stored flows and registers
    /// the built-in operators and hooks.
    ///
    /// `shutdown` is cancelled when a shutdown or reload is requested.
    pub fn new(config: EngineConfig, shutdown: CancellationToken) -> Result<Arc<Self>> {
        let store = match &config.flows_dir {
            Some(dir) => Some(FlowStore::open(dir.clone())?),
            None => None,
        };
        let flows = initial_flows(&config, store.as_ref())?;
        let alerts = Arc::new(AlertBook::new());
        let event_bus = Arc::new(EventBus::new(config.event_buffer_size));

        let engine = Arc::new_cyclic(|weak: &Weak<FlowEngine>| {
            let mut operators = OperatorRegistry::new();
            operators.register(Arc::new(OpFlow::new(weak.clone())));
            operators.register(Arc::new(OpFlowByTag::new(weak.clone())));
            operators.register(Arc::new(OpSystem::new(weak.clone())));

            let mut hooks = HookRegistry::new();
            hooks.register(alerts.clone());
            hooks.register(Arc::new(EventBusHook::new(event_bus.clone())));

            FlowEngine {
                config,
                flows: RwLock::new(flows),
                operators: RwLock::new(operators),
                hooks: RwLock::new(hooks),
                store,
                alerts,
                event_bus,
                flow_executions: AtomicU64::new(0),
                step_executions: AtomicU64::new(0),
                started: Utc::now(),
                reload_requested: AtomicBool::new(false),
                shutdown,
            }
        });

        tracing::info!("Flow engine created with {} flows", engine.flows.read().len());
        Ok(engine)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ---- operators and hooks ----

    /// Registers an operator and, if it provides one, its hook
    pub fn add_operator(&self, operator: Arc<dyn Operator>) {
        let hook = operator.hook();
        self.operators.write().register(operator);
        if let Some(hook) = hook {
            self.add_hook(hook);
        }
    }

    pub fn add_operators<I>(&self, operators: I)
    where
        I: IntoIterator<Item = Arc<dyn Operator>>,
    {
        for operator in operators {
            self.add_operator(operator);
        }
    }

    pub fn has_operator(&self, name: &str) -> bool {
        self.operators.read().contains(name)
    }

    pub fn operator(&self, name: &str) -> Option<Arc<dyn Operator>> {
        self.operators.read().get(name)
    }

    pub fn operator_names(&self) -> Vec<String> {
        self.operators.read().names()
    }

    /// Registers a hook; a hook with the same name is replaced
    pub fn add_hook(&self, hook: Arc<dyn Hook>) {
        self.hooks.write().register(hook);
    }

    pub fn remove_hook(&self, name: &str) -> bool {
        self.hooks.write().remove(name).is_some()
    }

    pub fn hook_names(&self) -> Vec<String> {
        self.hooks.read().names()
    }

    // ---- flow queries ----

    pub fn flow_desc(&self, id: &str) -> Option<FlowDesc> {
        self.flows.read().get(id).cloned()
    }

    /// The stored description after validation and completion
    pub fn complete_flow_desc(&self, id: &str) -> Result<FlowDesc> {
        let desc = self
            .flow_desc(id)
            .ok_or_else(|| FlowError::FlowNotFound(id.to_string()))?;
        self.check_flow_desc(&desc, id)
    }

    pub fn all_flow_descs(&self) -> BTreeMap<String, FlowDesc> {
        self.flows.read().clone()
    }

    /// Flows carrying all of `tags`
    pub fn flow_descs_by_tag<S: AsRef<str>>(&self, tags: &[S]) -> BTreeMap<String, FlowDesc> {
        self.flow_descs_by_tag_groups(&single_tag_groups(tags))
    }

    /// Flows carrying at least one tag of every group
    pub fn flow_descs_by_tag_groups<S: AsRef<str>>(
        &self,
        groups: &[Vec<S>],
    ) -> BTreeMap<String, FlowDesc> {
        self.flows
            .read()
            .iter()
            .filter(|(_, desc)| desc.has_at_least_one_tag_per_group(groups))
            .map(|(id, desc)| (id.clone(), desc.clone()))
            .collect()
    }

    /// Every distinct tag in use
    pub fn tags(&self) -> BTreeSet<String> {
        self.flows
            .read()
            .values()
            .flat_map(|desc| desc.tags.iter().cloned())
            .collect()
    }

    /// Tag keys mapped to their sorted, distinct values
    pub fn tag_map(&self) -> BTreeMap<String, Vec<String>> {
        let mut map: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for desc in self.flows.read().values() {
            for tag in &desc.tags {
                let (key, value) = split_tag(tag);
                if key.is_empty() {
                    continue;
                }
                let values = map.entry(key.to_string()).or_default();
                if !value.is_empty() {
                    values.insert(value.to_string());
                }
            }
        }
        map.into_iter()
            .map(|(k, v)| (k, v.into_iter().collect()))
            .collect()
    }

    /// Values of the `key` tag among flows that carry `key` and all of `other_tags`
    pub fn tag_values<S: AsRef<str>>(&self, key: &str, other_tags: &[S]) -> Vec<String> {
        if key.is_empty() {
            return Vec::new();
        }
        let mut query = vec![key.to_string()];
        query.extend(other_tags.iter().map(|t| t.as_ref().to_string()));

        let values: BTreeSet<String> = self
            .flow_descs_by_tag(&query)
            .values()
            .flat_map(|desc| desc.tags.iter())
            .map(|t| split_tag(t))
            .filter(|(k, v)| k.eq_ignore_ascii_case(key) && !v.is_empty())
            .map(|(_, v)| v.to_string())
            .collect();
        values.into_iter().collect()
    }

    /// Validates a registered flow; an empty output means the flow is valid
    pub fn check_flow(&self, id: &str) -> OperatorIO {
        match self.complete_flow_desc(id) {
            Ok(_) => OperatorIO::empty(),
            Err(e) => OperatorIO::from_error(&e),
        }
    }

    /// Validates `desc` as if it were registered under `id`
    pub fn check_flow_desc(&self, desc: &FlowDesc, id: &str) -> Result<FlowDesc> {
        Ok(desc.complete(id, self)?)
    }

    // ---- flow mutation ----

    /// Validates and registers a flow, persisting it when a flow directory is configured
    pub async fn add_flow(&self, ctx: &Context, id: &str, desc: FlowDesc, overwrite: bool) -> Result<()> {
        self.insert_flow(ctx, id, desc, overwrite, true).await
    }

    /// Like [`add_flow`](Self::add_flow), but the flow is never written to disk
    pub async fn add_ephemeral_flow(
        &self,
        ctx: &Context,
        id: &str,
        desc: FlowDesc,
        overwrite: bool,
    ) -> Result<()> {
        self.insert_flow(ctx, id, desc, overwrite, false).await
    }

    async fn insert_flow(
        &self,
        ctx: &Context,
        id: &str,
        mut desc: FlowDesc,
        overwrite: bool,
        persist: bool,
    ) -> Result<()> {
        validate_flow_id(id)?;
        self.check_flow_desc(&desc, id)?;
        desc.id = id.to_string();
        desc.dedup_tags();

        let written = {
            let mut flows = self.flows.write();
            if let Some(existing) = flows.get(id) {
                if !overwrite {
                    return Err(FlowError::AlreadyExists(id.to_string()));
                }
                tracing::warn!(
                    "Flow \"{}\" already exists (source \"{}\"), overwriting with source \"{}\"",
                    id,
                    existing.source,
                    desc.source
                );
            }
            let written = match &self.store {
                Some(store) if persist => store.write(id, &desc),
                _ => Ok(()),
            };
            if written.is_ok() {
                flows.insert(id.to_string(), desc);
            }
            written
        };

        if let Err(e) = written {
            let alert = SystemAlert::new("FlowWriteError", "system", SEVERITY_FAULT, e.to_string())
                .expires_in(self.config.alert_duration());
            self.set_system_alert(ctx, alert).await;
            return Err(e);
        }

        tracing::info!("Added flow \"{}\"", id);
        self.fire_flow_changed(ctx, &[id.to_string()], &[]).await;
        Ok(())
    }

    /// Removes a flow from memory and from disk
    pub async fn delete_flow(&self, ctx: &Context, id: &str) -> Result<FlowDesc> {
        let removed = self
            .flows
            .write()
            .remove(id)
            .ok_or_else(|| FlowError::FlowNotFound(id.to_string()))?;
        let file_removed = match &self.store {
            Some(store) => store.remove(id),
            None => Ok(()),
        };

        tracing::info!("Deleted flow \"{}\"", id);
        self.fire_flow_changed(ctx, &[], &[id.to_string()]).await;
        file_removed?;
        Ok(removed)
    }

    // ---- alerts ----

    /// Forwards an alert to every alert hook
    pub async fn set_system_alert(&self, ctx: &Context, alert: SystemAlert) {
        self.fire_system_alert(ctx, &alert).await;
    }

    pub async fn reset_system_alert(&self, ctx: &Context, name: &str, category: &str) {
        self.fire_reset_system_alert(ctx, name, category).await;
    }

    pub fn alerts(&self) -> &Arc<AlertBook> {
        &self.alerts
    }

    // ---- lifecycle ----

    pub fn metrics(&self) -> MetricsSnapshot {
        let now = Utc::now();
        MetricsSnapshot {
            flow_executions: self.flow_executions.load(Ordering::Relaxed),
            step_executions: self.step_executions.load(Ordering::Relaxed),
            flows: self.flows.read().len(),
            operators: self.operators.read().len(),
            hooks: self.hooks.read().len(),
            active_alerts: self.alerts.active().len(),
            started: self.started,
            uptime_secs: (now - self.started).num_seconds(),
        }
    }

    /// Starts all operators, then notifies flow-changed hooks
    pub async fn start_listening(&self, ctx: &Context) {
        let operators = self.operators.read().snapshot();
        for operator in operators {
            operator.start_listening(ctx).await;
        }
        self.fire_flow_changed(ctx, &[], &[]).await;
    }

    /// Graceful shutdown of all operators
    pub async fn shutdown(&self, ctx: &Context) {
        let operators = self.operators.read().snapshot();
        for operator in operators {
            tracing::debug!("Stopping {}", operator.name());
            operator.shutdown(ctx).await;
        }
    }

    /// Asks the owner of the engine to rebuild it
    pub fn request_reload(&self) {
        tracing::info!("Reload requested");
        self.reload_requested.store(true, Ordering::SeqCst);
        self.shutdown.cancel();
    }

    pub fn request_shutdown(&self) {
        tracing::info!("Shutdown requested");
        self.reload_requested.store(false, Ordering::SeqCst);
        self.shutdown.cancel();
    }

    pub fn reload_requested(&self) -> bool {
        self.reload_requested.load(Ordering::SeqCst)
    }

    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.event_bus.subscribe()
    }
}

impl OperatorLookup for FlowEngine {
    fn has_operator(&self, name: &str) -> bool {
        FlowEngine::has_operator(self, name)
    }
}

/// Embedded flows first, then stored flows. A stored flow never replaces an
/// embedded one; only `add_flow` with `overwrite` does.
fn initial_flows(
    config: &EngineConfig,
    store: Option<&FlowStore>,
) -> Result<BTreeMap<String, FlowDesc>> {
    let mut flows = BTreeMap::new();
    if config.load_embedded_flows {
        for (id, mut desc) in storage::embedded_flows() {
            desc.id = id.clone();
            desc.dedup_tags();
            flows.insert(id, desc);
        }
    }
    if let Some(store) = store {
        for (id, mut desc) in store.load_all()? {
            if validate_flow_id(&id).is_err() {
                tracing::warn!("Skipping stored flow with invalid id \"{}\"", id);
                continue;
            }
            if flows.contains_key(&id) {
                tracing::warn!("Skipping stored flow \"{}\", an embedded flow has the same id", id);
                continue;
            }
            desc.dedup_tags();
            flows.insert(id, desc);
        }
    }
    Ok(flows)
}
