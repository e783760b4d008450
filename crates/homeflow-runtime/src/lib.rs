//! Flow execution runtime
//!
//! This crate provides the engine that stores, validates and runs flows,
//! dispatches hooks, keeps the alert book and persists flows on disk.

pub mod alerts;
mod dispatch;
mod engine;
mod execution;
mod flow;
pub mod operators;
mod registry;
pub mod storage;
pub mod timeout;

pub use alerts::{ActiveAlert, AlertBook};
pub use dispatch::HookRegistry;
pub use engine::{EngineConfig, FlowEngine, MetricsSnapshot};
pub use execution::INTERNAL_TAG;
pub use flow::Flow;
pub use registry::OperatorRegistry;
pub use storage::FlowStore;
