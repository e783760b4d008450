//! Core abstractions for the home-integration flow engine
//!
//! This crate provides the data model (output envelopes, function arguments,
//! flow descriptions, tags), the operator and hook contracts, and the event
//! bus. It does not execute anything by itself.

mod alert;
mod arguments;
pub mod duration;
mod error;
pub mod events;
mod flow_desc;
pub mod hook;
pub mod io;
mod operator;
pub mod tags;

pub use alert::{full_alert_name, SystemAlert, SEVERITY_FAULT, SEVERITY_HOOK};
pub use arguments::FunctionArguments;
pub use duration::parse_duration;
pub use error::{DurationError, FlowError, HookError, SubstitutionError, ValidationError};
pub use events::{EventBus, EventBusHook, ExecutionEvent};
pub use flow_desc::{FlowDesc, OperatorLookup, StepDesc, ROOT_SYMBOL};
pub use hook::{AlertHook, ExecutionHook, FlowChangedHook, Hook, HookResult};
pub use io::{status, OperatorIO, Output};
pub use operator::{Context, ExecutionId, Operator};

/// Result type for flow operations
pub type Result<T> = std::result::Result<T, FlowError>;
