//! Standard operator library
//!
//! Collection of general purpose operators that flows can use next to the
//! engine's built-in `flow`, `flowbytag` and `system` operators.

mod debug;
mod http;
mod time;
mod transform;

pub use debug::OpDebug;
pub use http::OpCurl;
pub use time::OpTime;
pub use transform::OpJson;

use homeflow_core::Operator;
use homeflow_runtime::FlowEngine;
use std::sync::Arc;

/// All standard operators
pub fn all() -> Vec<Arc<dyn Operator>> {
    vec![
        Arc::new(OpDebug),
        Arc::new(OpCurl::new()),
        Arc::new(OpJson),
        Arc::new(OpTime),
    ]
}

/// Register all standard operators with an engine
pub fn register_all(engine: &FlowEngine) {
    engine.add_operators(all());
}
