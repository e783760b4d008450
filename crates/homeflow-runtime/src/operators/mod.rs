//! Operators built into the engine

mod flow;
mod system;

pub use flow::{OpFlow, OpFlowByTag};
pub use system::OpSystem;

use homeflow_core::status::SERVICE_UNAVAILABLE;
use homeflow_core::OperatorIO;

fn engine_gone() -> OperatorIO {
    OperatorIO::error(SERVICE_UNAVAILABLE, "Flow engine is shutting down")
}
