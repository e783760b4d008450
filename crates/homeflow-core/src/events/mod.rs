mod base;
mod hook;

pub use base::{EventBus, ExecutionEvent};
pub use hook::{EventBusHook, EVENT_HOOK_NAME};
