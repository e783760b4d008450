use crate::ExecutionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Events emitted while flows execute and the flow set changes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ExecutionEvent {
    FlowStarted {
        execution_id: ExecutionId,
        flow_id: String,
        timestamp: DateTime<Utc>,
    },
    StepFinished {
        execution_id: ExecutionId,
        flow_id: String,
        step: String,
        operator: String,
        function: String,
        status: u16,
        output_kind: String,
        error: Option<String>,
        timestamp: DateTime<Utc>,
    },
    FlowFinished {
        execution_id: ExecutionId,
        flow_id: String,
        timestamp: DateTime<Utc>,
    },
    FlowsChanged {
        added: Vec<String>,
        removed: Vec<String>,
        timestamp: DateTime<Utc>,
    },
    AlertRaised {
        name: String,
        category: String,
        severity: u8,
        message: String,
        timestamp: DateTime<Utc>,
    },
    AlertReset {
        name: String,
        category: String,
        timestamp: DateTime<Utc>,
    },
}

impl ExecutionEvent {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            ExecutionEvent::FlowStarted { timestamp, .. }
            | ExecutionEvent::StepFinished { timestamp, .. }
            | ExecutionEvent::FlowFinished { timestamp, .. }
            | ExecutionEvent::FlowsChanged { timestamp, .. }
            | ExecutionEvent::AlertRaised { timestamp, .. }
            | ExecutionEvent::AlertReset { timestamp, .. } => *timestamp,
        }
    }
}

/// In-process event bus. Events sent without subscribers are dropped.
pub struct EventBus {
    sender: broadcast::Sender<ExecutionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: ExecutionEvent) {
        if self.sender.send(event).is_err() {
            tracing::trace!("Execution event dropped, no subscribers");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1000)
    }
}
