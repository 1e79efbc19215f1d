//! Agent notifications
//!
//! Observers receive [`AgentEvent`]s through an [`EventSink`]. Delivery is
//! fire-and-forget: the agent never waits on an observer and an event that
//! nobody receives is simply dropped.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::automation::Action;
use crate::context::ContextSnapshot;
use crate::desktop::ScreenshotData;
use crate::task::{Task, TaskStep};

/// Notifications emitted by the agent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "camelCase")]
pub enum AgentEvent {
    AgentStatusChanged { active: bool, message: String },
    TaskCreated(Task),
    TaskStatusChanged(Task),
    TaskStepCompleted(TaskStep),
    TaskCompleted(Task),
    ContextUpdate(Box<ContextSnapshot>),
    ActionPlaybackProgress {
        current: usize,
        total: usize,
        action: Action,
    },
    ScreenshotCaptured(ScreenshotData),
}

impl AgentEvent {
    /// Wire name of the event
    pub fn name(&self) -> &'static str {
        match self {
            Self::AgentStatusChanged { .. } => "agentStatusChanged",
            Self::TaskCreated(_) => "taskCreated",
            Self::TaskStatusChanged(_) => "taskStatusChanged",
            Self::TaskStepCompleted(_) => "taskStepCompleted",
            Self::TaskCompleted(_) => "taskCompleted",
            Self::ContextUpdate(_) => "contextUpdate",
            Self::ActionPlaybackProgress { .. } => "actionPlaybackProgress",
            Self::ScreenshotCaptured(_) => "screenshotCaptured",
        }
    }
}

/// Receiver of agent notifications
pub trait EventSink: Send + Sync {
    fn emit(&self, event: AgentEvent);
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: AgentEvent) {}
}

/// Logs every event at debug level
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: AgentEvent) {
        debug!(event = event.name(), "Agent event");
    }
}

/// Fans events out to any number of subscribers
///
/// Slow subscribers lag and lose the oldest events.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<AgentEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventSink for BroadcastSink {
    fn emit(&self, event: AgentEvent) {
        // No subscribers is not an error
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_shape() {
        let event = AgentEvent::AgentStatusChanged {
            active: true,
            message: "Agent started".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "agentStatusChanged");
        assert_eq!(json["payload"]["active"], true);
        assert_eq!(event.name(), "agentStatusChanged");
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_subscriber() {
        let sink = BroadcastSink::new(8);
        let mut a = sink.subscribe();
        let mut b = sink.subscribe();

        sink.emit(AgentEvent::AgentStatusChanged { active: false, message: "stopped".into() });

        assert_eq!(a.recv().await.unwrap().name(), "agentStatusChanged");
        assert_eq!(b.recv().await.unwrap().name(), "agentStatusChanged");
    }

    #[test]
    fn test_emit_without_subscribers() {
        BroadcastSink::new(1).emit(AgentEvent::AgentStatusChanged {
            active: true,
            message: String::new(),
        });
    }
}
