//! Learning events
//!
//! Long-term, append-only record of what the agent did and how it went.
//! Nothing in the engine reads it back yet; it exists so outcomes and user
//! feedback can be mined later.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::bounded::BoundedLog;
use crate::context::ContextSnapshot;

pub const TASK_OUTCOME: &str = "task_outcome";
pub const USER_FEEDBACK: &str = "user_feedback";

/// One learning record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningEvent {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub event_type: String,
    /// Snapshot that was current when the event happened
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<ContextSnapshot>,
    pub action: Value,
    pub outcome: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    pub confidence: f64,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl LearningEvent {
    pub fn new(event_type: impl Into<String>, action: Value, outcome: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            event_type: event_type.into(),
            context: None,
            action,
            outcome: outcome.into(),
            feedback: None,
            confidence: 0.0,
            metadata: Map::new(),
        }
    }

    pub fn with_context(mut self, context: Option<ContextSnapshot>) -> Self {
        self.context = context;
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_feedback(mut self, feedback: impl Into<String>) -> Self {
        self.feedback = Some(feedback.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Bounded store of learning events
pub struct LearningStore {
    events: RwLock<BoundedLog<LearningEvent>>,
}

impl LearningStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: RwLock::new(BoundedLog::new(capacity)),
        }
    }

    pub fn record(&self, event: LearningEvent) {
        self.events.write().push(event);
    }

    pub fn events(&self) -> Vec<LearningEvent> {
        self.events.read().to_vec()
    }

    /// Events of one type, oldest first
    pub fn events_of(&self, event_type: &str) -> Vec<LearningEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for LearningStore {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_clamped() {
        let event = LearningEvent::new(TASK_OUTCOME, Value::Null, "completed").with_confidence(3.0);
        assert_eq!(event.confidence, 1.0);
    }

    #[test]
    fn test_filter_by_type() {
        let store = LearningStore::new(2);
        store.record(LearningEvent::new(TASK_OUTCOME, Value::Null, "failed"));
        store.record(LearningEvent::new(USER_FEEDBACK, Value::Null, "noted"));
        store.record(LearningEvent::new(USER_FEEDBACK, Value::Null, "noted"));

        assert_eq!(store.len(), 2);
        assert!(store.events_of(TASK_OUTCOME).is_empty());
        assert_eq!(store.events_of(USER_FEEDBACK).len(), 2);
    }
}
