//! Task management system
//!
//! Tasks represent automation work requested of the agent. The task system
//! handles:
//! - Task creation and lifecycle
//! - Plans and typed step decoding
//! - Step execution against the desktop
//! - Bounded task history

mod executor;
mod plan;
mod planner;
mod store;

pub use executor::{StepExecutor, StepOutput};
pub use plan::{Plan, PlanStep, StepAction};
pub use planner::{FixedPlanner, PlanRequest, Planner, SurveyPlanner, planning_prompt};
pub use store::TaskStore;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::automation::Action;
use crate::desktop::ScreenshotData;

/// Unique task identifier
pub type TaskId = String;

static TASK_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Allocate a fresh, time-ordered task id
pub fn next_task_id() -> TaskId {
    let seq = TASK_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("task_{:013}_{:06}", Utc::now().timestamp_millis(), seq)
}

/// Kind of task
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    #[default]
    UserRequest,
    Custom(String),
}

/// Current status of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Paused,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Paused)
    }

    /// `pending -> running -> {completed, failed, paused}`
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
                | (Self::Running, Self::Paused)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Paused => "paused",
        };
        f.write_str(name)
    }
}

/// A unit of requested automation work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub description: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Advisory only; tasks run in submission order
    pub priority: i32,
    pub steps: Vec<TaskStep>,
    #[serde(default)]
    pub context: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<TaskResult>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Task {
    pub fn new(description: impl Into<String>, priority: i32) -> Self {
        let now = Utc::now();
        Self {
            id: next_task_id(),
            task_type: TaskType::UserRequest,
            description: description.into(),
            status: TaskStatus::Pending,
            created_at: now,
            updated_at: now,
            priority,
            steps: Vec::new(),
            context: Map::new(),
            result: None,
            metadata: Map::new(),
        }
    }

    /// Move to `next` if the lifecycle allows it
    pub fn transition(&mut self, next: TaskStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        self.updated_at = Utc::now();
        true
    }

    /// Append a new step for the next plan entry and return its index
    pub fn push_step(
        &mut self,
        action: impl Into<String>,
        description: impl Into<String>,
        parameters: Map<String, Value>,
    ) -> usize {
        let ordinal = self.steps.len() + 1;
        self.steps.push(TaskStep::new(&self.id, ordinal, action, description, parameters));
        self.updated_at = Utc::now();
        ordinal - 1
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Status of a single step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// One atomic operation within a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStep {
    /// `<task id>_step_<ordinal>`
    pub id: String,
    pub action: String,
    pub description: String,
    pub status: StepStatus,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Set once the step completed or failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    pub started_at: DateTime<Utc>,
}

impl TaskStep {
    pub fn new(
        task_id: &str,
        ordinal: usize,
        action: impl Into<String>,
        description: impl Into<String>,
        parameters: Map<String, Value>,
    ) -> Self {
        Self {
            id: format!("{}_step_{}", task_id, ordinal),
            action: action.into(),
            description: description.into(),
            status: StepStatus::Running,
            parameters,
            result: None,
            error: None,
            duration_ms: None,
            started_at: Utc::now(),
        }
    }

    pub fn complete(&mut self, result: Option<Value>, duration_ms: u64) {
        self.status = StepStatus::Completed;
        self.result = result;
        self.duration_ms = Some(duration_ms);
    }

    pub fn fail(&mut self, error: impl ToString, duration_ms: u64) {
        self.status = StepStatus::Failed;
        self.error = Some(error.to_string());
        self.duration_ms = Some(duration_ms);
    }
}

/// Terminal outcome of a task
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub screenshots: Vec<ScreenshotData>,
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl TaskResult {
    pub fn success(data: Option<Value>) -> Self {
        Self {
            success: true,
            data,
            ..Default::default()
        }
    }

    pub fn failure(error: impl ToString) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
            ..Default::default()
        }
    }

    pub fn with_artifacts(mut self, screenshots: Vec<ScreenshotData>, actions: Vec<Action>) -> Self {
        self.screenshots = screenshots;
        self.actions = actions;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique_and_ordered() {
        let a = next_task_id();
        let b = next_task_id();
        assert_ne!(a, b);
        assert!(a < b);
        assert!(a.starts_with("task_"));
    }

    #[test]
    fn test_lifecycle_is_monotonic() {
        let mut task = Task::new("open the browser", 0);
        assert!(!task.transition(TaskStatus::Completed));
        assert!(task.transition(TaskStatus::Running));
        assert!(!task.transition(TaskStatus::Pending));
        assert!(task.transition(TaskStatus::Paused));
        assert!(!task.transition(TaskStatus::Running));
        assert!(task.is_finished());
    }

    #[test]
    fn test_step_ids_follow_task() {
        let mut task = Task::new("x", 0);
        task.push_step("wait", "pause", Map::new());
        task.push_step("capture", "grab", Map::new());
        assert_eq!(task.steps[1].id, format!("{}_step_2", task.id));
        assert_eq!(task.steps[0].status, StepStatus::Running);
        assert!(task.steps[0].duration_ms.is_none());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(serde_json::to_value(TaskStatus::Paused).unwrap(), "paused");
        assert_eq!(TaskStatus::Running.to_string(), "running");
    }
}
