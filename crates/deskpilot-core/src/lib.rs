//! Deskpilot Core - task orchestration and action replay for desktop automation
//!
//! This crate provides the engine behind Deskpilot:
//! - The agent orchestrator (activation, task queue, plan/execute lifecycle)
//! - Typed plans and step execution
//! - Action recording and timed playback
//! - Context snapshots with a bounded rolling history
//! - Collaborator traits for screen capture, UI detection and input
//! - Observer events, configuration and a learning-event store

pub mod agent;
pub mod automation;
pub mod bounded;
pub mod config;
pub mod context;
pub mod desktop;
pub mod error;
pub mod event;
pub mod memory;
pub mod task;

pub use agent::{Agent, AgentBuilder, AgentStatus};
pub use automation::{
    Action, ActionRecorder, Automation, InputAction, PlaybackProgress, load_recording,
    save_recording,
};
pub use config::{Config, ConfigManager};
pub use context::{ContextSnapshot, ContextSnapshotter};
pub use desktop::{
    BoundingBox, Desktop, InputDriver, KeyModifier, MockDesktop, MouseButton, ProcessIdentifier,
    ScreenCapture, ScreenshotData, ScrollDirection, UiDetector, UiElement, WindowInfo,
};
pub use error::{CollaboratorError, Error, Result};
pub use event::{AgentEvent, BroadcastSink, EventSink, NullSink, TracingSink};
pub use memory::{LearningEvent, LearningStore};
pub use task::{
    FixedPlanner, Plan, PlanRequest, PlanStep, Planner, StepAction, StepStatus, SurveyPlanner,
    Task, TaskId, TaskResult, TaskStatus, TaskStep, TaskStore, TaskType,
};
