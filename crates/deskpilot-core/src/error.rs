//! Error types for Deskpilot Core

use thiserror::Error;

/// Result type alias using Deskpilot Error
pub type Result<T> = std::result::Result<T, Error>;

/// Deskpilot error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("Agent is already active")]
    AlreadyActive,

    #[error("Agent is not active")]
    NotActive,

    #[error("Recording already in progress")]
    AlreadyRecording,

    #[error("Unsupported step action: {0}")]
    UnsupportedStep(String),

    #[error("Invalid parameters for '{action}': {reason}")]
    InvalidParameters { action: String, reason: String },

    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    #[error("Planning failed: {0}")]
    Planning(String),

    #[error("Playback failed at action {index}: {source}")]
    Playback {
        index: usize,
        #[source]
        source: Box<Error>,
    },

    #[error("Task deadline of {0} seconds exceeded")]
    Timeout(u64),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Agent error: {0}")]
    Agent(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for a parameter decoding failure
    pub fn invalid_params(action: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidParameters {
            action: action.into(),
            reason: reason.to_string(),
        }
    }

    /// Index of the failing action, for playback failures
    pub fn playback_index(&self) -> Option<usize> {
        match self {
            Self::Playback { index, .. } => Some(*index),
            _ => None,
        }
    }
}

/// Errors raised by the external capability providers (screen, vision, input)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CollaboratorError {
    #[error("Screen capture failed: {0}")]
    Capture(String),

    #[error("UI detection failed: {0}")]
    Detection(String),

    #[error("Input injection failed: {0}")]
    Input(String),

    #[error("Window query failed: {0}")]
    Window(String),

    #[error("Process control failed: {0}")]
    Process(String),
}
