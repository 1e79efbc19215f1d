//! Action recorder - bounded capture of performed input

use std::path::Path;

use parking_lot::RwLock;
use tracing::info;

use super::Action;
use crate::bounded::BoundedLog;
use crate::error::{Error, Result};

struct RecorderState {
    recording: bool,
    actions: BoundedLog<Action>,
}

/// Records performed actions while recording is active
///
/// `idle -> recording -> idle`. Starting clears the previous capture; the
/// buffer keeps only the newest `max_actions` entries.
pub struct ActionRecorder {
    state: RwLock<RecorderState>,
}

impl ActionRecorder {
    pub fn new(max_actions: usize) -> Self {
        Self {
            state: RwLock::new(RecorderState {
                recording: false,
                actions: BoundedLog::new(max_actions),
            }),
        }
    }

    /// Begin a fresh capture
    pub fn start_recording(&self) -> Result<()> {
        let mut state = self.state.write();
        if state.recording {
            return Err(Error::AlreadyRecording);
        }
        state.recording = true;
        state.actions.clear();
        info!("Started recording user actions");
        Ok(())
    }

    /// Stop capturing and return a copy of what was captured
    pub fn stop_recording(&self) -> Vec<Action> {
        let mut state = self.state.write();
        state.recording = false;
        let actions = state.actions.to_vec();
        info!("Stopped recording. Captured {} actions", actions.len());
        actions
    }

    /// Append an action if recording; returns whether it was kept
    pub fn record(&self, action: Action) -> bool {
        let mut state = self.state.write();
        if !state.recording {
            return false;
        }
        state.actions.push(action);
        true
    }

    pub fn is_recording(&self) -> bool {
        self.state.read().recording
    }

    /// Snapshot of the current buffer, oldest first
    pub fn actions(&self) -> Vec<Action> {
        self.state.read().actions.to_vec()
    }

    pub fn len(&self) -> usize {
        self.state.read().actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.state.read().actions.capacity()
    }
}

impl Default for ActionRecorder {
    fn default() -> Self {
        Self::new(1000)
    }
}

/// Write a recording as pretty JSON
pub fn save_recording(actions: &[Action], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(actions)?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Read a recording written by [`save_recording`]
pub fn load_recording(path: &Path) -> Result<Vec<Action>> {
    let json = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&json)?)
}
