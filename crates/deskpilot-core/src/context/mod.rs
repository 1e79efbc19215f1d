//! Context snapshots
//!
//! A [`ContextSnapshot`] is a point-in-time bundle of what is on screen: the
//! image, detected UI elements, the focused window and the pointer. Only the
//! screen capture is essential; every other part degrades to an empty value
//! with a warning.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use crate::bounded::BoundedLog;
use crate::desktop::{Desktop, ScreenshotData, UiElement, WindowInfo};
use crate::error::Result;

/// A sample of system state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub timestamp: DateTime<Utc>,
    pub screenshot: ScreenshotData,
    pub ui_elements: Vec<UiElement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_window: Option<WindowInfo>,
    pub mouse_position: (i32, i32),
    #[serde(default)]
    pub system_state: Map<String, Value>,
}

/// Captures snapshots and keeps the rolling context history
pub struct ContextSnapshotter {
    desktop: Desktop,
    display: u32,
    history: RwLock<BoundedLog<ContextSnapshot>>,
}

impl ContextSnapshotter {
    pub fn new(desktop: Desktop, display: u32, history_limit: usize) -> Self {
        Self {
            desktop,
            display,
            history: RwLock::new(BoundedLog::new(history_limit)),
        }
    }

    /// Assemble a fresh snapshot
    ///
    /// Fails only if the screen capture fails.
    pub async fn capture(&self) -> Result<ContextSnapshot> {
        let screenshot = self.desktop.capture_screen(self.display).await?;

        let mut system_state = Map::new();
        system_state.insert("display".into(), json!(self.display));
        system_state.insert("os".into(), json!(std::env::consts::OS));

        let ui_elements = match self.desktop.detect_ui_elements().await {
            Ok(elements) => elements,
            Err(e) => {
                warn!("UI detection failed, continuing without elements: {}", e);
                system_state.insert("detection_error".into(), json!(e.to_string()));
                Vec::new()
            }
        };

        let active_window = match self.desktop.active_window().await {
            Ok(window) => Some(window),
            Err(e) => {
                warn!("Active window query failed: {}", e);
                None
            }
        };

        let mouse_position = self.desktop.mouse_position().await;

        debug!(
            "Captured context: {}x{}, {} elements",
            screenshot.width,
            screenshot.height,
            ui_elements.len()
        );
        Ok(ContextSnapshot {
            timestamp: Utc::now(),
            screenshot,
            ui_elements,
            active_window,
            mouse_position,
            system_state,
        })
    }

    /// Append to the rolling history, dropping the oldest past capacity
    pub fn record(&self, snapshot: ContextSnapshot) {
        self.history.write().push(snapshot);
    }

    /// Oldest first
    pub fn history(&self) -> Vec<ContextSnapshot> {
        self.history.read().to_vec()
    }

    pub fn latest(&self) -> Option<ContextSnapshot> {
        self.history.read().last().cloned()
    }

    pub fn history_len(&self) -> usize {
        self.history.read().len()
    }
}
