//! Automation primitives, recording and playback
//!
//! [`Automation`] is the single entry point for input that changes the host:
//! clicks, drags, scrolls, typing, key presses and application launches. Every
//! primitive goes through the same dispatch path, which
//! - serializes access to the machine-wide pointer/keyboard
//! - offloads the blocking driver call
//! - hands the performed [`Action`] to the [`ActionRecorder`]
//!
//! Playback reuses the dispatch path but skips the recorder.

mod playback;
mod recorder;

pub use playback::{PlaybackProgress, normalize_speed, scaled_gap};
pub use recorder::{ActionRecorder, load_recording, save_recording};

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::desktop::{
    CollabResult, InputDriver, KeyModifier, MouseButton, ProcessIdentifier, ScrollDirection,
    offload,
};
use crate::error::{CollaboratorError, Result};

/// One replayable input primitive with its arguments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "parameters", rename_all = "snake_case")]
pub enum InputAction {
    MouseClick {
        x: i32,
        y: i32,
        #[serde(default)]
        button: MouseButton,
    },
    MouseDrag {
        from_x: i32,
        from_y: i32,
        to_x: i32,
        to_y: i32,
    },
    MouseScroll {
        x: i32,
        y: i32,
        direction: ScrollDirection,
        amount: u32,
    },
    KeyboardType {
        text: String,
        delay_ms: u64,
    },
    KeyboardKey {
        key: String,
        #[serde(default)]
        modifiers: Vec<KeyModifier>,
    },
    AppLaunch {
        path: String,
        #[serde(default)]
        args: Vec<String>,
    },
}

impl InputAction {
    /// Recorded kind name (`mouse_click`, `keyboard_type`, ...)
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MouseClick { .. } => "mouse_click",
            Self::MouseDrag { .. } => "mouse_drag",
            Self::MouseScroll { .. } => "mouse_scroll",
            Self::KeyboardType { .. } => "keyboard_type",
            Self::KeyboardKey { .. } => "keyboard_key",
            Self::AppLaunch { .. } => "app_launch",
        }
    }

    /// Human-readable one-liner
    pub fn describe(&self) -> String {
        match self {
            Self::MouseClick { x, y, button } => format!("Click {} at ({}, {})", button, x, y),
            Self::MouseDrag { from_x, from_y, to_x, to_y } => {
                format!("Drag from ({}, {}) to ({}, {})", from_x, from_y, to_x, to_y)
            }
            Self::MouseScroll { x, y, direction, amount } => {
                format!("Scroll {} by {} at ({}, {})", direction, amount, x, y)
            }
            Self::KeyboardType { text, .. } => format!("Type: {}", text),
            Self::KeyboardKey { key, modifiers } => {
                let mut combo: Vec<String> = modifiers.iter().map(|m| m.to_string()).collect();
                combo.push(key.clone());
                format!("Press: {}", combo.join("+"))
            }
            Self::AppLaunch { path, .. } => format!("Launch: {}", path),
        }
    }

    /// Apply this input through a driver (blocking)
    pub fn apply(&self, driver: &dyn InputDriver) -> CollabResult<()> {
        match self {
            Self::MouseClick { x, y, button } => driver.click_at(*x, *y, *button),
            Self::MouseDrag { from_x, from_y, to_x, to_y } => {
                driver.drag_to((*from_x, *from_y), (*to_x, *to_y))
            }
            Self::MouseScroll { x, y, direction, amount } => {
                driver.scroll(*x, *y, *direction, *amount)
            }
            Self::KeyboardType { text, delay_ms } => {
                driver.type_text(text, Duration::from_millis(*delay_ms))
            }
            Self::KeyboardKey { key, modifiers } => driver.press_key(key, modifiers),
            Self::AppLaunch { path, args } => driver.launch_application(path, args),
        }
    }
}

/// A performed input primitive, timestamped at completion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub timestamp: DateTime<Utc>,
    pub action: InputAction,
    pub description: String,
}

impl Action {
    pub fn new(action: InputAction) -> Self {
        Self::at(action, Utc::now())
    }

    pub fn at(action: InputAction, timestamp: DateTime<Utc>) -> Self {
        let description = action.describe();
        Self {
            timestamp,
            action,
            description,
        }
    }

    pub fn kind(&self) -> &'static str {
        self.action.kind()
    }

    /// Arguments as a JSON object
    pub fn parameters(&self) -> serde_json::Map<String, serde_json::Value> {
        match serde_json::to_value(&self.action) {
            Ok(serde_json::Value::Object(mut map)) => match map.remove("parameters") {
                Some(serde_json::Value::Object(params)) => params,
                _ => serde_json::Map::new(),
            },
            _ => serde_json::Map::new(),
        }
    }
}

/// Input facade shared by step execution and playback
pub struct Automation {
    input: Arc<dyn InputDriver>,
    recorder: Arc<ActionRecorder>,
    /// Pointer and keyboard are a machine-wide singleton
    device: Mutex<()>,
}

impl Automation {
    pub fn new(input: Arc<dyn InputDriver>, recorder: Arc<ActionRecorder>) -> Self {
        Self {
            input,
            recorder,
            device: Mutex::new(()),
        }
    }

    pub fn recorder(&self) -> &Arc<ActionRecorder> {
        &self.recorder
    }

    /// Perform an input primitive and record it if recording is active
    pub async fn perform(&self, input: InputAction) -> Result<Action> {
        self.dispatch(&input).await?;
        let action = Action::new(input);
        self.recorder.record(action.clone());
        Ok(action)
    }

    /// Apply an input without recording it
    pub(crate) async fn dispatch(&self, input: &InputAction) -> Result<()> {
        debug!("Dispatching {}", input.describe());
        let _device = self.device.lock().await;
        let driver = self.input.clone();
        let input = input.clone();
        offload(move || input.apply(driver.as_ref()), CollaboratorError::Input).await?;
        Ok(())
    }

    pub async fn click_at(&self, x: i32, y: i32, button: MouseButton) -> Result<Action> {
        self.perform(InputAction::MouseClick { x, y, button }).await
    }

    pub async fn drag_to(&self, from: (i32, i32), to: (i32, i32)) -> Result<Action> {
        self.perform(InputAction::MouseDrag {
            from_x: from.0,
            from_y: from.1,
            to_x: to.0,
            to_y: to.1,
        })
        .await
    }

    pub async fn scroll(
        &self,
        x: i32,
        y: i32,
        direction: ScrollDirection,
        amount: u32,
    ) -> Result<Action> {
        self.perform(InputAction::MouseScroll { x, y, direction, amount }).await
    }

    pub async fn type_text(&self, text: impl Into<String>, delay_ms: u64) -> Result<Action> {
        self.perform(InputAction::KeyboardType {
            text: text.into(),
            delay_ms,
        })
        .await
    }

    pub async fn press_key(
        &self,
        key: impl Into<String>,
        modifiers: Vec<KeyModifier>,
    ) -> Result<Action> {
        self.perform(InputAction::KeyboardKey {
            key: key.into(),
            modifiers,
        })
        .await
    }

    pub async fn launch_application(
        &self,
        path: impl Into<String>,
        args: Vec<String>,
    ) -> Result<Action> {
        self.perform(InputAction::AppLaunch {
            path: path.into(),
            args,
        })
        .await
    }

    /// Close an application. Not recorded and not replayable.
    pub async fn close_application(
        &self,
        identifier: impl Into<String>,
        kind: ProcessIdentifier,
    ) -> Result<()> {
        let identifier = identifier.into();
        debug!("Closing application: {} ({:?})", identifier, kind);
        let _device = self.device.lock().await;
        let driver = self.input.clone();
        offload(
            move || driver.close_application(&identifier, kind),
            CollaboratorError::Process,
        )
        .await?;
        Ok(())
    }
}
