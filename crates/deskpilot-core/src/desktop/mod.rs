//! Desktop collaborators
//!
//! The engine never touches the screen, the pointer or the keyboard itself.
//! It talks to three capability providers:
//! - [`ScreenCapture`] grabs an encoded image of a display
//! - [`UiDetector`] finds UI elements on the current screen
//! - [`InputDriver`] injects mouse/keyboard input and queries windows
//!
//! All three are blocking, side-effecting calls on machine-wide state. The
//! [`Desktop`] bundle runs them on Tokio's blocking pool so a slow device call
//! never stalls the orchestrator's control plane.

pub mod mock;
pub mod screenshot;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CollaboratorError, Error, Result};

pub use mock::MockDesktop;
pub use screenshot::save_screenshot;

/// Result type returned by collaborator calls
pub type CollabResult<T> = std::result::Result<T, CollaboratorError>;

/// A captured display image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenshotData {
    pub timestamp: DateTime<Utc>,
    /// PNG payload, base64 encoded
    pub image_base64: String,
    pub width: u32,
    pub height: u32,
    pub display_id: u32,
    /// Set once the image has been written to disk
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,
}

impl ScreenshotData {
    /// Metadata without the image payload, for step results and logs
    pub fn summary(&self) -> serde_json::Value {
        serde_json::json!({
            "timestamp": self.timestamp,
            "width": self.width,
            "height": self.height,
            "display_id": self.display_id,
            "file_path": self.file_path,
        })
    }
}

/// A rectangular area on screen
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// A detected UI element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiElement {
    /// Element type tag ("button", "text_field", ...)
    #[serde(rename = "type")]
    pub element_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub bounding_box: BoundingBox,
    pub clickable: bool,
    pub visible: bool,
}

/// Information about a top-level window
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowInfo {
    pub pid: i32,
    pub title: String,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub is_active: bool,
    pub process_name: String,
}

/// Mouse button for click actions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    #[default]
    Left,
    Right,
    #[serde(alias = "center")]
    Middle,
    /// Left button double click
    Double,
}

impl fmt::Display for MouseButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Left => "left",
            Self::Right => "right",
            Self::Middle => "middle",
            Self::Double => "double",
        };
        f.write_str(name)
    }
}

/// Scroll direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

impl fmt::Display for ScrollDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Left => "left",
            Self::Right => "right",
        };
        f.write_str(name)
    }
}

/// Keyboard modifier held while a key is pressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyModifier {
    #[serde(alias = "control")]
    Ctrl,
    Shift,
    Alt,
    /// Command / Super / Windows key
    #[serde(alias = "cmd", alias = "super", alias = "command")]
    Meta,
}

impl fmt::Display for KeyModifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ctrl => "ctrl",
            Self::Shift => "shift",
            Self::Alt => "alt",
            Self::Meta => "meta",
        };
        f.write_str(name)
    }
}

/// How `close_application` identifies its target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessIdentifier {
    Name,
    Pid,
}

impl FromStr for ProcessIdentifier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "name" => Ok(Self::Name),
            "pid" => Ok(Self::Pid),
            other => Err(Error::invalid_params(
                "close",
                format!("unsupported identifier type: {}", other),
            )),
        }
    }
}

/// Screen capture capability
pub trait ScreenCapture: Send + Sync {
    /// Capture one display as an encoded image
    fn capture_screen(&self, display: u32) -> CollabResult<ScreenshotData>;
}

/// UI element detection capability
pub trait UiDetector: Send + Sync {
    fn detect_ui_elements(&self) -> CollabResult<Vec<UiElement>>;
}

/// Low-level input injection and window queries
///
/// Every method blocks until the host has applied the input.
pub trait InputDriver: Send + Sync {
    fn click_at(&self, x: i32, y: i32, button: MouseButton) -> CollabResult<()>;

    fn drag_to(&self, from: (i32, i32), to: (i32, i32)) -> CollabResult<()>;

    fn scroll(&self, x: i32, y: i32, direction: ScrollDirection, amount: u32) -> CollabResult<()>;

    /// Type text one character at a time, pausing `delay` between characters
    fn type_text(&self, text: &str, delay: Duration) -> CollabResult<()>;

    fn press_key(&self, key: &str, modifiers: &[KeyModifier]) -> CollabResult<()>;

    fn active_window(&self) -> CollabResult<WindowInfo>;

    fn mouse_position(&self) -> (i32, i32);

    fn launch_application(&self, path: &str, args: &[String]) -> CollabResult<()>;

    fn close_application(&self, identifier: &str, kind: ProcessIdentifier) -> CollabResult<()>;
}

/// Bundle of collaborator handles injected into the agent
#[derive(Clone)]
pub struct Desktop {
    pub screen: Arc<dyn ScreenCapture>,
    pub vision: Arc<dyn UiDetector>,
    pub input: Arc<dyn InputDriver>,
}

impl Desktop {
    pub fn new(
        screen: Arc<dyn ScreenCapture>,
        vision: Arc<dyn UiDetector>,
        input: Arc<dyn InputDriver>,
    ) -> Self {
        Self { screen, vision, input }
    }

    /// Use a single provider for all three capabilities
    pub fn uniform<T>(provider: Arc<T>) -> Self
    where
        T: ScreenCapture + UiDetector + InputDriver + 'static,
    {
        Self {
            screen: provider.clone(),
            vision: provider.clone(),
            input: provider,
        }
    }

    pub async fn capture_screen(&self, display: u32) -> CollabResult<ScreenshotData> {
        let screen = self.screen.clone();
        offload(move || screen.capture_screen(display), CollaboratorError::Capture).await
    }

    pub async fn detect_ui_elements(&self) -> CollabResult<Vec<UiElement>> {
        let vision = self.vision.clone();
        offload(move || vision.detect_ui_elements(), CollaboratorError::Detection).await
    }

    pub async fn active_window(&self) -> CollabResult<WindowInfo> {
        let input = self.input.clone();
        offload(move || input.active_window(), CollaboratorError::Window).await
    }

    pub async fn mouse_position(&self) -> (i32, i32) {
        let input = self.input.clone();
        offload(move || Ok(input.mouse_position()), CollaboratorError::Input)
            .await
            .unwrap_or_default()
    }
}

/// Run a blocking collaborator call on the blocking pool
///
/// A panic inside the provider is reported through `wrap` rather than
/// unwinding into the caller's task.
pub(crate) async fn offload<T, F>(
    call: F,
    wrap: fn(String) -> CollaboratorError,
) -> CollabResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> CollabResult<T> + Send + 'static,
{
    match tokio::task::spawn_blocking(call).await {
        Ok(result) => result,
        Err(e) => Err(wrap(format!("provider call aborted: {}", e))),
    }
}
