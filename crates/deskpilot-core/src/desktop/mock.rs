//! In-memory desktop
//!
//! Implements all three collaborator traits against simulated state. Used by
//! the CLI when no real device backend is available, and by tests to observe
//! exactly which inputs reached the "machine" and when.

use std::time::{Duration, Instant};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use parking_lot::Mutex;

use super::{
    BoundingBox, CollabResult, InputDriver, KeyModifier, MouseButton, ProcessIdentifier,
    ScreenCapture, ScreenshotData, ScrollDirection, UiDetector, UiElement, WindowInfo,
};
use crate::automation::InputAction;
use crate::error::CollaboratorError;

/// Placeholder image payload (PNG signature only)
const FAKE_PNG: &[u8] = b"\x89PNG\r\n\x1a\n";

type InputFailure = Box<dyn Fn(&InputAction) -> bool + Send + Sync>;

/// An input the mock received, with the instant it arrived
#[derive(Debug, Clone)]
pub struct MockCall {
    pub input: InputAction,
    pub at: Instant,
}

struct MockState {
    elements: Vec<UiElement>,
    window: WindowInfo,
    pointer: (i32, i32),
    capture_failure: Option<String>,
    detection_failure: Option<String>,
    window_failure: Option<String>,
    input_failure: Option<(InputFailure, String)>,
    calls: Vec<MockCall>,
    captures: usize,
    closed: Vec<(String, ProcessIdentifier)>,
}

/// Simulated screen, vision and input provider
pub struct MockDesktop {
    screen_size: (u32, u32),
    /// Delay applied to every capture call
    capture_latency: Duration,
    state: Mutex<MockState>,
}

impl MockDesktop {
    pub fn new() -> Self {
        Self {
            screen_size: (1920, 1080),
            capture_latency: Duration::ZERO,
            state: Mutex::new(MockState {
                elements: Vec::new(),
                window: WindowInfo {
                    pid: 1,
                    title: "Desktop".into(),
                    width: 1920,
                    height: 1080,
                    is_active: true,
                    process_name: "desktop".into(),
                    ..Default::default()
                },
                pointer: (0, 0),
                capture_failure: None,
                detection_failure: None,
                window_failure: None,
                input_failure: None,
                calls: Vec::new(),
                captures: 0,
                closed: Vec::new(),
            }),
        }
    }

    /// A desktop with a small, plausible set of on-screen elements
    pub fn with_sample_screen() -> Self {
        let button = |text: &str, x: i32| UiElement {
            element_type: "button".into(),
            text: Some(text.into()),
            bounding_box: BoundingBox { x, y: 1040, width: 80, height: 30 },
            clickable: true,
            visible: true,
        };
        Self::new().with_elements(vec![
            button("Start", 10),
            button("Files", 100),
            UiElement {
                element_type: "text_field".into(),
                text: Some("Search".into()),
                bounding_box: BoundingBox { x: 200, y: 1040, width: 300, height: 30 },
                clickable: true,
                visible: true,
            },
        ])
    }

    pub fn with_screen_size(mut self, width: u32, height: u32) -> Self {
        self.screen_size = (width, height);
        self
    }

    pub fn with_capture_latency(mut self, latency: Duration) -> Self {
        self.capture_latency = latency;
        self
    }

    pub fn with_elements(self, elements: Vec<UiElement>) -> Self {
        self.state.lock().elements = elements;
        self
    }

    pub fn with_window(self, window: WindowInfo) -> Self {
        self.state.lock().window = window;
        self
    }

    pub fn set_pointer(&self, x: i32, y: i32) {
        self.state.lock().pointer = (x, y);
    }

    /// Make every screen capture fail (`None` restores it)
    pub fn fail_screen_capture(&self, reason: Option<&str>) {
        self.state.lock().capture_failure = reason.map(str::to_owned);
    }

    pub fn fail_ui_detection(&self, reason: Option<&str>) {
        self.state.lock().detection_failure = reason.map(str::to_owned);
    }

    pub fn fail_window_query(&self, reason: Option<&str>) {
        self.state.lock().window_failure = reason.map(str::to_owned);
    }

    /// Fail every input matching `predicate`. Failing inputs are still logged.
    pub fn fail_input_when<P>(&self, predicate: P, reason: &str)
    where
        P: Fn(&InputAction) -> bool + Send + Sync + 'static,
    {
        self.state.lock().input_failure = Some((Box::new(predicate), reason.to_owned()));
    }

    pub fn clear_input_failure(&self) {
        self.state.lock().input_failure = None;
    }

    /// Every input received so far, in arrival order
    pub fn calls(&self) -> Vec<MockCall> {
        self.state.lock().calls.clone()
    }

    pub fn inputs(&self) -> Vec<InputAction> {
        self.state.lock().calls.iter().map(|c| c.input.clone()).collect()
    }

    pub fn capture_count(&self) -> usize {
        self.state.lock().captures
    }

    pub fn closed_applications(&self) -> Vec<(String, ProcessIdentifier)> {
        self.state.lock().closed.clone()
    }

    fn receive(&self, input: InputAction) -> CollabResult<()> {
        let mut state = self.state.lock();
        let failure = state
            .input_failure
            .as_ref()
            .filter(|(predicate, _)| predicate(&input))
            .map(|(_, reason)| reason.clone());

        match &input {
            InputAction::MouseClick { x, y, .. } | InputAction::MouseScroll { x, y, .. } => {
                state.pointer = (*x, *y);
            }
            InputAction::MouseDrag { to_x, to_y, .. } => state.pointer = (*to_x, *to_y),
            _ => {}
        }
        state.calls.push(MockCall {
            input,
            at: Instant::now(),
        });

        match failure {
            Some(reason) => Err(CollaboratorError::Input(reason)),
            None => Ok(()),
        }
    }
}

impl Default for MockDesktop {
    fn default() -> Self {
        Self::new()
    }
}

impl ScreenCapture for MockDesktop {
    fn capture_screen(&self, display: u32) -> CollabResult<ScreenshotData> {
        if !self.capture_latency.is_zero() {
            std::thread::sleep(self.capture_latency);
        }
        let mut state = self.state.lock();
        if let Some(reason) = &state.capture_failure {
            return Err(CollaboratorError::Capture(reason.clone()));
        }
        state.captures += 1;
        Ok(ScreenshotData {
            timestamp: Utc::now(),
            image_base64: STANDARD.encode(FAKE_PNG),
            width: self.screen_size.0,
            height: self.screen_size.1,
            display_id: display,
            file_path: None,
        })
    }
}

impl UiDetector for MockDesktop {
    fn detect_ui_elements(&self) -> CollabResult<Vec<UiElement>> {
        let state = self.state.lock();
        match &state.detection_failure {
            Some(reason) => Err(CollaboratorError::Detection(reason.clone())),
            None => Ok(state.elements.clone()),
        }
    }
}

impl InputDriver for MockDesktop {
    fn click_at(&self, x: i32, y: i32, button: MouseButton) -> CollabResult<()> {
        self.receive(InputAction::MouseClick { x, y, button })
    }

    fn drag_to(&self, from: (i32, i32), to: (i32, i32)) -> CollabResult<()> {
        self.receive(InputAction::MouseDrag {
            from_x: from.0,
            from_y: from.1,
            to_x: to.0,
            to_y: to.1,
        })
    }

    fn scroll(&self, x: i32, y: i32, direction: ScrollDirection, amount: u32) -> CollabResult<()> {
        self.receive(InputAction::MouseScroll { x, y, direction, amount })
    }

    // Typing delays are not simulated
    fn type_text(&self, text: &str, delay: Duration) -> CollabResult<()> {
        self.receive(InputAction::KeyboardType {
            text: text.to_owned(),
            delay_ms: delay.as_millis() as u64,
        })
    }

    fn press_key(&self, key: &str, modifiers: &[KeyModifier]) -> CollabResult<()> {
        self.receive(InputAction::KeyboardKey {
            key: key.to_owned(),
            modifiers: modifiers.to_vec(),
        })
    }

    fn active_window(&self) -> CollabResult<WindowInfo> {
        let state = self.state.lock();
        match &state.window_failure {
            Some(reason) => Err(CollaboratorError::Window(reason.clone())),
            None => Ok(state.window.clone()),
        }
    }

    fn mouse_position(&self) -> (i32, i32) {
        self.state.lock().pointer
    }

    fn launch_application(&self, path: &str, args: &[String]) -> CollabResult<()> {
        self.receive(InputAction::AppLaunch {
            path: path.to_owned(),
            args: args.to_vec(),
        })
    }

    fn close_application(&self, identifier: &str, kind: ProcessIdentifier) -> CollabResult<()> {
        self.state.lock().closed.push((identifier.to_owned(), kind));
        Ok(())
    }
}
