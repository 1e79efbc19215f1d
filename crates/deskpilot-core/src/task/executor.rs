//! Step execution
//!
//! Runs one decoded [`StepAction`] against the desktop. Input steps go through
//! the shared [`Automation`] facade so they are serialized with every other
//! user of the pointer and keyboard, and recorded when recording is on.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use super::StepAction;
use crate::automation::{Action, Automation};
use crate::config::ScreenshotConfig;
use crate::desktop::{Desktop, ScreenshotData, save_screenshot};
use crate::error::Result;

/// What a successful step produced
#[derive(Debug, Clone, Default)]
pub struct StepOutput {
    /// Stored on the step
    pub result: Option<Value>,
    pub screenshot: Option<ScreenshotData>,
    /// The input primitive performed, for input steps
    pub action: Option<Action>,
}

/// Dispatches decoded steps to collaborators
pub struct StepExecutor {
    desktop: Desktop,
    automation: Arc<Automation>,
    display: u32,
    screenshots: ScreenshotConfig,
}

impl StepExecutor {
    pub fn new(
        desktop: Desktop,
        automation: Arc<Automation>,
        display: u32,
        screenshots: ScreenshotConfig,
    ) -> Self {
        Self {
            desktop,
            automation,
            display,
            screenshots,
        }
    }

    pub async fn execute(&self, step: &StepAction) -> Result<StepOutput> {
        debug!("Executing {} step", step.kind());
        match step {
            StepAction::Capture { display } => self.capture(display.unwrap_or(self.display)).await,
            StepAction::Analyze => {
                let elements = self.desktop.detect_ui_elements().await?;
                Ok(StepOutput {
                    result: Some(serde_json::to_value(&elements)?),
                    ..Default::default()
                })
            }
            StepAction::Wait { duration_ms } => {
                tokio::time::sleep(Duration::from_millis(*duration_ms)).await;
                Ok(StepOutput::default())
            }
            StepAction::Click { x, y, button } => {
                Self::performed(self.automation.click_at(*x, *y, *button).await?)
            }
            StepAction::Type { text, delay_ms } => {
                Self::performed(self.automation.type_text(text.clone(), *delay_ms).await?)
            }
            StepAction::Key { key, modifiers } => {
                Self::performed(self.automation.press_key(key.clone(), modifiers.clone()).await?)
            }
            StepAction::Scroll { x, y, direction, amount } => {
                Self::performed(self.automation.scroll(*x, *y, *direction, *amount).await?)
            }
            StepAction::Drag { from, to } => {
                Self::performed(self.automation.drag_to(*from, *to).await?)
            }
            StepAction::Launch { path, args } => Self::performed(
                self.automation
                    .launch_application(path.clone(), args.clone())
                    .await?,
            ),
        }
    }

    async fn capture(&self, display: u32) -> Result<StepOutput> {
        let mut shot = self.desktop.capture_screen(display).await?;
        if self.screenshots.save_to_disk
            && let Err(e) = save_screenshot(&mut shot, &self.screenshots.directory).await
        {
            warn!("Failed to save screenshot: {}", e);
        }
        Ok(StepOutput {
            result: Some(shot.summary()),
            screenshot: Some(shot),
            action: None,
        })
    }

    fn performed(action: Action) -> Result<StepOutput> {
        Ok(StepOutput {
            result: Some(Value::String(action.description.clone())),
            screenshot: None,
            action: Some(action),
        })
    }
}
