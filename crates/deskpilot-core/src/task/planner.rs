//! Planning capability
//!
//! The agent asks a [`Planner`] for a [`Plan`] before executing a task. How the
//! plan is produced (a language model, a script, a fixed list) is up to the
//! implementation.

use async_trait::async_trait;
use std::fmt::Write;

use super::{Plan, PlanStep, Task};
use crate::config::PlannerConfig;
use crate::desktop::{ScreenshotData, UiElement};
use crate::error::Result;

/// Everything a planner gets to see about a task
#[derive(Debug, Clone, Copy)]
pub struct PlanRequest<'a> {
    pub task: &'a Task,
    /// Absent when the pre-planning capture failed
    pub screenshot: Option<&'a ScreenshotData>,
    pub ui_elements: &'a [UiElement],
    /// Provider, model and prompt settings from `[planner]`
    pub settings: &'a PlannerConfig,
}

/// Produces a plan for a task
#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(&self, request: PlanRequest<'_>) -> Result<Plan>;
}

/// Returns the same plan for every task
#[derive(Debug, Clone)]
pub struct FixedPlanner {
    plan: Plan,
}

impl FixedPlanner {
    pub fn new(plan: Plan) -> Self {
        Self { plan }
    }
}

#[async_trait]
impl Planner for FixedPlanner {
    async fn plan(&self, _request: PlanRequest<'_>) -> Result<Plan> {
        Ok(self.plan.clone())
    }
}

/// Looks before acting: capture the screen, then analyze it
#[derive(Debug, Clone, Copy, Default)]
pub struct SurveyPlanner;

#[async_trait]
impl Planner for SurveyPlanner {
    async fn plan(&self, request: PlanRequest<'_>) -> Result<Plan> {
        let mut plan = Plan::new("survey")
            .step(PlanStep::new("capture").describe("Take initial screenshot for analysis"))
            .step(PlanStep::new("analyze").describe("Analyze current screen content"));
        plan.analysis = Some(format!(
            "Surveying the screen for: {} ({} elements visible)",
            request.task.description,
            request.ui_elements.len()
        ));
        for (i, step) in plan.steps.iter_mut().enumerate() {
            step.step = Some(i as u32 + 1);
        }
        Ok(plan)
    }
}

/// Build the text prompt asking a language model for a structured plan
pub fn planning_prompt(request: &PlanRequest<'_>) -> String {
    let (width, height) = request
        .screenshot
        .map(|s| (s.width, s.height))
        .unwrap_or_default();

    let mut prompt = format!(
        "You are an AI agent that can control a computer to help users complete tasks.

Current Task: {}

Available capabilities:
- Take screenshots and analyze the screen
- Click on UI elements (buttons, links, etc.)
- Type text
- Press keyboard shortcuts
- Scroll, drag and navigate
- Launch applications

Current screen analysis:
- Screenshot dimensions: {}x{}
- Detected UI elements: {}

UI Elements detected:
",
        request.task.description,
        width,
        height,
        request.ui_elements.len()
    );

    for (i, element) in request.ui_elements.iter().enumerate() {
        let b = &element.bounding_box;
        let _ = writeln!(
            prompt,
            "- Element {}: {} at ({},{}) {}x{}",
            i + 1,
            element.element_type,
            b.x,
            b.y,
            b.width,
            b.height
        );
        if let Some(text) = element.text.as_deref().filter(|t| !t.is_empty()) {
            let _ = writeln!(prompt, "  Text: {}", text);
        }
    }

    prompt.push_str(
        r#"
Please analyze the current screen and provide a step-by-step plan to complete the task.
Respond with a JSON object containing:
{
  "analysis": "Your analysis of the current screen",
  "plan": [
    {
      "step": 1,
      "action": "action_type",
      "description": "What this step does",
      "parameters": {"param1": "value1"}
    }
  ]
}

Available action types:
- "click": Click at coordinates {"x", "y", "button"}
- "type": Type text {"text", "delay"}
- "key": Press keyboard key {"key", "modifiers"}
- "scroll": Scroll in direction {"x", "y", "direction", "amount"}
- "drag": Drag the pointer {"from_x", "from_y", "to_x", "to_y"}
- "launch": Launch an application {"path", "args"}
- "wait": Wait a number of milliseconds {"duration"}
- "capture": Take screenshot
- "analyze": Analyze screen content

Be specific with coordinates and parameters."#,
    );

    if let Some(extra) = request
        .settings
        .custom_instructions
        .as_deref()
        .filter(|s| !s.trim().is_empty())
    {
        prompt.push_str("\n\nAdditional instructions:\n");
        prompt.push_str(extra);
    }

    prompt
}
