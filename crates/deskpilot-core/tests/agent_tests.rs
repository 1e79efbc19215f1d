//! Agent orchestration tests
//!
//! End-to-end runs of the agent against the mock desktop with scripted plans.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use deskpilot_core::agent::Agent;
use deskpilot_core::automation::InputAction;
use deskpilot_core::config::Config;
use deskpilot_core::desktop::{Desktop, MockDesktop};
use deskpilot_core::error::{Error, Result};
use deskpilot_core::event::{AgentEvent, BroadcastSink};
use deskpilot_core::task::{
    FixedPlanner, Plan, PlanRequest, PlanStep, Planner, StepStatus, TaskStatus,
};
use parking_lot::Mutex;
use serde_json::json;
use tempfile::TempDir;

const WAIT: Duration = Duration::from_secs(5);

/// Quiet config: the monitor loop stays out of the way
fn test_config() -> Config {
    let mut config = Config::default();
    config.agent.monitor_interval_ms = 60_000;
    config
}

fn wait_plan(ms: u64) -> Plan {
    Plan::new("wait").step(PlanStep::new("wait").param("duration", ms))
}

struct Harness {
    agent: Agent,
    mock: Arc<MockDesktop>,
    events: BroadcastSink,
}

fn harness(planner: Arc<dyn Planner>, config: Config) -> Harness {
    let mock = Arc::new(MockDesktop::with_sample_screen());
    let events = BroadcastSink::new(1024);
    let agent = Agent::builder(Desktop::uniform(mock.clone()))
        .planner(planner)
        .config(config)
        .events(Arc::new(events.clone()))
        .build();
    Harness { agent, mock, events }
}

fn fixed(plan: Plan) -> Arc<dyn Planner> {
    Arc::new(FixedPlanner::new(plan))
}

/// Captures what the planner was shown
#[derive(Default)]
struct SpyPlanner {
    seen: Mutex<Vec<(bool, usize)>>,
    models: Mutex<Vec<String>>,
}

#[async_trait]
impl Planner for SpyPlanner {
    async fn plan(&self, request: PlanRequest<'_>) -> Result<Plan> {
        self.seen
            .lock()
            .push((request.screenshot.is_some(), request.ui_elements.len()));
        self.models.lock().push(request.settings.model.clone());
        Ok(wait_plan(1))
    }
}

struct BrokenPlanner;

#[async_trait]
impl Planner for BrokenPlanner {
    async fn plan(&self, _request: PlanRequest<'_>) -> Result<Plan> {
        Err(Error::Agent("model unavailable".into()))
    }
}

mod lifecycle_tests {
    use super::*;

    #[test]
    fn test_start_outside_runtime_fails() {
        let h = harness(fixed(wait_plan(1)), test_config());
        assert!(matches!(h.agent.start(), Err(Error::Agent(_))));
        assert!(!h.agent.is_active());
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let h = harness(fixed(wait_plan(1)), test_config());
        h.agent.start().unwrap();
        assert!(matches!(h.agent.start(), Err(Error::AlreadyActive)));
        assert!(h.agent.status().active);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let h = harness(fixed(wait_plan(1)), test_config());
        let mut rx = h.events.subscribe();
        h.agent.start().unwrap();
        h.agent.stop();
        h.agent.stop();

        let mut status_events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let AgentEvent::AgentStatusChanged { active, .. } = event {
                status_events.push(active);
            }
        }
        assert_eq!(status_events, vec![true, false]);
        assert!(!h.agent.is_active());
    }

    #[tokio::test]
    async fn test_submit_while_inactive_leaves_store_untouched() {
        let h = harness(fixed(wait_plan(1)), test_config());

        assert!(matches!(h.agent.submit_task("click nothing", 0), Err(Error::NotActive)));
        assert!(h.agent.queued_tasks().is_empty());
        assert!(h.agent.task_history().is_empty());

        h.agent.start().unwrap();
        h.agent.stop();
        assert!(matches!(h.agent.submit_task("too late", 0), Err(Error::NotActive)));
        assert!(h.agent.queued_tasks().is_empty());
    }

    #[tokio::test]
    async fn test_start_after_shutdown_fails() {
        let h = harness(fixed(wait_plan(1)), test_config());
        h.agent.start().unwrap();
        h.agent.shutdown().await;
        assert!(matches!(h.agent.start(), Err(Error::Agent(_))));
    }
}

mod execution_tests {
    use super::*;

    #[tokio::test]
    async fn test_wait_task_completes() {
        let h = harness(fixed(wait_plan(10)), test_config());
        h.agent.start().unwrap();

        let submitted = h.agent.submit_task("click nothing", 0).unwrap();
        assert!(matches!(submitted.status, TaskStatus::Pending | TaskStatus::Running));

        let task = h.agent.wait_for_task(&submitted.id, WAIT).await.unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.steps.len(), 1);
        assert_eq!(task.steps[0].status, StepStatus::Completed);
        assert_eq!(task.steps[0].id, format!("{}_step_1", task.id));
        assert!(task.steps[0].duration_ms.unwrap() >= 10);
        assert!(task.result.unwrap().success);

        assert!(h.agent.queued_tasks().is_empty());
        assert_eq!(h.agent.task_history().len(), 1);
        assert!(h.agent.status().current_task.is_none());
    }

    #[tokio::test]
    async fn test_ids_are_unique() {
        let h = harness(fixed(Plan::default()), test_config());
        h.agent.start().unwrap();

        let mut ids = HashSet::new();
        for i in 0..50 {
            let task = h.agent.submit_task(format!("task {}", i), i).unwrap();
            assert!(matches!(task.status, TaskStatus::Pending | TaskStatus::Running));
            assert!(ids.insert(task.id));
        }
        for id in &ids {
            let task = h.agent.wait_for_task(id, WAIT).await.unwrap();
            assert_eq!(task.status, TaskStatus::Completed);
        }
    }

    #[tokio::test]
    async fn test_steps_follow_plan_order() {
        let plan = Plan::new("form")
            .step(PlanStep::new("click").param("x", 10).param("y", 20))
            .step(PlanStep::new("type").param("text", "hello").param("delay", 0))
            .step(PlanStep::new("key").param("key", "enter").param("modifiers", json!(["ctrl"])))
            .step(PlanStep::new("capture"))
            .step(PlanStep::new("analyze"));
        let h = harness(fixed(plan), test_config());
        h.agent.start().unwrap();

        let task = h.agent.submit_task("fill the form", 0).unwrap();
        let task = h.agent.wait_for_task(&task.id, WAIT).await.unwrap();

        assert_eq!(task.status, TaskStatus::Completed);
        let kinds: Vec<_> = task.steps.iter().map(|s| s.action.as_str()).collect();
        assert_eq!(kinds, vec!["click", "type", "key", "capture", "analyze"]);
        assert_eq!(task.steps[4].result.as_ref().unwrap().as_array().unwrap().len(), 3);

        let result = task.result.unwrap();
        assert_eq!(result.actions.len(), 3);
        assert_eq!(result.screenshots.len(), 1);

        let kinds: Vec<_> = h.mock.inputs().iter().map(|i| i.kind()).collect();
        assert_eq!(kinds, vec!["mouse_click", "keyboard_type", "keyboard_key"]);
    }

    #[tokio::test]
    async fn test_failure_leaves_strict_prefix() {
        let plan = Plan::new("broken")
            .step(PlanStep::new("click").param("x", 1).param("y", 1))
            .step(PlanStep::new("key").param("key", "f13"))
            .step(PlanStep::new("type").param("text", "never"));
        let h = harness(fixed(plan), test_config());
        h.mock.fail_input_when(
            |input| matches!(input, InputAction::KeyboardKey { .. }),
            "no such key",
        );
        h.agent.start().unwrap();

        let task = h.agent.submit_task("press an odd key", 0).unwrap();
        let task = h.agent.wait_for_task(&task.id, WAIT).await.unwrap();

        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.steps.len(), 2);
        assert_eq!(task.steps[0].status, StepStatus::Completed);
        assert_eq!(task.steps[1].status, StepStatus::Failed);
        assert!(task.steps[1].error.as_ref().unwrap().contains("no such key"));
        assert!(task.steps[1].duration_ms.is_some());

        let result = task.result.unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("no such key"));

        let kinds: Vec<_> = h.mock.inputs().iter().map(|i| i.kind()).collect();
        assert_eq!(kinds, vec!["mouse_click", "keyboard_key"]);
    }

    #[tokio::test]
    async fn test_unsupported_step_aborts() {
        let plan = wait_plan(1).step(PlanStep::new("teleport")).step(PlanStep::new("capture"));
        let h = harness(fixed(plan), test_config());
        h.agent.start().unwrap();

        let task = h.agent.submit_task("go somewhere", 0).unwrap();
        let task = h.agent.wait_for_task(&task.id, WAIT).await.unwrap();

        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.steps.len(), 2);
        assert_eq!(
            task.result.unwrap().error.as_deref(),
            Some("Unsupported step action: teleport")
        );
    }

    #[tokio::test]
    async fn test_invalid_parameters_fail_the_step() {
        let plan = Plan::new("bad").step(PlanStep::new("click").param("x", "left side").param("y", 3));
        let h = harness(fixed(plan), test_config());
        h.agent.start().unwrap();

        let task = h.agent.submit_task("click somewhere", 0).unwrap();
        let task = h.agent.wait_for_task(&task.id, WAIT).await.unwrap();

        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.steps[0].status, StepStatus::Failed);
        assert!(task.steps[0].error.as_ref().unwrap().starts_with("Invalid parameters for 'click'"));
        assert!(h.mock.inputs().is_empty());
    }

    #[tokio::test]
    async fn test_planner_failure_fails_task() {
        let h = harness(Arc::new(BrokenPlanner), test_config());
        h.agent.start().unwrap();

        let task = h.agent.submit_task("anything", 0).unwrap();
        let task = h.agent.wait_for_task(&task.id, WAIT).await.unwrap();

        assert_eq!(task.status, TaskStatus::Failed);
        assert!(task.steps.is_empty());
        assert!(task.result.unwrap().error.unwrap().starts_with("Planning failed"));
    }

    #[tokio::test]
    async fn test_oversized_plan_rejected() {
        let mut config = test_config();
        config.planner.max_steps = 1;
        let h = harness(fixed(wait_plan(1).step(PlanStep::new("wait"))), config);
        h.agent.start().unwrap();

        let task = h.agent.submit_task("too long", 0).unwrap();
        let task = h.agent.wait_for_task(&task.id, WAIT).await.unwrap();

        assert_eq!(task.status, TaskStatus::Failed);
        assert!(task.steps.is_empty());
    }

    #[tokio::test]
    async fn test_planning_proceeds_without_screenshot() {
        let spy = Arc::new(SpyPlanner::default());
        let h = harness(spy.clone(), test_config());
        h.mock.fail_screen_capture(Some("display asleep"));
        h.agent.start().unwrap();

        let task = h.agent.submit_task("blind task", 0).unwrap();
        let task = h.agent.wait_for_task(&task.id, WAIT).await.unwrap();

        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(spy.seen.lock().as_slice(), &[(false, 0)]);
    }

    #[tokio::test]
    async fn test_planner_sees_screen() {
        let spy = Arc::new(SpyPlanner::default());
        let h = harness(spy.clone(), test_config());
        h.agent.start().unwrap();

        let task = h.agent.submit_task("sighted task", 0).unwrap();
        h.agent.wait_for_task(&task.id, WAIT).await.unwrap();

        assert_eq!(spy.seen.lock().as_slice(), &[(true, 3)]);
        assert_eq!(h.agent.context_history().len(), 1);
    }

    #[tokio::test]
    async fn test_planner_receives_configured_settings() {
        let spy = Arc::new(SpyPlanner::default());
        let mut config = test_config();
        config.planner.model = "local-planner".into();
        let h = harness(spy.clone(), config);
        h.agent.start().unwrap();

        let task = h.agent.submit_task("configured task", 0).unwrap();
        h.agent.wait_for_task(&task.id, WAIT).await.unwrap();

        let mut config = h.agent.config();
        config.planner.model = "other-planner".into();
        h.agent.update_config(config);
        let task = h.agent.submit_task("reconfigured task", 0).unwrap();
        h.agent.wait_for_task(&task.id, WAIT).await.unwrap();

        assert_eq!(spy.models.lock().as_slice(), &["local-planner", "other-planner"]);
    }

    #[tokio::test]
    async fn test_updated_config_applies_to_next_task() {
        let dir = TempDir::new().unwrap();
        let h = harness(
            fixed(Plan::new("shoot").step(PlanStep::new("capture"))),
            test_config(),
        );
        h.agent.start().unwrap();

        let task = h.agent.submit_task("unsaved", 0).unwrap();
        let task = h.agent.wait_for_task(&task.id, WAIT).await.unwrap();
        assert!(task.result.unwrap().screenshots[0].file_path.is_none());

        let mut config = h.agent.config();
        config.screenshots.save_to_disk = true;
        config.screenshots.directory = dir.path().to_path_buf();
        h.agent.update_config(config);

        let task = h.agent.submit_task("saved", 0).unwrap();
        let task = h.agent.wait_for_task(&task.id, WAIT).await.unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        let saved = task.result.unwrap().screenshots[0].file_path.clone().unwrap();
        assert!(saved.starts_with(dir.path()));
        assert!(saved.exists());

        let mut config = h.agent.config();
        config.agent.task_timeout_secs = Some(0);
        h.agent.update_config(config);

        let task = h.agent.submit_task("out of time", 0).unwrap();
        let task = h.agent.wait_for_task(&task.id, WAIT).await.unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert!(task.steps[0].error.as_ref().unwrap().contains("deadline"));
        assert_eq!(h.agent.config().agent.task_timeout_secs, Some(0));
    }

    #[tokio::test]
    async fn test_deadline_fails_next_step() {
        let mut config = test_config();
        config.agent.task_timeout_secs = Some(0);
        let h = harness(fixed(wait_plan(1)), config);
        h.agent.start().unwrap();

        let task = h.agent.submit_task("in a hurry", 0).unwrap();
        let task = h.agent.wait_for_task(&task.id, WAIT).await.unwrap();

        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.steps.len(), 1);
        assert_eq!(task.steps[0].status, StepStatus::Failed);
        assert!(task.steps[0].error.as_ref().unwrap().contains("deadline"));
    }
}

mod scheduling_tests {
    use super::*;

    #[tokio::test]
    async fn test_single_current_task() {
        let h = harness(fixed(wait_plan(15)), test_config());
        h.agent.start().unwrap();

        let ids: Vec<_> = (0..5)
            .map(|i| h.agent.submit_task(format!("task {}", i), 0).unwrap().id)
            .collect();

        let mut done = false;
        while !done {
            let running = h
                .agent
                .queued_tasks()
                .iter()
                .filter(|t| t.status == TaskStatus::Running)
                .count();
            assert!(running <= 1);
            done = h.agent.task_history().len() == ids.len();
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        let finished: Vec<_> = h.agent.task_history().into_iter().map(|t| t.id).collect();
        assert_eq!(finished, ids);
    }

    #[tokio::test]
    async fn test_stop_pauses_running_task() {
        let plan = wait_plan(300).step(PlanStep::new("wait").param("duration", 300));
        let h = harness(fixed(plan), test_config());
        h.agent.start().unwrap();

        let first = h.agent.submit_task("long task", 0).unwrap();
        let second = h.agent.submit_task("queued task", 0).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(h.agent.status().current_task.unwrap().id, first.id);

        h.agent.stop();
        let paused = h.agent.wait_for_task(&first.id, WAIT).await.unwrap();
        assert_eq!(paused.status, TaskStatus::Paused);
        assert_eq!(paused.steps.len(), 1);
        assert_eq!(paused.steps[0].status, StepStatus::Completed);
        assert!(!paused.result.unwrap().success);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(h.agent.task(&second.id).unwrap().status, TaskStatus::Pending);

        h.agent.start().unwrap();
        let resumed = h.agent.wait_for_task(&second.id, WAIT).await.unwrap();
        assert_eq!(resumed.status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn test_stop_during_last_step_keeps_task_paused() {
        let h = harness(fixed(wait_plan(200)), test_config());
        h.agent.start().unwrap();

        let task = h.agent.submit_task("nearly done", 0).unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;
        h.agent.stop();

        let task = h.agent.wait_for_task(&task.id, WAIT).await.unwrap();
        assert_eq!(task.status, TaskStatus::Paused);
        assert_eq!(task.steps.len(), 1);
        assert_eq!(task.steps[0].status, StepStatus::Completed);
        let result = task.result.unwrap();
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("task paused: agent stopped"));
    }

    #[tokio::test]
    async fn test_context_history_stays_bounded() {
        let mut config = Config::default();
        config.agent.monitor_interval_ms = 10;
        config.agent.context_history_limit = 3;
        let h = harness(fixed(wait_plan(1)), config);
        h.agent.start().unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        let history = h.agent.context_history();
        assert_eq!(history.len(), 3);
        assert!(history.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        assert_eq!(h.agent.status().context_history, 3);

        h.agent.stop();
        let captures = h.mock.capture_count();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(h.mock.capture_count() <= captures + 1);
    }
}

mod observer_tests {
    use super::*;

    #[tokio::test]
    async fn test_task_events_in_order() {
        let h = harness(fixed(wait_plan(1)), test_config());
        let mut rx = h.events.subscribe();
        h.agent.start().unwrap();

        let task = h.agent.submit_task("observe me", 0).unwrap();
        h.agent.wait_for_task(&task.id, WAIT).await.unwrap();

        let mut names = Vec::new();
        while let Ok(event) = rx.try_recv() {
            names.push(event.name());
        }
        let expected = [
            "agentStatusChanged",
            "taskCreated",
            "taskStatusChanged",
            "contextUpdate",
            "taskStepCompleted",
            "taskStatusChanged",
            "taskCompleted",
        ];
        assert_eq!(names, expected);
    }

    #[tokio::test]
    async fn test_playback_emits_progress() {
        let h = harness(fixed(wait_plan(1)), test_config());
        let mut rx = h.events.subscribe();

        h.agent.start_recording().unwrap();
        h.agent.automation().press_key("a", vec![]).await.unwrap();
        h.agent.automation().press_key("b", vec![]).await.unwrap();
        let actions = h.agent.stop_recording();

        h.agent.playback(&actions, 100.0).await.unwrap();

        let mut progress = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let AgentEvent::ActionPlaybackProgress { current, total, .. } = event {
                progress.push((current, total));
            }
        }
        assert_eq!(progress, vec![(1, 2), (2, 2)]);
        assert_eq!(h.mock.inputs().len(), 4);
    }

    #[tokio::test]
    async fn test_recording_captures_task_actions() {
        let plan = Plan::new("click").step(PlanStep::new("click").param("x", 5).param("y", 6));
        let h = harness(fixed(plan), test_config());
        h.agent.start().unwrap();
        h.agent.start_recording().unwrap();
        assert!(h.agent.status().recording);

        let task = h.agent.submit_task("click once", 0).unwrap();
        h.agent.wait_for_task(&task.id, WAIT).await.unwrap();

        let recorded = h.agent.stop_recording();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].kind(), "mouse_click");
    }
}

mod learning_tests {
    use super::*;

    #[tokio::test]
    async fn test_outcomes_and_feedback_recorded() {
        let h = harness(fixed(wait_plan(1)), test_config());
        h.agent.start().unwrap();

        let task = h.agent.submit_task("learn from me", 3).unwrap();
        h.agent.wait_for_task(&task.id, WAIT).await.unwrap();
        h.agent.record_feedback(&task.id, "worked nicely").unwrap();

        let events = h.agent.learning_events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "task_outcome");
        assert_eq!(events[0].outcome, "completed");
        assert_eq!(events[0].confidence, 1.0);
        assert!(events[0].context.is_some());
        assert_eq!(events[1].event_type, "user_feedback");
        assert_eq!(events[1].feedback.as_deref(), Some("worked nicely"));

        assert!(matches!(
            h.agent.record_feedback("task_missing", "?"),
            Err(Error::TaskNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_learning_can_be_disabled() {
        let mut config = test_config();
        config.agent.learning_enabled = false;
        let h = harness(fixed(wait_plan(1)), config);
        h.agent.start().unwrap();

        let task = h.agent.submit_task("forget me", 0).unwrap();
        h.agent.wait_for_task(&task.id, WAIT).await.unwrap();
        assert!(h.agent.learning_events().is_empty());
    }
}
