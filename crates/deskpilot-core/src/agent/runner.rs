//! Task worker and the plan/execute lifecycle

use std::sync::{Arc, Weak};

use chrono::Utc;
use serde_json::{Value, json};
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::AgentInner;
use crate::automation::Action;
use crate::config::Config;
use crate::desktop::ScreenshotData;
use crate::error::{Error, Result};
use crate::event::AgentEvent;
use crate::memory::{LearningEvent, TASK_OUTCOME};
use crate::task::{Plan, PlanRequest, PlanStep, StepExecutor, Task, TaskResult, TaskStatus};

const PAUSED_MESSAGE: &str = "task paused: agent stopped";

/// Run queued tasks one at a time until the agent is dropped or shut down
///
/// Holds only a weak reference while idle.
pub(super) async fn work_loop(
    agent: Weak<AgentInner>,
    wakeup: Arc<Notify>,
    shutdown: CancellationToken,
) {
    debug!("Task worker started");
    loop {
        loop {
            let Some(inner) = agent.upgrade() else {
                return;
            };
            let Some(task) = inner.claim_next() else {
                break;
            };
            inner.run_task(task).await;
        }

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = wakeup.notified() => {}
        }
    }
    debug!("Task worker stopped");
}

enum Outcome {
    Completed,
    Failed(Error),
    Paused,
}

/// What a run produced along the way
#[derive(Default)]
struct Artifacts {
    data: Option<Value>,
    screenshots: Vec<ScreenshotData>,
    actions: Vec<Action>,
}

/// Settings fixed for the whole of one task, plus what it produced
struct TaskRun {
    config: Config,
    executor: StepExecutor,
    deadline: Option<Instant>,
    artifacts: Artifacts,
}

impl AgentInner {
    /// Take the oldest pending task into the current slot
    fn claim_next(&self) -> Option<Task> {
        let mut state = self.state.write();
        if !state.active || state.current_task.is_some() {
            return None;
        }
        let task = self.store.next_pending()?;
        let running = self
            .store
            .update(&task.id, |t| t.transition(TaskStatus::Running).then(|| t.clone()))
            .flatten()?;
        state.current_task = Some(running.id.clone());
        Some(running)
    }

    fn is_paused(&self, id: &str) -> bool {
        !self.is_active()
            || self
                .store
                .get(id)
                .is_none_or(|t| t.status == TaskStatus::Paused)
    }

    async fn run_task(&self, task: Task) {
        info!("Executing task {}: {}", task.id, task.description);
        self.emit(AgentEvent::TaskStatusChanged(task.clone()));

        let config = self.config.read().clone();
        let mut run = TaskRun {
            executor: StepExecutor::new(
                self.desktop.clone(),
                self.automation.clone(),
                config.agent.display,
                config.screenshots.clone(),
            ),
            deadline: config.agent.task_timeout().map(|t| Instant::now() + t),
            artifacts: Artifacts::default(),
            config,
        };
        let outcome = self.execute(&task, &mut run).await;
        self.finish_task(&task.id, outcome, run);
    }

    async fn execute(&self, task: &Task, run: &mut TaskRun) -> Outcome {
        let snapshot = match self.snapshotter.capture().await {
            Ok(snapshot) => {
                self.snapshotter.record(snapshot.clone());
                self.emit(AgentEvent::ContextUpdate(Box::new(snapshot.clone())));
                Some(snapshot)
            }
            Err(e) => {
                warn!("Context capture failed for task {}, planning without it: {}", task.id, e);
                None
            }
        };

        if self.is_paused(&task.id) {
            return Outcome::Paused;
        }

        let request = PlanRequest {
            task,
            screenshot: snapshot.as_ref().map(|s| &s.screenshot),
            ui_elements: snapshot.as_ref().map(|s| s.ui_elements.as_slice()).unwrap_or(&[]),
            settings: &run.config.planner,
        };
        let plan = match self.request_plan(request).await {
            Ok(plan) => plan,
            Err(e) => {
                error!("Planning failed for task {}: {}", task.id, e);
                return Outcome::Failed(e);
            }
        };
        debug!("Plan for task {} has {} steps", task.id, plan.len());
        if let Some(analysis) = &plan.analysis {
            self.store.update(&task.id, |t| {
                t.metadata.insert("analysis".into(), json!(analysis));
            });
        }

        for step in &plan.steps {
            if self.is_paused(&task.id) {
                return Outcome::Paused;
            }
            if let Err(e) = self.run_step(&task.id, step, run).await {
                error!("Task {} failed at step '{}': {}", task.id, step.action, e);
                return Outcome::Failed(e);
            }
        }
        Outcome::Completed
    }

    async fn request_plan(&self, request: PlanRequest<'_>) -> Result<Plan> {
        let max_steps = request.settings.max_steps;
        let plan = self.planner.plan(request).await.map_err(|e| match e {
            Error::Planning(_) => e,
            other => Error::Planning(other.to_string()),
        })?;

        if plan.len() > max_steps {
            return Err(Error::Planning(format!(
                "plan has {} steps, limit is {}",
                plan.len(),
                max_steps
            )));
        }
        Ok(plan)
    }

    /// Append the step, decode it, execute it and record the outcome
    async fn run_step(
        &self,
        task_id: &str,
        step: &PlanStep,
        run: &mut TaskRun,
    ) -> Result<()> {
        let index = self
            .store
            .update(task_id, |t| {
                t.push_step(step.action.clone(), step.description.clone(), step.parameters.clone())
            })
            .ok_or_else(|| Error::TaskNotFound(task_id.to_string()))?;

        let started = Instant::now();
        let result = match run.deadline {
            Some(deadline) if started >= deadline => Err(Error::Timeout(
                run.config.agent.task_timeout_secs.unwrap_or_default(),
            )),
            _ => match step.decode() {
                Ok(action) => run.executor.execute(&action).await,
                Err(e) => Err(e),
            },
        };
        let elapsed = started.elapsed().as_millis() as u64;

        match result {
            Ok(output) => {
                if let Some(shot) = output.screenshot {
                    self.emit(AgentEvent::ScreenshotCaptured(shot.clone()));
                    run.artifacts.screenshots.push(shot);
                }
                run.artifacts.actions.extend(output.action);
                run.artifacts.data = output.result.clone();

                let completed = self.store.update(task_id, |t| {
                    t.updated_at = Utc::now();
                    let s = &mut t.steps[index];
                    s.complete(output.result, elapsed);
                    s.clone()
                });
                if let Some(step) = completed {
                    debug!("Step {} completed in {}ms", step.id, elapsed);
                    self.emit(AgentEvent::TaskStepCompleted(step));
                }
                Ok(())
            }
            Err(e) => {
                self.store.update(task_id, |t| {
                    t.updated_at = Utc::now();
                    t.steps[index].fail(&e, elapsed);
                });
                Err(e)
            }
        }
    }

    /// Record the result, move the task to history and free the current slot
    fn finish_task(&self, id: &str, outcome: Outcome, run: TaskRun) {
        let TaskRun { config, artifacts, .. } = run;
        let target = match &outcome {
            Outcome::Completed => TaskStatus::Completed,
            Outcome::Failed(_) => TaskStatus::Failed,
            Outcome::Paused => TaskStatus::Paused,
        };

        let finished = self.store.update(id, |t| {
            // A stop may have paused the task after its last checkpoint
            t.transition(target);
            let step_count = t.steps.len();
            let result = match (t.status, outcome) {
                (TaskStatus::Completed, _) => TaskResult::success(artifacts.data),
                (TaskStatus::Failed, Outcome::Failed(e)) => TaskResult::failure(e),
                _ => TaskResult::failure(PAUSED_MESSAGE),
            };
            t.result = Some(
                result
                    .with_artifacts(artifacts.screenshots, artifacts.actions)
                    .with_metadata("steps", step_count),
            );
            t.updated_at = Utc::now();
            t.clone()
        });

        self.store.move_to_history(id);
        {
            let mut state = self.state.write();
            if state.current_task.as_deref() == Some(id) {
                state.current_task = None;
            }
        }

        let Some(task) = finished else {
            warn!("Task {} vanished before it finished", id);
            return;
        };
        match task.status {
            TaskStatus::Completed => info!("Task {} completed", task.id),
            TaskStatus::Paused => info!("Task {} paused", task.id),
            _ => error!("Task {} failed", task.id),
        }

        if config.agent.learning_enabled {
            self.record_outcome(&task);
        }
        self.emit(AgentEvent::TaskStatusChanged(task.clone()));
        self.emit(AgentEvent::TaskCompleted(task));
        self.finished.notify_waiters();
    }

    fn record_outcome(&self, task: &Task) {
        let confidence = match task.status {
            TaskStatus::Completed => 1.0,
            TaskStatus::Paused => 0.5,
            _ => 0.0,
        };
        let steps: Vec<Value> = task
            .steps
            .iter()
            .map(|s| json!({ "action": s.action, "status": s.status, "error": s.error }))
            .collect();
        self.learning.record(
            LearningEvent::new(
                TASK_OUTCOME,
                json!({ "task_id": task.id, "description": task.description, "steps": steps }),
                task.status.to_string(),
            )
            .with_context(self.snapshotter.latest())
            .with_confidence(confidence)
            .with_metadata("priority", task.priority),
        );
    }
}
