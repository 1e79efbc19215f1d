//! The agent orchestrator
//!
//! [`Agent`] owns activation state and drives every submitted task through
//! plan and execution. Tasks run one at a time on a single background worker
//! in submission order; the control plane (`start`, `stop`, `submit_task`,
//! queries) never waits on automation I/O.
//!
//! While active, a monitor loop refreshes the rolling context history on a
//! fixed period. `stop` pauses the running task at its next step boundary.

mod monitor;
mod runner;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::automation::{Action, ActionRecorder, Automation};
use crate::config::Config;
use crate::context::{ContextSnapshot, ContextSnapshotter};
use crate::desktop::Desktop;
use crate::error::{Error, Result};
use crate::event::{AgentEvent, EventSink, NullSink};
use crate::memory::{LearningEvent, LearningStore, USER_FEEDBACK};
use crate::task::{Planner, SurveyPlanner, Task, TaskId, TaskStatus, TaskStore};

/// Point-in-time view of the agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStatus {
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_task: Option<Task>,
    /// Entries in the rolling context history
    pub context_history: usize,
    pub queued_tasks: usize,
    pub recording: bool,
}

#[derive(Default)]
struct AgentState {
    active: bool,
    current_task: Option<TaskId>,
    /// Stops the monitor loop of the current activation
    monitor: Option<CancellationToken>,
}

struct AgentInner {
    /// Read once per task and once per activation
    config: RwLock<Config>,
    planner: Arc<dyn Planner>,
    events: Arc<dyn EventSink>,
    store: TaskStore,
    desktop: Desktop,
    automation: Arc<Automation>,
    snapshotter: ContextSnapshotter,
    learning: LearningStore,
    state: RwLock<AgentState>,
    /// Signals the worker that a task may be runnable
    wakeup: Arc<Notify>,
    /// Signals waiters that a task reached history
    finished: Notify,
    lifetime: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl AgentInner {
    fn emit(&self, event: AgentEvent) {
        self.events.emit(event);
    }

    fn is_active(&self) -> bool {
        self.state.read().active
    }
}

impl Drop for AgentInner {
    fn drop(&mut self) {
        self.lifetime.cancel();
    }
}

/// Builder for [`Agent`]
pub struct AgentBuilder {
    desktop: Desktop,
    planner: Option<Arc<dyn Planner>>,
    config: Config,
    events: Option<Arc<dyn EventSink>>,
}

impl AgentBuilder {
    pub fn planner(mut self, planner: Arc<dyn Planner>) -> Self {
        self.planner = Some(planner);
        self
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn build(self) -> Agent {
        let config = self.config;
        let recorder = Arc::new(ActionRecorder::new(config.recorder.max_actions));
        let automation = Arc::new(Automation::new(self.desktop.input.clone(), recorder));
        let snapshotter = ContextSnapshotter::new(
            self.desktop.clone(),
            config.agent.display,
            config.agent.context_history_limit,
        );

        Agent {
            inner: Arc::new(AgentInner {
                planner: self.planner.unwrap_or_else(|| Arc::new(SurveyPlanner)),
                events: self.events.unwrap_or_else(|| Arc::new(NullSink)),
                store: TaskStore::new(config.agent.task_history_limit),
                learning: LearningStore::new(config.agent.learning_history_limit),
                desktop: self.desktop,
                automation,
                snapshotter,
                config: RwLock::new(config),
                state: RwLock::new(AgentState::default()),
                wakeup: Arc::new(Notify::new()),
                finished: Notify::new(),
                lifetime: CancellationToken::new(),
                worker: Mutex::new(None),
            }),
        }
    }
}

/// Desktop automation agent
///
/// Cheap to clone; clones share the same agent.
#[derive(Clone)]
pub struct Agent {
    inner: Arc<AgentInner>,
}

impl Agent {
    pub fn builder(desktop: Desktop) -> AgentBuilder {
        AgentBuilder {
            desktop,
            planner: None,
            config: Config::default(),
            events: None,
        }
    }

    pub fn new(desktop: Desktop, planner: Arc<dyn Planner>) -> Self {
        Self::builder(desktop).planner(planner).build()
    }

    /// Current configuration
    pub fn config(&self) -> Config {
        self.inner.config.read().clone()
    }

    /// Replace the configuration at runtime
    ///
    /// Planner, screenshot, deadline and learning settings apply from the next
    /// task; the monitor interval from the next `start`. Capture display and
    /// the history and recorder capacities are fixed when the agent is built.
    pub fn update_config(&self, config: Config) {
        *self.inner.config.write() = config;
        info!("Agent configuration updated");
    }

    /// Activate the agent and launch its background loops
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) -> Result<()> {
        let runtime = Handle::try_current()
            .map_err(|e| Error::Agent(format!("Agent must be started inside a Tokio runtime: {}", e)))?;
        if self.inner.lifetime.is_cancelled() {
            return Err(Error::Agent("Agent has been shut down".to_string()));
        }

        let period = self.inner.config.read().agent.monitor_interval();
        let monitor = {
            let mut state = self.inner.state.write();
            if state.active {
                return Err(Error::AlreadyActive);
            }
            state.active = true;
            let token = self.inner.lifetime.child_token();
            state.monitor = Some(token.clone());
            token
        };

        runtime.spawn(monitor::run(
            Arc::downgrade(&self.inner),
            monitor,
            period,
        ));
        self.ensure_worker(&runtime);
        self.inner.wakeup.notify_one();

        info!("Agent started");
        self.inner.emit(AgentEvent::AgentStatusChanged {
            active: true,
            message: "Agent started".to_string(),
        });
        Ok(())
    }

    fn ensure_worker(&self, runtime: &Handle) {
        let mut worker = self.inner.worker.lock();
        if worker.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }
        *worker = Some(runtime.spawn(runner::work_loop(
            Arc::downgrade(&self.inner),
            self.inner.wakeup.clone(),
            self.inner.lifetime.clone(),
        )));
    }

    /// Deactivate the agent. Idempotent.
    ///
    /// A running task is marked paused; it stops at its next step boundary.
    /// Queued tasks wait for the next `start`.
    ///
    /// Status only moves forward, so a task paused while its last step is in
    /// flight finishes as `paused` with an unsuccessful result even though
    /// every step completed.
    pub fn stop(&self) {
        let paused = {
            let mut state = self.inner.state.write();
            if !state.active {
                return;
            }
            state.active = false;
            if let Some(token) = state.monitor.take() {
                token.cancel();
            }
            state.current_task.as_deref().and_then(|id| {
                self.inner
                    .store
                    .update(id, |task| task.transition(TaskStatus::Paused).then(|| task.clone()))
                    .flatten()
            })
        };

        if let Some(task) = paused {
            info!("Task {} paused", task.id);
            self.inner.emit(AgentEvent::TaskStatusChanged(task));
        }
        info!("Agent stopped");
        self.inner.emit(AgentEvent::AgentStatusChanged {
            active: false,
            message: "Agent stopped".to_string(),
        });
    }

    /// Stop the agent for good and wait for the worker to exit
    pub async fn shutdown(&self) {
        self.stop();
        self.inner.lifetime.cancel();
        let worker = self.inner.worker.lock().take();
        if let Some(handle) = worker {
            let _ = handle.await;
        }
    }

    pub fn is_active(&self) -> bool {
        self.inner.is_active()
    }

    /// Queue a task for execution and return it immediately
    pub fn submit_task(&self, description: impl Into<String>, priority: i32) -> Result<Task> {
        let task = Task::new(description, priority);
        {
            let state = self.inner.state.read();
            if !state.active {
                return Err(Error::NotActive);
            }
            self.inner.store.add(task.clone());
            // Announced before the worker can claim it
            info!("Task created: {} - {}", task.id, task.description);
            self.inner.emit(AgentEvent::TaskCreated(task.clone()));
        }
        self.inner.wakeup.notify_one();
        Ok(task)
    }

    pub fn status(&self) -> AgentStatus {
        let (active, current) = {
            let state = self.inner.state.read();
            (state.active, state.current_task.clone())
        };
        AgentStatus {
            active,
            current_task: current.and_then(|id| self.inner.store.get(&id)),
            context_history: self.inner.snapshotter.history_len(),
            queued_tasks: self.inner.store.queue_len(),
            recording: self.inner.automation.recorder().is_recording(),
        }
    }

    pub fn task(&self, id: &str) -> Option<Task> {
        self.inner.store.get(id)
    }

    pub fn queued_tasks(&self) -> Vec<Task> {
        self.inner.store.queued()
    }

    pub fn task_history(&self) -> Vec<Task> {
        self.inner.store.history()
    }

    /// Wait until a task has been finalized into history
    pub async fn wait_for_task(&self, id: &str, timeout: Duration) -> Result<Task> {
        let wait = async {
            loop {
                let notified = self.inner.finished.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();

                match self.inner.store.get(id) {
                    None => return Err(Error::TaskNotFound(id.to_string())),
                    Some(task) if task.result.is_some() => return Ok(task),
                    Some(_) => {}
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| Error::Agent(format!("Timed out waiting for task {}", id)))?
    }

    /// Capture a snapshot now and add it to the context history
    pub async fn capture_context(&self) -> Result<ContextSnapshot> {
        let snapshot = self.inner.snapshotter.capture().await?;
        self.inner.snapshotter.record(snapshot.clone());
        self.inner
            .emit(AgentEvent::ContextUpdate(Box::new(snapshot.clone())));
        Ok(snapshot)
    }

    pub fn context_history(&self) -> Vec<ContextSnapshot> {
        self.inner.snapshotter.history()
    }

    pub fn latest_context(&self) -> Option<ContextSnapshot> {
        self.inner.snapshotter.latest()
    }

    /// Input facade shared with task execution
    pub fn automation(&self) -> &Arc<Automation> {
        &self.inner.automation
    }

    pub fn start_recording(&self) -> Result<()> {
        self.inner.automation.recorder().start_recording()
    }

    pub fn stop_recording(&self) -> Vec<Action> {
        self.inner.automation.recorder().stop_recording()
    }

    /// Replay recorded actions, emitting progress after each one
    pub async fn playback(&self, actions: &[Action], speed: f64) -> Result<()> {
        let events = self.inner.events.clone();
        self.inner
            .automation
            .playback(actions, speed, |progress| {
                events.emit(AgentEvent::ActionPlaybackProgress {
                    current: progress.current,
                    total: progress.total,
                    action: progress.action.clone(),
                });
            })
            .await
    }

    pub fn learning_events(&self) -> Vec<LearningEvent> {
        self.inner.learning.events()
    }

    /// Attach user feedback to a task
    pub fn record_feedback(&self, task_id: &str, feedback: impl Into<String>) -> Result<()> {
        let task = self
            .inner
            .store
            .get(task_id)
            .ok_or_else(|| Error::TaskNotFound(task_id.to_string()))?;
        self.inner.learning.record(
            LearningEvent::new(
                USER_FEEDBACK,
                json!({ "task_id": task.id, "description": task.description }),
                task.status.to_string(),
            )
            .with_feedback(feedback)
            .with_confidence(1.0),
        );
        Ok(())
    }
}
