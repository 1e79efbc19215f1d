//! Task store - live queue plus bounded history

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::debug;

use super::{Task, TaskId, TaskStatus};
use crate::bounded::BoundedLog;

struct StoreInner {
    tasks: HashMap<TaskId, Task>,
    /// Live tasks in submission order
    queue: Vec<TaskId>,
    /// Finished tasks, oldest first
    history: BoundedLog<TaskId>,
}

/// Owns every submitted task
///
/// A task id is always in exactly one of the live queue or the history, and
/// both views are changed under one write lock. Priority does not reorder the
/// queue.
pub struct TaskStore {
    inner: RwLock<StoreInner>,
}

impl TaskStore {
    pub fn new(max_history: usize) -> Self {
        Self {
            inner: RwLock::new(StoreInner {
                tasks: HashMap::new(),
                queue: Vec::new(),
                history: BoundedLog::new(max_history),
            }),
        }
    }

    /// Register a task and append it to the live queue
    ///
    /// Returns false (and changes nothing) if the id is already known.
    pub fn add(&self, task: Task) -> bool {
        let mut inner = self.inner.write();
        if inner.tasks.contains_key(&task.id) {
            return false;
        }
        inner.queue.push(task.id.clone());
        inner.tasks.insert(task.id.clone(), task);
        true
    }

    pub fn get(&self, id: &str) -> Option<Task> {
        self.inner.read().tasks.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.read().tasks.contains_key(id)
    }

    /// Mutate a stored task in place
    pub fn update<R>(&self, id: &str, f: impl FnOnce(&mut Task) -> R) -> Option<R> {
        self.inner.write().tasks.get_mut(id).map(f)
    }

    /// Oldest queued task still waiting to run
    pub fn next_pending(&self) -> Option<Task> {
        let inner = self.inner.read();
        inner
            .queue
            .iter()
            .filter_map(|id| inner.tasks.get(id))
            .find(|task| task.status == TaskStatus::Pending)
            .cloned()
    }

    /// Move a task from the live queue to history
    ///
    /// Returns false if the task is not queued. The oldest history entry is
    /// evicted past capacity and forgotten entirely.
    pub fn move_to_history(&self, id: &str) -> bool {
        let mut inner = self.inner.write();
        let Some(pos) = inner.queue.iter().position(|queued| queued == id) else {
            return false;
        };
        let id = inner.queue.remove(pos);
        if let Some(evicted) = inner.history.push(id) {
            inner.tasks.remove(&evicted);
            debug!("Evicted task {} from history", evicted);
        }
        true
    }

    /// Live tasks in submission order
    pub fn queued(&self) -> Vec<Task> {
        let inner = self.inner.read();
        inner.queue.iter().filter_map(|id| inner.tasks.get(id)).cloned().collect()
    }

    /// Finished tasks, oldest first
    pub fn history(&self) -> Vec<Task> {
        let inner = self.inner.read();
        inner.history.iter().filter_map(|id| inner.tasks.get(id)).cloned().collect()
    }

    pub fn queue_len(&self) -> usize {
        self.inner.read().queue.len()
    }

    pub fn history_len(&self) -> usize {
        self.inner.read().history.len()
    }

    pub fn is_queued(&self, id: &str) -> bool {
        self.inner.read().queue.iter().any(|queued| queued == id)
    }

    pub fn in_history(&self, id: &str) -> bool {
        self.inner.read().history.iter().any(|done| done == id)
    }
}

impl Default for TaskStore {
    fn default() -> Self {
        Self::new(1000)
    }
}
