//! Scheduled-task activity: reloads must not pull servers out from under
//! a running task.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use uuid::Uuid;

/// Answers whether protected work is in flight.
pub trait TaskActivity: Send + Sync {
    /// `Some(character)`: a task owned by that character, or a global task,
    /// is running. `None`: any task at all is running.
    fn has_running_tasks(&self, character: Option<&str>) -> bool;
}

/// A task that never runs, for hosts without a scheduler.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTasks;

impl TaskActivity for NoTasks {
    fn has_running_tasks(&self, _character: Option<&str>) -> bool {
        false
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// In-memory task board
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize)]
pub struct RunningTask {
    pub id: Uuid,
    /// Owning character; `None` for a global task.
    pub character: Option<String>,
    pub label: String,
    pub started_at: DateTime<Utc>,
}

/// Ephemeral record of running scheduled tasks.
#[derive(Default)]
pub struct TaskBoard {
    running: RwLock<HashMap<Uuid, RunningTask>>,
}

impl TaskBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a task as running. Returns its id.
    pub fn start(&self, character: Option<&str>, label: impl Into<String>) -> Uuid {
        let task = RunningTask {
            id: Uuid::new_v4(),
            character: character.map(str::to_string),
            label: label.into(),
            started_at: Utc::now(),
        };
        let id = task.id;
        tracing::debug!(task_id = %id, character = ?task.character, label = %task.label, "scheduled task started");
        self.running.write().insert(id, task);
        id
    }

    /// Mark a task as finished. Returns false if it was not running.
    pub fn finish(&self, id: &Uuid) -> bool {
        self.running.write().remove(id).is_some()
    }

    pub fn running(&self) -> Vec<RunningTask> {
        let mut tasks: Vec<_> = self.running.read().values().cloned().collect();
        tasks.sort_by_key(|t| t.started_at);
        tasks
    }
}

impl TaskActivity for TaskBoard {
    fn has_running_tasks(&self, character: Option<&str>) -> bool {
        let running = self.running.read();
        match character {
            None => !running.is_empty(),
            Some(id) => running
                .values()
                .any(|t| t.character.is_none() || t.character.as_deref() == Some(id)),
        }
    }
}
