//! Run and task reports.

use std::fmt::Write;

use chrono::{DateTime, NaiveDate, Utc};
use reel_core::{RunId, RunStatus, TaskId, TaskStatus};
use serde::{Deserialize, Serialize};

/// Final state of one task in one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskReport {
    pub id: TaskId,
    pub status: TaskStatus,
    /// Attempts actually made; zero for skipped tasks.
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Error of the last attempt, for failed tasks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Why the task never ran, for skipped tasks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
}

/// The task whose failure decided the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootCause {
    pub task: TaskId,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub pipeline: String,
    pub logical_date: NaiveDate,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: RunStatus,
    /// The run was stopped externally before every task was dispatched.
    #[serde(default)]
    pub aborted: bool,
    /// First failed task in dependency order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_cause: Option<RootCause>,
    /// One entry per task, in dependency order.
    pub tasks: Vec<TaskReport>,
}

impl RunReport {
    #[must_use]
    pub fn task(&self, id: &str) -> Option<&TaskReport> {
        self.tasks.iter().find(|t| t.id.as_str() == id)
    }

    /// Status of task `id`, if the run knows it.
    #[must_use]
    pub fn status_of(&self, id: &str) -> Option<TaskStatus> {
        self.task(id).map(|t| t.status)
    }

    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Success
    }

    /// Human-readable one-line summary for logs and exit messages.
    #[must_use]
    pub fn summary(&self) -> String {
        let count = |status| self.tasks.iter().filter(|t| t.status == status).count();
        let mut line = format!(
            "run {} {}: {} succeeded, {} failed, {} skipped",
            self.run_id,
            self.status,
            count(TaskStatus::Succeeded),
            count(TaskStatus::Failed),
            count(TaskStatus::Skipped),
        );
        if self.aborted {
            line.push_str(" (aborted)");
        }
        if let Some(cause) = &self.root_cause {
            let _ = write!(line, "; root cause {}: {}", cause.task, cause.error);
        }
        line
    }
}
