//! Flow error types.

use reel_core::{CoreError, TaskId};

/// Errors from building task graphs and driving runs.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    /// Two tasks or groups share one id.
    #[error("duplicate task or group id: {0}")]
    DuplicateId(String),

    /// A task depends on an id that is neither a task nor a group.
    #[error("task {task} depends on unknown task or group {dependency}")]
    UnknownDependency { task: TaskId, dependency: String },

    /// A group was declared without members.
    #[error("task group {0} has no members")]
    EmptyGroup(String),

    /// The dependency edges contain a cycle through this task.
    #[error("dependency cycle through task {0}")]
    Cycle(TaskId),

    /// A status transition was rejected.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The orchestrator's own dispatch wrapper failed to join.
    #[error("task dispatch failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// Run history could not be read or written.
    #[error("run history error: {0}")]
    History(#[from] std::io::Error),
}
