//! Cross-cutting error types for reel.
//!
//! Domain-specific errors (`StoreError`, `FlowError`, `StageError`) live in
//! their respective crates. The binary converges them through `anyhow`.

use thiserror::Error;

use crate::enums::{RunStatus, TaskStatus};
use crate::ids::{RunId, TaskId};

/// Errors that can be raised by any reel crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A status transition was attempted that is not allowed.
    #[error("Invalid state transition: task {id} from {from} to {to}")]
    InvalidTransition {
        id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },

    /// A run tried to leave `running` for a status it cannot reach.
    #[error("Invalid state transition: run {run} from {from} to {to}")]
    InvalidRunTransition {
        run: RunId,
        from: RunStatus,
        to: RunStatus,
    },
}
