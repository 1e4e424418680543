//! # reel-core
//!
//! Core types shared across all reel crates:
//! - Task and run status enums with state machine transitions
//! - Identifier newtypes for tasks and runs
//! - Cross-cutting error types

pub mod enums;
pub mod errors;
pub mod ids;

pub use enums::{RunStatus, TaskStatus};
pub use errors::CoreError;
pub use ids::{RunId, TaskId};
