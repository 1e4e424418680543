//! # reel-flow
//!
//! Static task graphs and the orchestrator that runs them.
//!
//! A pipeline declares its tasks, groups, and dependency edges once with
//! [`TaskGraph::builder`]. [`Orchestrator::run`] then executes the graph for a
//! logical date: tasks whose upstream all succeeded run concurrently, failed
//! attempts are retried per [`RetryPolicy`], and descendants of a failed task
//! are skipped. The result is a [`RunReport`], which [`RunHistory`] can append
//! to a JSONL file.

pub mod error;
pub mod graph;
pub mod history;
pub mod orchestrator;
pub mod report;
pub mod task;

pub use error::FlowError;
pub use graph::{NodeSummary, TaskGraph, TaskGraphBuilder, TaskGroup, TaskNode, TaskSpec};
pub use history::{HISTORY_FILE, RunHistory};
pub use orchestrator::Orchestrator;
pub use report::{RootCause, RunReport, TaskReport};
pub use task::{RetryPolicy, Task, TaskContext};
