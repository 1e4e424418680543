//! Identifier newtypes.
//!
//! Task ids are dotted paths: members of a task group are prefixed with the
//! group id (`ingest_transform_parallel.ingest_movies`). Run ids combine the
//! pipeline id with the logical date of the schedule period.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Unique name of a task within a task graph.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Id of a task nested in a group: `{group}.{name}`.
    #[must_use]
    pub fn in_group(group: &str, name: &str) -> Self {
        Self(format!("{group}.{name}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Identity of one run: `{pipeline}__{logical_date}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    #[must_use]
    pub fn scheduled(pipeline: &str, logical_date: NaiveDate) -> Self {
        Self(format!("{pipeline}__{}", logical_date.format("%Y-%m-%d")))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
