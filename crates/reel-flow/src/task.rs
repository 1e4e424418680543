//! Units of work and their retry budgets.

use std::fmt;
use std::time::Duration;

use chrono::NaiveDate;
use reel_core::{RunId, TaskId};
use serde::{Deserialize, Serialize};

/// Per-attempt information handed to a task.
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub task_id: TaskId,
    pub run_id: RunId,
    pub logical_date: NaiveDate,
    /// 1-based attempt number.
    pub attempt: u32,
    pub max_attempts: u32,
}

impl TaskContext {
    #[must_use]
    pub const fn is_last_attempt(&self) -> bool {
        self.attempt >= self.max_attempts
    }
}

/// A callable unit of work.
///
/// Tasks run on the blocking thread pool, one attempt at a time, and may block
/// on I/O for their whole duration. Any side effect must be all-or-nothing so
/// that a failed attempt can simply be run again.
pub trait Task: Send + Sync {
    /// Run one attempt.
    ///
    /// # Errors
    ///
    /// Any error fails the attempt; the orchestrator decides whether to retry.
    fn run(&self, ctx: &TaskContext) -> anyhow::Result<()>;
}

impl<F> Task for F
where
    F: Fn(&TaskContext) -> anyhow::Result<()> + Send + Sync,
{
    fn run(&self, ctx: &TaskContext) -> anyhow::Result<()> {
        self(ctx)
    }
}

/// Retry budget: `retries` further attempts after the first, `delay` apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub retries: u32,
    #[serde(with = "duration_secs")]
    pub delay: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(retries: u32, delay: Duration) -> Self {
        Self { retries, delay }
    }

    /// Single attempt, no retry.
    #[must_use]
    pub const fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(1, Duration::from_secs(120))
    }
}

impl fmt::Display for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} attempt(s), {}s apart",
            self.max_attempts(),
            self.delay.as_secs()
        )
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
