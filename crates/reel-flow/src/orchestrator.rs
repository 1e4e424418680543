//! Run driver.
//!
//! The orchestrator interprets a [`TaskGraph`] for one logical date:
//!
//! 1. Every `pending` task with a `failed` or `skipped` upstream becomes
//!    `skipped`. Walking in topological order makes this transitive in one pass.
//! 2. Every `pending` task whose upstream tasks all `succeeded` becomes
//!    `running` and is dispatched. Dispatched tasks run concurrently.
//! 3. The orchestrator waits for the next completion (never polls) and
//!    records `succeeded` or `failed`, then repeats from 1.
//!
//! Retries happen inside a dispatch: a task is only reported `failed` after
//! its whole attempt budget is spent. Status values are the only channel by
//! which one task's failure affects another.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{NaiveDate, Utc};
use reel_core::{CoreError, RunId, RunStatus, TaskStatus};
use tokio::task::JoinSet;

use crate::error::FlowError;
use crate::graph::TaskGraph;
use crate::report::{RootCause, RunReport, TaskReport};
use crate::task::{RetryPolicy, Task, TaskContext};

/// Drives runs of task graphs for one pipeline.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    pipeline: String,
}

impl Orchestrator {
    pub fn new(pipeline: impl Into<String>) -> Self {
        Self {
            pipeline: pipeline.into(),
        }
    }

    #[must_use]
    pub fn pipeline(&self) -> &str {
        &self.pipeline
    }

    /// Execute every task of `graph` once for `logical_date`.
    ///
    /// Task failures never surface as `Err`; they are recorded in the report.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError`] only if the orchestrator itself breaks an
    /// invariant (illegal status transition or a failed dispatch join).
    pub async fn run(
        &self,
        graph: &TaskGraph,
        logical_date: NaiveDate,
    ) -> Result<RunReport, FlowError> {
        self.run_until(graph, logical_date, std::future::pending())
            .await
    }

    /// Like [`Self::run`], but stop dispatching once `shutdown` resolves.
    ///
    /// In-flight tasks are allowed to finish their current attempt budget;
    /// tasks that never started are marked `skipped` and the run `failed`.
    ///
    /// # Errors
    ///
    /// See [`Self::run`].
    pub async fn run_until<S>(
        &self,
        graph: &TaskGraph,
        logical_date: NaiveDate,
        shutdown: S,
    ) -> Result<RunReport, FlowError>
    where
        S: Future<Output = ()>,
    {
        let run_id = RunId::scheduled(&self.pipeline, logical_date);
        let started_at = Utc::now();
        tracing::info!(run = %run_id, tasks = graph.len(), "run started");

        let mut state = RunState::new(graph.len());
        let mut in_flight = JoinSet::new();
        let mut aborted = false;
        let mut shutdown = std::pin::pin!(shutdown);

        loop {
            state.propagate_skips(graph)?;

            if !aborted {
                for position in state.ready(graph) {
                    let node = &graph.nodes()[position];
                    state.transition(graph, position, TaskStatus::Running)?;
                    tracing::info!(
                        task = %node.id,
                        max_attempts = node.retry.max_attempts(),
                        "dispatching task"
                    );
                    let ctx = TaskContext {
                        task_id: node.id.clone(),
                        run_id: run_id.clone(),
                        logical_date,
                        attempt: 1,
                        max_attempts: node.retry.max_attempts(),
                    };
                    in_flight.spawn(run_attempts(
                        position,
                        Arc::clone(&node.task),
                        ctx,
                        node.retry,
                    ));
                }
            }

            if in_flight.is_empty() {
                break;
            }

            tokio::select! {
                joined = in_flight.join_next() => {
                    let Some(joined) = joined else { break };
                    state.complete(graph, joined?)?;
                }
                () = &mut shutdown, if !aborted => {
                    aborted = true;
                    tracing::warn!(
                        run = %run_id,
                        in_flight = in_flight.len(),
                        "shutdown requested; waiting for in-flight tasks"
                    );
                }
            }
        }

        let leftover_reason = if aborted {
            "run aborted before the task was dispatched"
        } else {
            "upstream tasks never completed"
        };
        let undispatched = state.skip_remaining(graph, leftover_reason)?;
        // A shutdown that only lands while the last tasks finish cancels nothing.
        let aborted = aborted && undispatched > 0;

        let report = state.into_report(
            graph,
            RunHeader {
                run_id,
                pipeline: self.pipeline.clone(),
                logical_date,
                started_at,
                aborted,
            },
        )?;
        if report.succeeded() {
            tracing::info!("{}", report.summary());
        } else {
            tracing::error!("{}", report.summary());
        }
        Ok(report)
    }
}

struct AttemptOutcome {
    position: usize,
    attempts: u32,
    elapsed: Duration,
    result: Result<(), String>,
}

/// Run up to `retry.max_attempts()` attempts of `task` on the blocking pool.
async fn run_attempts(
    position: usize,
    task: Arc<dyn Task>,
    mut ctx: TaskContext,
    retry: RetryPolicy,
) -> AttemptOutcome {
    let started = Instant::now();
    let max_attempts = retry.max_attempts();
    let mut last_error = String::new();

    for attempt in 1..=max_attempts {
        ctx.attempt = attempt;
        let task = Arc::clone(&task);
        let attempt_ctx = ctx.clone();
        let joined = tokio::task::spawn_blocking(move || task.run(&attempt_ctx)).await;

        let error = match joined {
            Ok(Ok(())) => {
                return AttemptOutcome {
                    position,
                    attempts: attempt,
                    elapsed: started.elapsed(),
                    result: Ok(()),
                };
            }
            Ok(Err(error)) => format!("{error:#}"),
            Err(join) if join.is_panic() => format!("task panicked: {join}"),
            Err(join) => format!("task was cancelled: {join}"),
        };

        if !ctx.is_last_attempt() {
            tracing::warn!(
                task = %ctx.task_id,
                attempt,
                max_attempts,
                delay_secs = retry.delay.as_secs_f64(),
                %error,
                "task attempt failed; retrying"
            );
            tokio::time::sleep(retry.delay).await;
        }
        last_error = error;
    }

    AttemptOutcome {
        position,
        attempts: max_attempts,
        elapsed: started.elapsed(),
        result: Err(last_error),
    }
}

struct RunHeader {
    run_id: RunId,
    pipeline: String,
    logical_date: NaiveDate,
    started_at: chrono::DateTime<Utc>,
    aborted: bool,
}

/// Per-task bookkeeping for one run, indexed by node position.
struct RunState {
    statuses: Vec<TaskStatus>,
    attempts: Vec<u32>,
    durations: Vec<Option<u64>>,
    errors: Vec<Option<String>>,
    skip_reasons: Vec<Option<String>>,
}

impl RunState {
    fn new(len: usize) -> Self {
        Self {
            statuses: vec![TaskStatus::Pending; len],
            attempts: vec![0; len],
            durations: vec![None; len],
            errors: vec![None; len],
            skip_reasons: vec![None; len],
        }
    }

    fn transition(
        &mut self,
        graph: &TaskGraph,
        position: usize,
        next: TaskStatus,
    ) -> Result<(), CoreError> {
        let current = self.statuses[position];
        if !current.can_transition_to(next) {
            return Err(CoreError::InvalidTransition {
                id: graph.nodes()[position].id.clone(),
                from: current,
                to: next,
            });
        }
        self.statuses[position] = next;
        Ok(())
    }

    fn upstream_statuses<'a>(
        &'a self,
        graph: &'a TaskGraph,
        position: usize,
    ) -> impl Iterator<Item = (&'a reel_core::TaskId, TaskStatus)> + 'a {
        graph.nodes()[position].upstream.iter().filter_map(move |id| {
            graph
                .position(id)
                .map(|upstream| (id, self.statuses[upstream]))
        })
    }

    fn propagate_skips(&mut self, graph: &TaskGraph) -> Result<(), CoreError> {
        for &position in graph.order() {
            if self.statuses[position] != TaskStatus::Pending {
                continue;
            }
            let blocker = self
                .upstream_statuses(graph, position)
                .find(|(_, status)| matches!(status, TaskStatus::Failed | TaskStatus::Skipped))
                .map(|(id, status)| format!("upstream task {id} {status}"));
            if let Some(reason) = blocker {
                self.transition(graph, position, TaskStatus::Skipped)?;
                tracing::warn!(task = %graph.nodes()[position].id, %reason, "task skipped");
                self.skip_reasons[position] = Some(reason);
            }
        }
        Ok(())
    }

    fn ready(&self, graph: &TaskGraph) -> Vec<usize> {
        graph
            .order()
            .iter()
            .copied()
            .filter(|&position| {
                self.statuses[position] == TaskStatus::Pending
                    && self
                        .upstream_statuses(graph, position)
                        .all(|(_, status)| status == TaskStatus::Succeeded)
            })
            .collect()
    }

    fn complete(&mut self, graph: &TaskGraph, outcome: AttemptOutcome) -> Result<(), CoreError> {
        let position = outcome.position;
        let id = &graph.nodes()[position].id;
        self.attempts[position] = outcome.attempts;
        self.durations[position] =
            Some(u64::try_from(outcome.elapsed.as_millis()).unwrap_or(u64::MAX));

        match outcome.result {
            Ok(()) => {
                self.transition(graph, position, TaskStatus::Succeeded)?;
                tracing::info!(task = %id, attempts = outcome.attempts, "task succeeded");
            }
            Err(error) => {
                self.transition(graph, position, TaskStatus::Failed)?;
                tracing::error!(
                    task = %id,
                    attempts = outcome.attempts,
                    %error,
                    "task failed after exhausting its retry budget"
                );
                self.errors[position] = Some(error);
            }
        }
        Ok(())
    }

    /// Skip every task that has not reached a final state; returns how many.
    fn skip_remaining(&mut self, graph: &TaskGraph, reason: &str) -> Result<usize, CoreError> {
        let mut skipped = 0;
        for &position in graph.order() {
            if !self.statuses[position].is_terminal() {
                self.transition(graph, position, TaskStatus::Skipped)?;
                self.skip_reasons[position] = Some(reason.to_string());
                skipped += 1;
            }
        }
        Ok(skipped)
    }

    fn into_report(mut self, graph: &TaskGraph, header: RunHeader) -> Result<RunReport, CoreError> {
        let tasks: Vec<TaskReport> = graph
            .order()
            .iter()
            .map(|&position| TaskReport {
                id: graph.nodes()[position].id.clone(),
                status: self.statuses[position],
                attempts: self.attempts[position],
                duration_ms: self.durations[position],
                error: self.errors[position].take(),
                skip_reason: self.skip_reasons[position].take(),
            })
            .collect();

        let root_cause = tasks
            .iter()
            .find(|t| t.status == TaskStatus::Failed)
            .map(|t| RootCause {
                task: t.id.clone(),
                error: t.error.clone().unwrap_or_default(),
            });

        let outcome = if header.aborted || root_cause.is_some() {
            RunStatus::Failed
        } else {
            RunStatus::Success
        };
        let status = finish_run(&header.run_id, RunStatus::Running, outcome)?;

        Ok(RunReport {
            run_id: header.run_id,
            pipeline: header.pipeline,
            logical_date: header.logical_date,
            started_at: header.started_at,
            finished_at: Utc::now(),
            status,
            aborted: header.aborted,
            root_cause,
            tasks,
        })
    }
}

fn finish_run(run_id: &RunId, from: RunStatus, to: RunStatus) -> Result<RunStatus, CoreError> {
    if from.can_transition_to(to) {
        Ok(to)
    } else {
        Err(CoreError::InvalidRunTransition {
            run: run_id.clone(),
            from,
            to,
        })
    }
}
