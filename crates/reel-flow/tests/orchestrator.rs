//! Orchestrator integration tests
//!
//! - Dependency order and parallel dispatch of independent tasks
//! - Retry budgets, panics as failed attempts
//! - Failure propagation: descendants skipped, unrelated tasks continue
//! - Task groups as dependency targets
//! - Abort via `run_until`
//! - Run history append and reload

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

use reel_core::{RunStatus, TaskStatus};
use reel_flow::{
    Orchestrator, RetryPolicy, RunHistory, Task, TaskContext, TaskGraph, TaskGroup, TaskSpec,
};

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
}

fn spec(name: &str, task: impl Task + 'static) -> TaskSpec {
    TaskSpec::new(name, task).with_retry(RetryPolicy::none())
}

fn ok() -> impl Task {
    |_: &TaskContext| -> anyhow::Result<()> { Ok(()) }
}

fn failing(message: &'static str) -> impl Task {
    move |_: &TaskContext| -> anyhow::Result<()> { anyhow::bail!(message) }
}

fn recording(log: &Arc<Mutex<Vec<String>>>, name: &'static str) -> impl Task + use<> {
    let log = Arc::clone(log);
    move |_: &TaskContext| -> anyhow::Result<()> {
        log.lock().unwrap().push(name.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Ordering and concurrency
// ---------------------------------------------------------------------------

#[tokio::test]
async fn tasks_run_after_their_upstream() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let graph = TaskGraph::builder()
        .task(spec("c", recording(&log, "c")).after("b"))
        .task(spec("b", recording(&log, "b")).after("a"))
        .task(spec("a", recording(&log, "a")))
        .build()
        .unwrap();

    let report = Orchestrator::new("p").run(&graph, day()).await.unwrap();

    assert!(report.succeeded());
    assert_eq!(report.run_id.as_str(), "p__2024-01-01");
    assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c"]);
    for task in &report.tasks {
        assert_eq!(task.status, TaskStatus::Succeeded);
        assert_eq!(task.attempts, 1);
    }
}

#[tokio::test]
async fn independent_tasks_run_concurrently() {
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let sleeper = || {
        let active = Arc::clone(&active);
        let peak = Arc::clone(&peak);
        move |_: &TaskContext| -> anyhow::Result<()> {
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(200));
            active.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    };

    let graph = TaskGraph::builder()
        .group(
            TaskGroup::new("ingest")
                .member(spec("left", sleeper()))
                .member(spec("right", sleeper())),
        )
        .task(spec("join", ok()).after("ingest"))
        .build()
        .unwrap();

    let report = Orchestrator::new("p").run(&graph, day()).await.unwrap();

    assert!(report.succeeded());
    assert_eq!(peak.load(Ordering::SeqCst), 2);
}

// ---------------------------------------------------------------------------
// Retries
// ---------------------------------------------------------------------------

#[tokio::test]
async fn transient_failure_is_retried() {
    let calls = Arc::new(AtomicU32::new(0));
    let flaky = {
        let calls = Arc::clone(&calls);
        move |ctx: &TaskContext| -> anyhow::Result<()> {
            calls.fetch_add(1, Ordering::SeqCst);
            anyhow::ensure!(ctx.attempt >= 2, "transient");
            Ok(())
        }
    };
    let graph = TaskGraph::builder()
        .task(TaskSpec::new("flaky", flaky).with_retry(RetryPolicy::new(2, Duration::ZERO)))
        .build()
        .unwrap();

    let report = Orchestrator::new("p").run(&graph, day()).await.unwrap();

    assert!(report.succeeded());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(report.task("flaky").unwrap().attempts, 2);
}

#[tokio::test]
async fn retry_budget_bounds_attempts() {
    let calls = Arc::new(AtomicU32::new(0));
    let broken = {
        let calls = Arc::clone(&calls);
        move |_: &TaskContext| -> anyhow::Result<()> {
            calls.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("still broken")
        }
    };
    let graph = TaskGraph::builder()
        .task(TaskSpec::new("broken", broken).with_retry(RetryPolicy::new(2, Duration::ZERO)))
        .build()
        .unwrap();

    let report = Orchestrator::new("p").run(&graph, day()).await.unwrap();

    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    let task = report.task("broken").unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.attempts, 3);
    assert_eq!(task.error.as_deref(), Some("still broken"));
}

#[tokio::test]
async fn retries_wait_the_configured_delay() {
    let stamps = Arc::new(Mutex::new(Vec::new()));
    let broken = {
        let stamps = Arc::clone(&stamps);
        move |_: &TaskContext| -> anyhow::Result<()> {
            stamps.lock().unwrap().push(Instant::now());
            anyhow::bail!("still broken")
        }
    };
    let delay = Duration::from_millis(150);
    let graph = TaskGraph::builder()
        .task(TaskSpec::new("broken", broken).with_retry(RetryPolicy::new(2, delay)))
        .build()
        .unwrap();

    let started = Instant::now();
    let report = Orchestrator::new("p").run(&graph, day()).await.unwrap();

    assert!(started.elapsed() >= delay * 2);
    assert_eq!(report.task("broken").unwrap().attempts, 3);
    let stamps = stamps.lock().unwrap();
    assert_eq!(stamps.len(), 3);
    for pair in stamps.windows(2) {
        assert!(pair[1].duration_since(pair[0]) >= delay);
    }
}

#[tokio::test]
async fn panicking_task_counts_as_failed() {
    let graph = TaskGraph::builder()
        .task(spec("boom", |_: &TaskContext| -> anyhow::Result<()> {
            panic!("kaboom")
        }))
        .build()
        .unwrap();

    let report = Orchestrator::new("p").run(&graph, day()).await.unwrap();

    let task = report.task("boom").unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task.error.as_deref().unwrap().starts_with("task panicked"));
}

// ---------------------------------------------------------------------------
// Failure propagation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failure_skips_descendants_but_not_unrelated_tasks() {
    let graph = TaskGraph::builder()
        .task(spec("a", failing("source unreadable")))
        .task(spec("b", ok()).after("a"))
        .task(spec("c", ok()).after("b"))
        .task(spec("d", ok()))
        .build()
        .unwrap();

    let report = Orchestrator::new("p").run(&graph, day()).await.unwrap();

    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.status_of("a"), Some(TaskStatus::Failed));
    assert_eq!(report.status_of("b"), Some(TaskStatus::Skipped));
    assert_eq!(report.status_of("c"), Some(TaskStatus::Skipped));
    assert_eq!(report.status_of("d"), Some(TaskStatus::Succeeded));
    assert_eq!(report.task("c").unwrap().attempts, 0);
    assert_eq!(
        report.task("b").unwrap().skip_reason.as_deref(),
        Some("upstream task a failed")
    );

    let cause = report.root_cause.as_ref().unwrap();
    assert_eq!(cause.task.as_str(), "a");
    assert_eq!(cause.error, "source unreadable");
    assert!(report.summary().contains("root cause a"));
}

#[tokio::test]
async fn failed_group_member_blocks_dependents_of_the_group() {
    let graph = TaskGraph::builder()
        .group(
            TaskGroup::new("ingest")
                .member(spec("movies", ok()))
                .member(spec("ratings", failing("missing column"))),
        )
        .task(spec("merge", ok()).after("ingest"))
        .build()
        .unwrap();

    let report = Orchestrator::new("p").run(&graph, day()).await.unwrap();

    assert_eq!(report.status_of("ingest.movies"), Some(TaskStatus::Succeeded));
    assert_eq!(report.status_of("ingest.ratings"), Some(TaskStatus::Failed));
    assert_eq!(report.status_of("merge"), Some(TaskStatus::Skipped));
    assert_eq!(
        report.root_cause.unwrap().task.as_str(),
        "ingest.ratings"
    );
}

// ---------------------------------------------------------------------------
// Abort
// ---------------------------------------------------------------------------

#[tokio::test]
async fn abort_lets_in_flight_tasks_finish_and_skips_the_rest() {
    let slow = |_: &TaskContext| -> anyhow::Result<()> {
        std::thread::sleep(Duration::from_millis(300));
        Ok(())
    };
    let graph = TaskGraph::builder()
        .task(spec("slow", slow))
        .task(spec("after", ok()).after("slow"))
        .build()
        .unwrap();

    let shutdown = tokio::time::sleep(Duration::from_millis(50));
    let report = Orchestrator::new("p")
        .run_until(&graph, day(), shutdown)
        .await
        .unwrap();

    assert!(report.aborted);
    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.status_of("slow"), Some(TaskStatus::Succeeded));
    assert_eq!(report.status_of("after"), Some(TaskStatus::Skipped));
    assert!(report.root_cause.is_none());
}

#[tokio::test]
async fn shutdown_while_the_last_task_runs_cancels_nothing() {
    let slow = |_: &TaskContext| -> anyhow::Result<()> {
        std::thread::sleep(Duration::from_millis(200));
        Ok(())
    };
    let graph = TaskGraph::builder().task(spec("slow", slow)).build().unwrap();

    let shutdown = tokio::time::sleep(Duration::from_millis(20));
    let report = Orchestrator::new("p")
        .run_until(&graph, day(), shutdown)
        .await
        .unwrap();

    assert!(!report.aborted);
    assert!(report.succeeded(), "{}", report.summary());
    assert_eq!(report.status_of("slow"), Some(TaskStatus::Succeeded));
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

#[tokio::test]
async fn history_keeps_runs_in_order() {
    let dir = TempDir::new().unwrap();
    let history = RunHistory::in_dir(dir.path().join("output"));
    let graph = TaskGraph::builder().task(spec("only", ok())).build().unwrap();
    let orchestrator = Orchestrator::new("p");

    let first = orchestrator.run(&graph, day()).await.unwrap();
    let second = orchestrator
        .run(&graph, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap())
        .await
        .unwrap();
    history.append(&first).unwrap();
    history.append(&second).unwrap();

    let all = history.load().unwrap();
    assert_eq!(all, vec![first, second.clone()]);

    let recent = history.recent(1).unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].run_id, second.run_id);
}
