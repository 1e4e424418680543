use anyhow::Context;
use chrono::Utc;
use reel_config::ReelConfig;
use reel_core::TaskStatus;
use reel_etl::{AnalysisOutcome, EtlPipeline};
use reel_flow::{RunHistory, RunReport, TaskReport};
use serde::Serialize;

use crate::cli::{GlobalFlags, OutputFormat, RunArgs};
use crate::output::output;

/// Response for `reel run` in json/raw format.
#[derive(Debug, Serialize)]
struct RunResponse {
    report: RunReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    analysis: Option<AnalysisOutcome>,
}

#[derive(Debug, Serialize)]
struct TaskRow {
    task: String,
    status: TaskStatus,
    attempts: u32,
    duration_ms: Option<u64>,
    detail: Option<String>,
}

impl From<&TaskReport> for TaskRow {
    fn from(task: &TaskReport) -> Self {
        Self {
            task: task.id.to_string(),
            status: task.status,
            attempts: task.attempts,
            duration_ms: task.duration_ms,
            detail: task.error.clone().or_else(|| task.skip_reason.clone()),
        }
    }
}

/// Handle `reel run`.
///
/// The run is recorded in the history file whatever its outcome; a failed
/// run still returns an error so the process exits non-zero.
pub async fn handle(args: &RunArgs, config: ReelConfig, flags: &GlobalFlags) -> anyhow::Result<()> {
    let logical_date = args
        .logical_date
        .unwrap_or_else(|| Utc::now().date_naive());
    let history = RunHistory::in_dir(&config.paths.output_dir);
    let pipeline = EtlPipeline::open(config).context("failed to open the store")?;

    let report = pipeline.run_until(logical_date, shutdown_signal()).await?;

    if let Err(error) = history.append(&report) {
        tracing::warn!(
            path = %history.path().display(),
            error = %error,
            "failed to record run history"
        );
    }

    match flags.format {
        OutputFormat::Table => {
            let rows: Vec<TaskRow> = report.tasks.iter().map(TaskRow::from).collect();
            output(&rows, flags.format)?;
            println!("\n{}", report.summary());
        }
        OutputFormat::Json | OutputFormat::Raw => {
            let response = RunResponse {
                report: report.clone(),
                analysis: pipeline.last_analysis(),
            };
            output(&response, flags.format)?;
        }
    }

    if !report.succeeded() {
        anyhow::bail!(report.summary());
    }
    Ok(())
}

/// Resolves on Ctrl-C. If the handler cannot be installed the run is never aborted.
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::warn!("ctrl-c received; no further tasks will be dispatched"),
        Err(error) => {
            tracing::warn!(error = %error, "cannot listen for ctrl-c; run will not be abortable");
            std::future::pending::<()>().await;
        }
    }
}
