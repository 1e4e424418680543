use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use reel_config::ReelConfig;
use reel_core::RunStatus;
use reel_flow::{RunHistory, RunReport};
use serde::Serialize;

use crate::cli::{GlobalFlags, HistoryArgs, OutputFormat};
use crate::output::output;

#[derive(Debug, Serialize)]
struct HistoryRow {
    run_id: String,
    logical_date: NaiveDate,
    status: RunStatus,
    started_at: DateTime<Utc>,
    duration_ms: i64,
    root_cause: Option<String>,
}

impl From<&RunReport> for HistoryRow {
    fn from(report: &RunReport) -> Self {
        let root_cause = match (&report.root_cause, report.aborted) {
            (Some(cause), _) => Some(format!("{}: {}", cause.task, cause.error)),
            (None, true) => Some("aborted".to_string()),
            (None, false) => None,
        };
        Self {
            run_id: report.run_id.to_string(),
            logical_date: report.logical_date,
            status: report.status,
            started_at: report.started_at,
            duration_ms: (report.finished_at - report.started_at).num_milliseconds(),
            root_cause,
        }
    }
}

/// Handle `reel history`.
pub fn handle(args: &HistoryArgs, config: &ReelConfig, flags: &GlobalFlags) -> anyhow::Result<()> {
    let history = RunHistory::in_dir(&config.paths.output_dir);
    let reports = history
        .recent(args.limit)
        .with_context(|| format!("failed to read {}", history.path().display()))?;

    match flags.format {
        OutputFormat::Table => {
            let rows: Vec<HistoryRow> = reports.iter().map(HistoryRow::from).collect();
            output(&rows, flags.format)
        }
        OutputFormat::Json | OutputFormat::Raw => output(&reports, flags.format),
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;
    use pretty_assertions::assert_eq;
    use reel_core::{RunId, TaskId};
    use reel_flow::RootCause;

    use super::*;

    fn report(root_cause: Option<RootCause>, aborted: bool) -> RunReport {
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let started_at = Utc::now();
        RunReport {
            run_id: RunId::scheduled("etl_movies_ratings", date),
            pipeline: "etl_movies_ratings".to_string(),
            logical_date: date,
            started_at,
            finished_at: started_at + TimeDelta::milliseconds(1500),
            status: if root_cause.is_some() || aborted {
                RunStatus::Failed
            } else {
                RunStatus::Success
            },
            aborted,
            root_cause,
            tasks: Vec::new(),
        }
    }

    #[test]
    fn row_summarizes_a_failed_run() {
        let row = HistoryRow::from(&report(
            Some(RootCause {
                task: TaskId::new("validate_rowcount"),
                error: "fact_movie_ratings is empty".to_string(),
            }),
            false,
        ));

        assert_eq!(row.run_id, "etl_movies_ratings__2024-01-02");
        assert_eq!(row.status, RunStatus::Failed);
        assert_eq!(row.duration_ms, 1500);
        assert_eq!(
            row.root_cause.as_deref(),
            Some("validate_rowcount: fact_movie_ratings is empty")
        );
    }

    #[test]
    fn aborted_run_without_failure_says_so() {
        let row = HistoryRow::from(&report(None, true));
        assert_eq!(row.root_cause.as_deref(), Some("aborted"));
    }

    #[test]
    fn successful_run_has_no_root_cause() {
        let row = HistoryRow::from(&report(None, false));
        assert_eq!(row.status, RunStatus::Success);
        assert_eq!(row.root_cause, None);
    }
}
