//! Analysis stage: per-title aggregation, the CSV artifact, and the chart.
//!
//! The CSV artifact is the primary outcome and any failure to produce it
//! fails the task. The chart is secondary: a rendering failure is logged and
//! recorded as [`Visualization::Skipped`], and the task still succeeds.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use reel_flow::{Task, TaskContext};
use reel_store::StoreGateway;
use serde::{Deserialize, Serialize};

use crate::error::StageError;
use crate::merge::FACT_TABLE;
use crate::render::{ChartRenderer, SvgBarChart};

/// Full aggregation, written on every successful run.
pub const ARTIFACT_FILE: &str = "avg_ratings.csv";
/// Top-N chart, best effort.
pub const CHART_FILE: &str = "avg_ratings_top10.svg";

const AGGREGATE_SQL: &str = "SELECT title, CAST(round(avg(rating), 2) AS DOUBLE) AS avg_rating, count(*) AS n \
     FROM fact_movie_ratings \
     GROUP BY title \
     ORDER BY avg_rating DESC, n DESC, title ASC";

/// One aggregated row; field order is the artifact's column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingGroup {
    pub title: String,
    pub avg_rating: f64,
    pub n: u64,
}

/// Secondary outcome of an analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Visualization {
    Rendered { path: PathBuf },
    Skipped { reason: String },
}

impl Visualization {
    #[must_use]
    pub const fn is_rendered(&self) -> bool {
        matches!(self, Self::Rendered { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisOutcome {
    /// Number of aggregated groups written to the artifact.
    pub groups: usize,
    pub artifact: PathBuf,
    pub visualization: Visualization,
}

pub struct AnalysisStage {
    store: Arc<StoreGateway>,
    output_dir: PathBuf,
    top_n: usize,
    renderer: Arc<dyn ChartRenderer>,
    last: Mutex<Option<AnalysisOutcome>>,
}

impl AnalysisStage {
    pub fn new(store: Arc<StoreGateway>, output_dir: impl Into<PathBuf>, top_n: usize) -> Self {
        Self {
            store,
            output_dir: output_dir.into(),
            top_n,
            renderer: Arc::new(SvgBarChart::default()),
            last: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn with_renderer(mut self, renderer: Arc<dyn ChartRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    #[must_use]
    pub fn artifact_path(&self) -> PathBuf {
        self.output_dir.join(ARTIFACT_FILE)
    }

    #[must_use]
    pub fn chart_path(&self) -> PathBuf {
        self.output_dir.join(CHART_FILE)
    }

    /// Outcome of the most recent successful [`Self::analyze`].
    #[must_use]
    pub fn last_outcome(&self) -> Option<AnalysisOutcome> {
        self.last.lock().ok().and_then(|last| last.clone())
    }

    /// Aggregate the fact relation by title, best mean first.
    ///
    /// # Errors
    ///
    /// Returns [`StageError::StoreUnavailable`] if the query fails.
    pub fn aggregate(&self) -> Result<Vec<RatingGroup>, StageError> {
        let groups = self.store.query_rows(AGGREGATE_SQL, |row| {
            Ok(RatingGroup {
                title: row.get(0)?,
                avg_rating: row.get(1)?,
                n: row.get::<_, i64>(2)?.unsigned_abs(),
            })
        })?;
        Ok(groups)
    }

    /// Aggregate, persist the artifact, then try to render the chart.
    ///
    /// # Errors
    ///
    /// Returns [`StageError::EmptyResult`] if there are no groups,
    /// [`StageError::ArtifactWrite`] if the CSV cannot be persisted, or
    /// [`StageError::StoreUnavailable`] if the query fails. Chart failures are
    /// never returned.
    pub fn analyze(&self) -> Result<AnalysisOutcome, StageError> {
        self.record(None);
        let groups = self.aggregate()?;
        tracing::info!(groups = groups.len(), "analysis aggregated");
        if groups.is_empty() {
            return Err(StageError::EmptyResult {
                relation: format!("aggregation of {FACT_TABLE}"),
            });
        }

        std::fs::create_dir_all(&self.output_dir)
            .map_err(|e| StageError::artifact(&self.output_dir, e))?;
        let artifact = self.artifact_path();
        write_artifact(&artifact, &groups)?;
        tracing::info!(path = %artifact.display(), "wrote analysis artifact");

        let chart = self.chart_path();
        let visualization = match self.renderer.render(&display_rows(&groups, self.top_n), &chart)
        {
            Ok(()) => {
                tracing::info!(path = %chart.display(), "wrote chart");
                Visualization::Rendered { path: chart }
            }
            Err(error) => {
                tracing::warn!(%error, "chart rendering skipped");
                Visualization::Skipped {
                    reason: error.to_string(),
                }
            }
        };

        let outcome = AnalysisOutcome {
            groups: groups.len(),
            artifact,
            visualization,
        };
        self.record(Some(outcome.clone()));
        Ok(outcome)
    }

    /// Forget the previous outcome, e.g. before a new run starts.
    pub fn clear_outcome(&self) {
        self.record(None);
    }

    fn record(&self, outcome: Option<AnalysisOutcome>) {
        if let Ok(mut last) = self.last.lock() {
            *last = outcome;
        }
    }
}

impl Task for AnalysisStage {
    fn run(&self, _ctx: &TaskContext) -> anyhow::Result<()> {
        self.analyze()?;
        Ok(())
    }
}

/// Top `n` groups, ascending by mean for display.
#[must_use]
pub fn display_rows(groups: &[RatingGroup], n: usize) -> Vec<RatingGroup> {
    let mut top: Vec<RatingGroup> = groups.iter().take(n).cloned().collect();
    top.reverse();
    top
}

/// Write `groups` as CSV to a temporary file beside `path`, then rename it
/// into place so readers see either the old or the new artifact.
fn write_artifact(path: &Path, groups: &[RatingGroup]) -> Result<(), StageError> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut file =
        tempfile::NamedTempFile::new_in(dir).map_err(|e| StageError::artifact(path, e))?;
    {
        let mut writer = csv::WriterBuilder::new()
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(file.as_file_mut());
        for group in groups {
            writer
                .serialize(group)
                .map_err(|e| StageError::artifact(path, e))?;
        }
        writer.flush().map_err(|e| StageError::artifact(path, e))?;
    }
    file.persist(path)
        .map_err(|e| StageError::artifact(path, e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    struct BrokenRenderer;

    impl ChartRenderer for BrokenRenderer {
        fn render(&self, _: &[RatingGroup], path: &Path) -> Result<(), StageError> {
            Err(StageError::artifact(path, "no display backend"))
        }
    }

    fn store_with_facts(rows: &[(&str, f64)]) -> Arc<StoreGateway> {
        let store = Arc::new(StoreGateway::open_in_memory().unwrap());
        let values = rows
            .iter()
            .map(|(title, rating)| format!("('{title}', {rating:?})"))
            .collect::<Vec<_>>()
            .join(", ");
        store
            .replace_table_as(
                FACT_TABLE,
                &format!(
                    "SELECT title, CAST(rating AS DOUBLE) AS rating FROM (VALUES {values}) t(title, rating)"
                ),
                |_| Ok(()),
            )
            .unwrap();
        store
    }

    fn group(title: &str, avg_rating: f64, n: u64) -> RatingGroup {
        RatingGroup {
            title: title.to_string(),
            avg_rating,
            n,
        }
    }

    #[test]
    fn groups_are_ordered_by_mean_then_count_then_title() {
        let store = store_with_facts(&[
            ("B", 4.0),
            ("A", 4.0),
            ("C", 4.0),
            ("C", 4.0),
            ("D", 1.0),
            ("D", 2.0),
            ("D", 2.0),
        ]);
        let dir = tempfile::TempDir::new().unwrap();
        let stage = AnalysisStage::new(store, dir.path(), 10);

        assert_eq!(
            stage.aggregate().unwrap(),
            vec![
                group("C", 4.0, 2),
                group("A", 4.0, 1),
                group("B", 4.0, 1),
                group("D", 1.67, 3),
            ]
        );
    }

    #[test]
    fn artifact_has_header_and_all_groups() {
        let store = store_with_facts(&[("A", 4.0), ("A", 2.0), ("B", 5.0)]);
        let dir = tempfile::TempDir::new().unwrap();
        let stage = AnalysisStage::new(store, dir.path().join("out"), 10);

        let outcome = stage.analyze().unwrap();

        assert_eq!(outcome.groups, 2);
        assert_eq!(
            std::fs::read_to_string(&outcome.artifact).unwrap(),
            "title,avg_rating,n\nB,5.0,1\nA,3.0,2\n"
        );
        assert!(outcome.visualization.is_rendered());
        assert!(stage.chart_path().exists());
        assert_eq!(stage.last_outcome(), Some(outcome));
    }

    #[test]
    fn chart_failure_is_recorded_not_raised() {
        let store = store_with_facts(&[("A", 4.0), ("A", 2.0)]);
        let dir = tempfile::TempDir::new().unwrap();
        let stage =
            AnalysisStage::new(store, dir.path(), 10).with_renderer(Arc::new(BrokenRenderer));

        let outcome = stage.analyze().unwrap();

        assert!(matches!(
            &outcome.visualization,
            Visualization::Skipped { reason } if reason.contains("no display backend")
        ));
        assert_eq!(
            std::fs::read_to_string(stage.artifact_path()).unwrap(),
            "title,avg_rating,n\nA,3.0,2\n"
        );
        assert!(!stage.chart_path().exists());
    }

    #[test]
    fn empty_aggregation_fails() {
        let store = Arc::new(StoreGateway::open_in_memory().unwrap());
        store
            .replace_table_as(
                FACT_TABLE,
                "SELECT 'x' AS title, 1.0 AS rating WHERE false",
                |_| Ok(()),
            )
            .unwrap();
        let dir = tempfile::TempDir::new().unwrap();

        let err = AnalysisStage::new(store, dir.path(), 10).analyze().unwrap_err();

        assert!(matches!(err, StageError::EmptyResult { .. }));
        assert!(!dir.path().join(ARTIFACT_FILE).exists());
    }

    #[test]
    fn failed_analysis_forgets_the_previous_outcome() {
        let store = store_with_facts(&[("A", 4.0)]);
        let dir = tempfile::TempDir::new().unwrap();
        let stage = AnalysisStage::new(Arc::clone(&store), dir.path(), 10);
        stage.analyze().unwrap();
        assert!(stage.last_outcome().is_some());

        store.drop_tables_if_exist(&[FACT_TABLE]).unwrap();
        assert!(stage.analyze().is_err());

        assert_eq!(stage.last_outcome(), None);
    }

    #[test]
    fn display_rows_take_top_n_ascending() {
        let groups = vec![group("A", 5.0, 1), group("B", 4.0, 1), group("C", 3.0, 1)];
        let titles: Vec<String> = display_rows(&groups, 2)
            .into_iter()
            .map(|g| g.title)
            .collect();
        assert_eq!(titles, vec!["B", "A"]);
    }
}
