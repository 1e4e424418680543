//! The `etl_movies_ratings` pipeline.
//!
//! ```text
//! ingest_transform_parallel { ingest_movies, ingest_ratings }
//!   -> merge_and_load_final -> validate_rowcount -> perform_analysis
//!   -> { cleanup_stage_db, cleanup_files }
//! ```

use std::future::Future;
use std::sync::Arc;

use chrono::NaiveDate;
use reel_config::ReelConfig;
use reel_flow::{
    FlowError, Orchestrator, RetryPolicy, RunReport, TaskContext, TaskGraph, TaskGroup, TaskSpec,
};
use reel_store::{StoreError, StoreGateway};
use serde::Serialize;

use crate::analysis::{AnalysisOutcome, AnalysisStage};
use crate::cleanup::{FilesystemCleanup, StorageCleanup};
use crate::datasets::{MOVIES, RATINGS};
use crate::loader::DatasetLoader;
use crate::merge::MergeStage;
use crate::render::ChartRenderer;
use crate::validate::ValidationStage;

pub const PIPELINE_ID: &str = "etl_movies_ratings";

/// Task and group ids.
pub mod ids {
    pub const INGEST_GROUP: &str = "ingest_transform_parallel";
    pub const INGEST_MOVIES: &str = "ingest_movies";
    pub const INGEST_RATINGS: &str = "ingest_ratings";
    pub const MERGE: &str = "merge_and_load_final";
    pub const VALIDATE: &str = "validate_rowcount";
    pub const ANALYZE: &str = "perform_analysis";
    pub const CLEANUP_DB: &str = "cleanup_stage_db";
    pub const CLEANUP_FILES: &str = "cleanup_files";
}

/// Descriptive metadata handed to whatever triggers the pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineInfo {
    pub id: &'static str,
    pub description: &'static str,
    pub tags: Vec<&'static str>,
    pub start_date: NaiveDate,
    pub cadence: String,
    pub catchup: bool,
}

/// The fixed movies/ratings pipeline bound to one store and configuration.
pub struct EtlPipeline {
    config: ReelConfig,
    store: Arc<StoreGateway>,
    analysis: Arc<AnalysisStage>,
}

impl EtlPipeline {
    pub fn new(config: ReelConfig, store: Arc<StoreGateway>) -> Self {
        let analysis = Arc::new(AnalysisStage::new(
            Arc::clone(&store),
            config.paths.output_dir.clone(),
            config.analysis.top_n,
        ));
        Self {
            config,
            store,
            analysis,
        }
    }

    /// Open the store named by `config.store.uri` and bind the pipeline to it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot be opened.
    pub fn open(config: ReelConfig) -> Result<Self, StoreError> {
        let store = Arc::new(StoreGateway::open(&config.store.uri)?);
        Ok(Self::new(config, store))
    }

    /// Replace the chart renderer used by the analysis task.
    #[must_use]
    pub fn with_renderer(mut self, renderer: Arc<dyn ChartRenderer>) -> Self {
        self.analysis = Arc::new(
            AnalysisStage::new(
                Arc::clone(&self.store),
                self.config.paths.output_dir.clone(),
                self.config.analysis.top_n,
            )
            .with_renderer(renderer),
        );
        self
    }

    #[must_use]
    pub const fn config(&self) -> &ReelConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &Arc<StoreGateway> {
        &self.store
    }

    #[must_use]
    pub fn info(&self) -> PipelineInfo {
        PipelineInfo {
            id: PIPELINE_ID,
            description: "Ingest two related datasets, transform in parallel, merge into the store, analyze, clean up",
            tags: vec!["demo", "etl", "parallel"],
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default(),
            cadence: self.config.schedule.cadence.clone(),
            catchup: self.config.schedule.catchup,
        }
    }

    /// Outcome of the last analysis this pipeline ran, if any.
    #[must_use]
    pub fn last_analysis(&self) -> Option<AnalysisOutcome> {
        self.analysis.last_outcome()
    }

    fn retry(&self, task_id: &str) -> RetryPolicy {
        let resolved = self.config.retry.resolve(task_id);
        RetryPolicy::new(resolved.retries, resolved.delay)
    }

    fn member_retry(&self, name: &str) -> RetryPolicy {
        self.retry(&format!("{}.{name}", ids::INGEST_GROUP))
    }

    /// Build the task graph.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError`] only if the fixed topology fails validation.
    pub fn graph(&self) -> Result<TaskGraph, FlowError> {
        let paths = &self.config.paths;
        let store = &self.store;
        let analysis = Arc::clone(&self.analysis);

        TaskGraph::builder()
            .group(
                TaskGroup::new(ids::INGEST_GROUP)
                    .member(
                        TaskSpec::new(
                            ids::INGEST_MOVIES,
                            DatasetLoader::new(MOVIES, &paths.input_dir, Arc::clone(store)),
                        )
                        .with_retry(self.member_retry(ids::INGEST_MOVIES)),
                    )
                    .member(
                        TaskSpec::new(
                            ids::INGEST_RATINGS,
                            DatasetLoader::new(RATINGS, &paths.input_dir, Arc::clone(store)),
                        )
                        .with_retry(self.member_retry(ids::INGEST_RATINGS)),
                    ),
            )
            .task(
                TaskSpec::new(ids::MERGE, MergeStage::new(Arc::clone(store)))
                    .after(ids::INGEST_GROUP)
                    .with_retry(self.retry(ids::MERGE)),
            )
            .task(
                TaskSpec::new(ids::VALIDATE, ValidationStage::new(Arc::clone(store)))
                    .after(ids::MERGE)
                    .with_retry(self.retry(ids::VALIDATE)),
            )
            .task(
                TaskSpec::new(ids::ANALYZE, move |_: &TaskContext| -> anyhow::Result<()> {
                    analysis.analyze()?;
                    Ok(())
                })
                .after(ids::VALIDATE)
                .with_retry(self.retry(ids::ANALYZE)),
            )
            .task(
                TaskSpec::new(ids::CLEANUP_DB, StorageCleanup::new(Arc::clone(store)))
                    .after(ids::ANALYZE)
                    .with_retry(self.retry(ids::CLEANUP_DB)),
            )
            .task(
                TaskSpec::new(
                    ids::CLEANUP_FILES,
                    FilesystemCleanup {
                        scratch_dir: paths.scratch_dir.clone(),
                        input_dir: paths.input_dir.clone(),
                        temp_suffix: paths.temp_suffix.clone(),
                    },
                )
                .after(ids::ANALYZE)
                .with_retry(self.retry(ids::CLEANUP_FILES)),
            )
            .build()
    }

    /// Run the pipeline once for `logical_date`.
    ///
    /// # Errors
    ///
    /// See [`Orchestrator::run`].
    pub async fn run(&self, logical_date: NaiveDate) -> Result<RunReport, FlowError> {
        self.run_until(logical_date, std::future::pending()).await
    }

    /// Run once, stopping dispatch when `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// See [`Orchestrator::run_until`].
    pub async fn run_until<S>(
        &self,
        logical_date: NaiveDate,
        shutdown: S,
    ) -> Result<RunReport, FlowError>
    where
        S: Future<Output = ()>,
    {
        let graph = self.graph()?;
        self.analysis.clear_outcome();
        Orchestrator::new(PIPELINE_ID)
            .run_until(&graph, logical_date, shutdown)
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use reel_config::RetryOverride;
    use reel_core::TaskId;

    use super::*;

    fn pipeline(config: ReelConfig) -> EtlPipeline {
        EtlPipeline::new(config, Arc::new(StoreGateway::open_in_memory().unwrap()))
    }

    #[test]
    fn graph_has_the_fixed_topology() {
        let graph = pipeline(ReelConfig::default()).graph().unwrap();
        let order: Vec<&str> = graph
            .topological_order()
            .into_iter()
            .map(TaskId::as_str)
            .collect();

        assert_eq!(order.len(), 7);
        let merge = graph.node(&TaskId::new(ids::MERGE)).unwrap();
        assert_eq!(
            merge.upstream.iter().map(TaskId::as_str).collect::<Vec<_>>(),
            vec![
                "ingest_transform_parallel.ingest_movies",
                "ingest_transform_parallel.ingest_ratings"
            ]
        );
        for cleanup in [ids::CLEANUP_DB, ids::CLEANUP_FILES] {
            let node = graph.node(&TaskId::new(cleanup)).unwrap();
            assert_eq!(
                node.upstream.iter().map(TaskId::as_str).collect::<Vec<_>>(),
                vec![ids::ANALYZE]
            );
        }
    }

    #[test]
    fn retry_overrides_apply_by_task_id() {
        let mut config = ReelConfig::default();
        config.retry.overrides.insert(
            "ingest_transform_parallel.ingest_movies".to_string(),
            RetryOverride {
                retries: Some(3),
                delay_secs: Some(5),
            },
        );
        let graph = pipeline(config).graph().unwrap();

        let movies = graph
            .node(&TaskId::new("ingest_transform_parallel.ingest_movies"))
            .unwrap();
        assert_eq!(movies.retry, RetryPolicy::new(3, Duration::from_secs(5)));
        let merge = graph.node(&TaskId::new(ids::MERGE)).unwrap();
        assert_eq!(merge.retry, RetryPolicy::new(1, Duration::from_secs(120)));
    }

    #[test]
    fn info_carries_schedule_metadata() {
        let info = pipeline(ReelConfig::default()).info();
        assert_eq!(info.id, "etl_movies_ratings");
        assert_eq!(info.cadence, "@daily");
        assert!(!info.catchup);
        assert_eq!(info.tags, vec!["demo", "etl", "parallel"]);
    }
}
