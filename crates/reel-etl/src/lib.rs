//! # reel-etl
//!
//! Stages of the movies/ratings pipeline and the graph that wires them:
//! - Dataset loaders: CSV source to staging relation, full replace
//! - Merge: staging relations to the fact relation
//! - Validation: non-empty fact relation gate
//! - Analysis: per-title aggregation artifact plus a best-effort chart
//! - Cleanup: staging relations, scratch directory, leftover temp files
//!
//! Every stage implements [`reel_flow::Task`] and keeps its side effects
//! atomic, so any task can be retried or the whole run repeated safely.

pub mod analysis;
pub mod cleanup;
pub mod datasets;
pub mod error;
pub mod loader;
pub mod merge;
pub mod pipeline;
pub mod render;
pub mod validate;

pub use analysis::{AnalysisOutcome, AnalysisStage, RatingGroup, Visualization};
pub use cleanup::{FilesystemCleanup, StorageCleanup};
pub use datasets::{DatasetSpec, MOVIES, RATINGS};
pub use error::StageError;
pub use loader::DatasetLoader;
pub use merge::{FACT_TABLE, MergeStage};
pub use pipeline::{EtlPipeline, PIPELINE_ID, PipelineInfo, ids};
pub use render::{ChartRenderer, SvgBarChart};
pub use validate::ValidationStage;
