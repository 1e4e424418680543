//! Merge stage: staging relations to the fact relation.

use std::sync::Arc;

use reel_flow::{Task, TaskContext};
use reel_store::{StoreError, StoreGateway, exists_in};

use crate::datasets::STAGING_TABLES;
use crate::error::StageError;

/// The merged relation read by validation and analysis.
pub const FACT_TABLE: &str = "fact_movie_ratings";

const MERGE_SQL: &str = "SELECT r.movie_id, r.rating, r.rating * r.rating AS rating2, m.title, m.year \
     FROM stg_ratings r \
     INNER JOIN stg_movies m ON r.movie_id = m.movie_id";

/// Joins ratings to movies on `movie_id`, adds `rating2`, and replaces the
/// fact relation with the result.
pub struct MergeStage {
    store: Arc<StoreGateway>,
}

impl MergeStage {
    pub const fn new(store: Arc<StoreGateway>) -> Self {
        Self { store }
    }

    /// Rebuild the fact relation. Returns its row count.
    ///
    /// # Errors
    ///
    /// Returns [`StageError::StoreUnavailable`] wrapping
    /// [`StoreError::MissingRelation`] if either staging relation is absent,
    /// or any other store failure.
    pub fn merge(&self) -> Result<u64, StageError> {
        let rows = self.store.replace_table_as(FACT_TABLE, MERGE_SQL, |tx| {
            for table in STAGING_TABLES {
                if !exists_in(tx, table)? {
                    return Err(StoreError::MissingRelation(table.to_string()));
                }
            }
            Ok(())
        })?;
        tracing::info!(table = FACT_TABLE, rows, "merged records");
        Ok(rows)
    }
}

impl Task for MergeStage {
    fn run(&self, _ctx: &TaskContext) -> anyhow::Result<()> {
        self.merge()?;
        Ok(())
    }
}
