//! Validation stage: the fact relation must hold at least one row.

use std::sync::Arc;

use reel_flow::{Task, TaskContext};
use reel_store::StoreGateway;

use crate::error::StageError;
use crate::merge::FACT_TABLE;

/// Read-only row count gate.
pub struct ValidationStage {
    store: Arc<StoreGateway>,
}

impl ValidationStage {
    pub const fn new(store: Arc<StoreGateway>) -> Self {
        Self { store }
    }

    /// # Errors
    ///
    /// Returns [`StageError::EmptyResult`] when the fact relation has no rows,
    /// or [`StageError::StoreUnavailable`] if it cannot be counted.
    pub fn validate(&self) -> Result<u64, StageError> {
        let rows = self.store.count_rows(FACT_TABLE)?;
        if rows == 0 {
            return Err(StageError::EmptyResult {
                relation: FACT_TABLE.to_string(),
            });
        }
        tracing::info!(table = FACT_TABLE, rows, "row count ok");
        Ok(rows)
    }
}

impl Task for ValidationStage {
    fn run(&self, _ctx: &TaskContext) -> anyhow::Result<()> {
        self.validate()?;
        Ok(())
    }
}
