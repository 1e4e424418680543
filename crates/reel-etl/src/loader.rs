//! Dataset loader: CSV source to staging relation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use csv::{ReaderBuilder, StringRecord, Trim};
use reel_flow::{Task, TaskContext};
use reel_store::{ColumnType, StoreGateway, Value};

use crate::datasets::DatasetSpec;
use crate::error::StageError;

/// Reads one dataset, coerces its declared columns, and replaces its staging
/// relation with the result.
pub struct DatasetLoader {
    spec: DatasetSpec,
    input_dir: PathBuf,
    store: Arc<StoreGateway>,
}

impl DatasetLoader {
    pub fn new(spec: DatasetSpec, input_dir: impl Into<PathBuf>, store: Arc<StoreGateway>) -> Self {
        Self {
            spec,
            input_dir: input_dir.into(),
            store,
        }
    }

    #[must_use]
    pub fn source_path(&self) -> PathBuf {
        self.input_dir.join(self.spec.file_name)
    }

    /// Parse the source into rows of declared columns, in declared order.
    ///
    /// # Errors
    ///
    /// See [`read_source`].
    pub fn read(&self) -> Result<Vec<Vec<Value>>, StageError> {
        read_source(&self.spec, &self.source_path())
    }

    /// Read the source and replace the staging relation. Returns the row count.
    ///
    /// # Errors
    ///
    /// [`StageError::SourceData`] from [`Self::read`], or
    /// [`StageError::StoreUnavailable`] if the replace fails.
    pub fn load(&self) -> Result<u64, StageError> {
        let rows = self.read()?;
        let count = self.store.replace_table(&self.spec.table_def(), &rows)?;
        tracing::info!(
            dataset = self.spec.name,
            table = self.spec.table,
            rows = count,
            "dataset ingested"
        );
        Ok(count)
    }
}

/// Parse `path` as `spec`: locate every declared column by header name, then
/// coerce each record. Undeclared columns are dropped.
///
/// # Errors
///
/// Returns [`StageError::SourceData`] if the file cannot be read, a declared
/// column is absent, or a value fails coercion.
pub fn read_source(spec: &DatasetSpec, path: &Path) -> Result<Vec<Vec<Value>>, StageError> {
    let dataset = spec.name;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::Headers)
        .from_path(path)
        .map_err(|e| {
            StageError::source_data(dataset, format!("cannot open {}: {e}", path.display()))
        })?;

    let headers = reader
        .headers()
        .map_err(|e| StageError::source_data(dataset, format!("unreadable header: {e}")))?
        .clone();
    let positions = column_positions(spec, &headers, path)?;

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let line = index + 1;
        let record =
            record.map_err(|e| StageError::source_data(dataset, format!("row {line}: {e}")))?;
        rows.push(coerce_record(spec, &record, &positions, line)?);
    }
    Ok(rows)
}

fn column_positions(
    spec: &DatasetSpec,
    headers: &StringRecord,
    path: &Path,
) -> Result<Vec<usize>, StageError> {
    spec.columns
        .iter()
        .map(|(name, _)| {
            headers.iter().position(|h| h == *name).ok_or_else(|| {
                StageError::source_data(
                    spec.name,
                    format!("missing column `{name}` in {}", path.display()),
                )
            })
        })
        .collect()
}

fn coerce_record(
    spec: &DatasetSpec,
    record: &StringRecord,
    positions: &[usize],
    line: usize,
) -> Result<Vec<Value>, StageError> {
    positions
        .iter()
        .zip(spec.columns)
        .map(|(&position, &(name, ty))| {
            let raw = record.get(position).unwrap_or_default();
            coerce(raw, ty).map_err(|reason| {
                StageError::source_data(spec.name, format!("row {line}, column `{name}`: {reason}"))
            })
        })
        .collect()
}

/// Coerce one raw field to the column's type.
fn coerce(raw: &str, ty: ColumnType) -> Result<Value, String> {
    let trimmed = raw.trim();
    match ty {
        ColumnType::Text => Ok(Value::Text(trimmed.to_string())),
        ColumnType::Integer => trimmed
            .parse::<i64>()
            .map(Value::BigInt)
            .map_err(|e| format!("{raw:?} is not an integer ({e})")),
        ColumnType::Double => match trimmed.parse::<f64>() {
            Ok(value) if value.is_finite() => Ok(Value::Double(value)),
            Ok(_) => Err(format!("{raw:?} is not a finite number")),
            Err(e) => Err(format!("{raw:?} is not a number ({e})")),
        },
    }
}

impl Task for DatasetLoader {
    fn run(&self, _ctx: &TaskContext) -> anyhow::Result<()> {
        self.load()?;
        Ok(())
    }
}

impl std::fmt::Debug for DatasetLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatasetLoader")
            .field("dataset", &self.spec.name)
            .field("source", &self.source_path())
            .finish_non_exhaustive()
    }
}
