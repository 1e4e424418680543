//! Store error types.

/// Errors that can occur in the storage gateway.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// `DuckDB` operation failed.
    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    /// The connection URI could not be understood.
    #[error("Invalid store URI '{uri}': {reason}")]
    InvalidUri {
        /// The URI as configured.
        uri: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A table or column name is not a plain SQL identifier.
    #[error("Invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    /// A row does not match the width of the target table.
    #[error("Row {row} has {found} values, table {table} has {expected} columns")]
    RowShape {
        /// Target table.
        table: String,
        /// Zero-based row index.
        row: usize,
        /// Column count of the table.
        expected: usize,
        /// Value count of the row.
        found: usize,
    },

    /// A relation required by the caller does not exist.
    #[error("Relation not found: {0}")]
    MissingRelation(String),

    /// The shared root connection mutex was poisoned by a panicking holder.
    #[error("Store connection is poisoned")]
    Poisoned,

    /// I/O error (creating the directory of a file-backed store).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
