//! Source datasets and their staging relations.

use reel_store::{ColumnDef, ColumnType, TableDef};

/// One external tabular source: where it lives, which columns it must carry,
/// and the staging relation it is loaded into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatasetSpec {
    pub name: &'static str,
    pub file_name: &'static str,
    pub table: &'static str,
    /// Declared columns in staging order. Text columns are trimmed.
    pub columns: &'static [(&'static str, ColumnType)],
}

pub const MOVIES: DatasetSpec = DatasetSpec {
    name: "movies",
    file_name: "movies.csv",
    table: "stg_movies",
    columns: &[
        ("movie_id", ColumnType::Integer),
        ("title", ColumnType::Text),
        ("year", ColumnType::Integer),
    ],
};

pub const RATINGS: DatasetSpec = DatasetSpec {
    name: "ratings",
    file_name: "ratings.csv",
    table: "stg_ratings",
    columns: &[
        ("movie_id", ColumnType::Integer),
        ("rating", ColumnType::Double),
    ],
};

/// Both staging relations, dropped by storage cleanup.
pub const STAGING_TABLES: [&str; 2] = [MOVIES.table, RATINGS.table];

impl DatasetSpec {
    #[must_use]
    pub fn table_def(&self) -> TableDef {
        TableDef::new(
            self.table,
            self.columns
                .iter()
                .map(|&(name, ty)| ColumnDef::new(name, ty))
                .collect(),
        )
    }
}
