//! # reel-store
//!
//! `DuckDB` storage gateway for the reel pipeline.
//!
//! The gateway owns one root connection per run. Every unit of work gets its
//! own session (a cloned connection onto the same database) and its own
//! transaction, committed only when the work returns `Ok`. Dropping a
//! transaction on any other exit path rolls it back, so no caller can leave a
//! relation half written.
//!
//! Replace-table writes run `CREATE OR REPLACE TABLE` and the row load inside
//! one transaction. Readers on other sessions keep seeing the previous
//! contents until the commit, which makes the replace an atomic swap.

pub mod error;
pub mod location;
pub mod schema;

pub use error::StoreError;
pub use location::StoreLocation;
pub use schema::{ColumnDef, ColumnType, TableDef};

pub use duckdb::types::Value;
pub use duckdb::{Row, Transaction};

use std::sync::Mutex;

use duckdb::{Connection, appender_params_from_iter, params};

const RELATION_EXISTS_SQL: &str = "SELECT count(*) FROM information_schema.tables
     WHERE table_schema = 'main' AND table_name = ?";

/// Connection-managed handle to the relational store.
///
/// `StoreGateway` is `Sync`: share it behind an `Arc` and let each task open
/// its own session.
pub struct StoreGateway {
    location: StoreLocation,
    root: Mutex<Connection>,
}

impl StoreGateway {
    /// Open the store named by a connection URI.
    ///
    /// Creates the parent directory of a file-backed store if needed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidUri`] for unusable URIs, [`StoreError::Io`]
    /// if the directory cannot be created, or [`StoreError::DuckDb`] if the
    /// database cannot be opened.
    pub fn open(uri: &str) -> Result<Self, StoreError> {
        let location = StoreLocation::parse(uri)?;
        let conn = match &location {
            StoreLocation::Memory => Connection::open_in_memory()?,
            StoreLocation::File(path) => {
                if let Some(parent) = path.parent()
                    && !parent.as_os_str().is_empty()
                {
                    std::fs::create_dir_all(parent)?;
                }
                Connection::open(path)?
            }
        };
        tracing::debug!(?location, "opened store");
        Ok(Self {
            location,
            root: Mutex::new(conn),
        })
    }

    /// Open an in-memory store (for testing).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuckDb`] if `DuckDB` cannot allocate the database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::open(":memory:")
    }

    #[must_use]
    pub const fn location(&self) -> &StoreLocation {
        &self.location
    }

    /// Open a new session onto the shared database.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Poisoned`] if the root connection mutex is
    /// poisoned, or [`StoreError::DuckDb`] if cloning the connection fails.
    pub fn session(&self) -> Result<Connection, StoreError> {
        let root = self.root.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(root.try_clone()?)
    }

    /// Run `work` inside a fresh session and transaction.
    ///
    /// Commits when `work` returns `Ok`; the transaction is rolled back on
    /// error or panic.
    ///
    /// # Errors
    ///
    /// Propagates the error from `work`, or a [`StoreError::DuckDb`] from
    /// beginning or committing the transaction.
    pub fn with_transaction<T, F>(&self, work: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, StoreError>,
    {
        let mut conn = self.session()?;
        let tx = conn.transaction()?;
        let out = work(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    /// Replace `def.name` with exactly `rows`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::RowShape`] if a row's width differs from the
    /// column count, [`StoreError::InvalidIdentifier`] for unsafe names, or
    /// [`StoreError::DuckDb`] if the write fails. Nothing is committed on error.
    pub fn replace_table(&self, def: &TableDef, rows: &[Vec<Value>]) -> Result<u64, StoreError> {
        let ddl = def.create_or_replace_sql()?;
        if let Some((row, values)) = rows
            .iter()
            .enumerate()
            .find(|(_, values)| values.len() != def.columns.len())
        {
            return Err(StoreError::RowShape {
                table: def.name.clone(),
                row,
                expected: def.columns.len(),
                found: values.len(),
            });
        }

        self.with_transaction(|tx| {
            tx.execute_batch(&ddl)?;
            let mut appender = tx.appender(&def.name)?;
            for values in rows {
                appender.append_row(appender_params_from_iter(values.iter()))?;
            }
            appender.flush()?;
            drop(appender);
            count_in(tx, &def.name)
        })
        .inspect(|count| tracing::debug!(table = %def.name, rows = count, "replaced table"))
    }

    /// Replace `name` with the result of `select_sql`.
    ///
    /// `precondition` runs first in the same transaction, so a caller can
    /// check its inputs against the snapshot the replace reads from.
    ///
    /// # Errors
    ///
    /// Propagates the precondition's error, otherwise as [`Self::replace_table`].
    pub fn replace_table_as<P>(
        &self,
        name: &str,
        select_sql: &str,
        precondition: P,
    ) -> Result<u64, StoreError>
    where
        P: FnOnce(&Transaction<'_>) -> Result<(), StoreError>,
    {
        let name = schema::identifier(name)?;
        self.with_transaction(|tx| {
            precondition(tx)?;
            tx.execute_batch(&format!("CREATE OR REPLACE TABLE {name} AS {select_sql}"))?;
            count_in(tx, name)
        })
        .inspect(|count| tracing::debug!(table = name, rows = count, "replaced table"))
    }

    /// Whether a relation named `name` exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuckDb`] if the catalog query fails.
    pub fn relation_exists(&self, name: &str) -> Result<bool, StoreError> {
        self.with_transaction(|tx| exists_in(tx, name))
    }

    /// Row count of an existing relation.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::MissingRelation`] if `name` does not exist.
    pub fn count_rows(&self, name: &str) -> Result<u64, StoreError> {
        self.with_transaction(|tx| count_in(tx, name))
    }

    /// Drop every relation in `names` that exists; absent ones are skipped.
    ///
    /// Returns the names that were actually dropped.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuckDb`] if a drop fails; no drop is committed then.
    pub fn drop_tables_if_exist(&self, names: &[&str]) -> Result<Vec<String>, StoreError> {
        self.with_transaction(|tx| {
            let mut dropped = Vec::new();
            for name in names {
                let name = schema::identifier(name)?;
                if exists_in(tx, name)? {
                    dropped.push(name.to_string());
                }
                tx.execute_batch(&format!("DROP TABLE IF EXISTS {name}"))?;
            }
            Ok(dropped)
        })
    }

    /// Run a read query in its own transaction and map every row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuckDb`] if preparing, executing, or mapping fails.
    pub fn query_rows<T, F>(&self, sql: &str, map: F) -> Result<Vec<T>, StoreError>
    where
        F: FnMut(&Row<'_>) -> duckdb::Result<T>,
    {
        self.with_transaction(|tx| {
            let mut stmt = tx.prepare(sql)?;
            let rows = stmt
                .query_map([], map)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

/// Whether `name` exists, as seen by `tx`.
///
/// # Errors
///
/// Returns [`StoreError::DuckDb`] if the catalog query fails.
pub fn exists_in(tx: &Transaction<'_>, name: &str) -> Result<bool, StoreError> {
    let count: i64 = tx.query_row(RELATION_EXISTS_SQL, params![name], |row| row.get(0))?;
    Ok(count > 0)
}

/// Row count of `name`, as seen by `tx`.
///
/// # Errors
///
/// Returns [`StoreError::MissingRelation`] if `name` does not exist.
pub fn count_in(tx: &Transaction<'_>, name: &str) -> Result<u64, StoreError> {
    let name = schema::identifier(name)?;
    if !exists_in(tx, name)? {
        return Err(StoreError::MissingRelation(name.to_string()));
    }
    let count: i64 = tx.query_row(&format!("SELECT count(*) FROM {name}"), [], |row| {
        row.get(0)
    })?;
    Ok(count.unsigned_abs())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn ratings_def() -> TableDef {
        TableDef::new(
            "stg_ratings",
            vec![
                ColumnDef::new("movie_id", ColumnType::Integer),
                ColumnDef::new("rating", ColumnType::Double),
            ],
        )
    }

    fn rating(movie_id: i64, rating: f64) -> Vec<Value> {
        vec![Value::BigInt(movie_id), Value::Double(rating)]
    }

    fn ratings_in(store: &StoreGateway) -> Vec<(i64, f64)> {
        store
            .query_rows(
                "SELECT movie_id, rating FROM stg_ratings ORDER BY movie_id, rating",
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap()
    }

    #[test]
    fn replace_table_creates_and_loads() {
        let store = StoreGateway::open_in_memory().unwrap();
        let count = store
            .replace_table(&ratings_def(), &[rating(1, 4.0), rating(2, 3.5)])
            .unwrap();

        assert_eq!(count, 2);
        assert!(store.relation_exists("stg_ratings").unwrap());
        assert_eq!(ratings_in(&store), vec![(1, 4.0), (2, 3.5)]);
    }

    #[test]
    fn replace_table_discards_previous_contents() {
        let store = StoreGateway::open_in_memory().unwrap();
        store
            .replace_table(&ratings_def(), &[rating(1, 4.0), rating(2, 3.5)])
            .unwrap();
        store
            .replace_table(&ratings_def(), &[rating(9, 1.0)])
            .unwrap();

        assert_eq!(ratings_in(&store), vec![(9, 1.0)]);
    }

    #[test]
    fn replace_table_is_idempotent() {
        let store = StoreGateway::open_in_memory().unwrap();
        let rows = [rating(3, 2.0), rating(1, 5.0)];
        store.replace_table(&ratings_def(), &rows).unwrap();
        let first = ratings_in(&store);
        store.replace_table(&ratings_def(), &rows).unwrap();
        assert_eq!(ratings_in(&store), first);
    }

    #[test]
    fn malformed_row_leaves_previous_contents() {
        let store = StoreGateway::open_in_memory().unwrap();
        store
            .replace_table(&ratings_def(), &[rating(1, 4.0)])
            .unwrap();

        let err = store
            .replace_table(&ratings_def(), &[rating(2, 1.0), vec![Value::BigInt(3)]])
            .unwrap_err();

        assert!(matches!(err, StoreError::RowShape { row: 1, .. }));
        assert_eq!(ratings_in(&store), vec![(1, 4.0)]);
    }

    #[test]
    fn failed_transaction_rolls_back() {
        let store = StoreGateway::open_in_memory().unwrap();
        store
            .replace_table(&ratings_def(), &[rating(1, 4.0)])
            .unwrap();

        let result: Result<(), StoreError> = store.with_transaction(|tx| {
            tx.execute_batch("DELETE FROM stg_ratings")?;
            Err(StoreError::MissingRelation("simulated".into()))
        });

        assert!(result.is_err());
        assert_eq!(store.count_rows("stg_ratings").unwrap(), 1);
    }

    #[test]
    fn count_rows_on_missing_relation() {
        let store = StoreGateway::open_in_memory().unwrap();
        let err = store.count_rows("fact_movie_ratings").unwrap_err();
        assert!(matches!(err, StoreError::MissingRelation(name) if name == "fact_movie_ratings"));
    }

    #[test]
    fn replace_table_as_runs_precondition_first() {
        let store = StoreGateway::open_in_memory().unwrap();
        let err = store
            .replace_table_as("fact", "SELECT 1 AS x", |tx| {
                if exists_in(tx, "stg_ratings")? {
                    Ok(())
                } else {
                    Err(StoreError::MissingRelation("stg_ratings".into()))
                }
            })
            .unwrap_err();

        assert!(matches!(err, StoreError::MissingRelation(_)));
        assert!(!store.relation_exists("fact").unwrap());
    }

    #[test]
    fn drop_tables_skips_missing_ones() {
        let store = StoreGateway::open_in_memory().unwrap();
        store
            .replace_table(&ratings_def(), &[rating(1, 4.0)])
            .unwrap();

        let dropped = store
            .drop_tables_if_exist(&["stg_movies", "stg_ratings"])
            .unwrap();
        assert_eq!(dropped, vec!["stg_ratings".to_string()]);
        assert!(!store.relation_exists("stg_ratings").unwrap());

        let again = store
            .drop_tables_if_exist(&["stg_movies", "stg_ratings"])
            .unwrap();
        assert!(again.is_empty());
    }

    #[test]
    fn sessions_share_one_database() {
        let store = StoreGateway::open_in_memory().unwrap();
        store
            .replace_table(&ratings_def(), &[rating(1, 4.0)])
            .unwrap();

        let other = store.session().unwrap();
        let count: i64 = other
            .query_row("SELECT count(*) FROM stg_ratings", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
