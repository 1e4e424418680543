//! Table definitions for replace-table writes.

use crate::StoreError;

/// Column types the pipeline writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Double,
    Text,
}

impl ColumnType {
    /// `DuckDB` type name used in DDL.
    #[must_use]
    pub const fn sql_type(self) -> &'static str {
        match self {
            Self::Integer => "BIGINT",
            Self::Double => "DOUBLE",
            Self::Text => "VARCHAR",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub ty: ColumnType,
}

impl ColumnDef {
    #[must_use]
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// A relation's name and column layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDef {
    pub name: String,
    pub columns: Vec<ColumnDef>,
}

impl TableDef {
    #[must_use]
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDef>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }

    /// `CREATE OR REPLACE TABLE` statement for this definition.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidIdentifier`] if the table or any column
    /// name is not a plain identifier.
    pub fn create_or_replace_sql(&self) -> Result<String, StoreError> {
        let name = identifier(&self.name)?;
        let columns = self
            .columns
            .iter()
            .map(|c| Ok(format!("{} {}", identifier(&c.name)?, c.ty.sql_type())))
            .collect::<Result<Vec<_>, StoreError>>()?;
        Ok(format!(
            "CREATE OR REPLACE TABLE {name} ({})",
            columns.join(", ")
        ))
    }
}

/// Validate that `name` is safe to splice into SQL unquoted.
///
/// Only lowercase ASCII letters, digits, and `_` are accepted, and the first
/// character must not be a digit.
///
/// # Errors
///
/// Returns [`StoreError::InvalidIdentifier`] otherwise.
pub fn identifier(name: &str) -> Result<&str, StoreError> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if valid_start && valid_rest {
        Ok(name)
    } else {
        Err(StoreError::InvalidIdentifier(name.to_string()))
    }
}
