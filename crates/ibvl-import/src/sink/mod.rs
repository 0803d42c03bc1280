//! Relational store interface
//!
//! The loader and injector only talk to a [`TableSink`]. [`PgSink`] writes
//! to PostgreSQL; [`MemorySink`] keeps tables in memory and enforces the
//! same constraints, which is what the tests run against.

use crate::model::{Row, TableSchema};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

pub mod memory;
pub mod postgres;

pub use memory::MemorySink;
pub use postgres::{create_pool, PgSink};

/// How a failed insert is accounted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertErrorKind {
    /// Unique or primary key violation
    Duplicate,
    /// Foreign key, not-null or check violation
    Constraint,
    /// Value the column cannot hold
    Data,
    Other,
}

impl InsertErrorKind {
    /// Classify a PostgreSQL SQLSTATE code. Used for codes the driver's
    /// error kind does not name, such as data exceptions.
    pub fn from_sqlstate(code: Option<&str>) -> Self {
        match code {
            Some("23505") => InsertErrorKind::Duplicate,
            Some(code) if code.starts_with("23") => InsertErrorKind::Constraint,
            Some(code) if code.starts_with("22") => InsertErrorKind::Data,
            _ => InsertErrorKind::Other,
        }
    }
}

impl fmt::Display for InsertErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InsertErrorKind::Duplicate => "duplicate",
            InsertErrorKind::Constraint => "constraint",
            InsertErrorKind::Data => "data",
            InsertErrorKind::Other => "other",
        };
        f.write_str(name)
    }
}

/// A rolled back insert
#[derive(Debug, Clone, Error)]
#[error("{kind} error: {message}")]
pub struct InsertError {
    pub kind: InsertErrorKind,
    pub message: String,
}

impl InsertError {
    pub fn new(kind: InsertErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_duplicate(&self) -> bool {
        self.kind == InsertErrorKind::Duplicate
    }
}

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("table {0} does not exist")]
    TableNotFound(String),

    #[error("failed to describe table {table}: {message}")]
    Database { table: String, message: String },
}

/// Target of the import
#[async_trait]
pub trait TableSink: Send + Sync {
    /// Columns of a table in ordinal order
    async fn describe_table(&self, table: &str) -> Result<TableSchema, SchemaError>;

    /// Insert rows in a single transaction. Either every row is stored or
    /// none is.
    ///
    /// All rows carry the same set of columns; columns absent from the rows
    /// take their database default.
    async fn insert_rows(&self, schema: &TableSchema, rows: &[Row]) -> Result<u64, InsertError>;
}

#[async_trait]
impl<T: TableSink + ?Sized> TableSink for Arc<T> {
    async fn describe_table(&self, table: &str) -> Result<TableSchema, SchemaError> {
        (**self).describe_table(table).await
    }

    async fn insert_rows(&self, schema: &TableSchema, rows: &[Row]) -> Result<u64, InsertError> {
        (**self).insert_rows(schema, rows).await
    }
}

/// Table schemas fetched so far, by table name
#[derive(Debug, Default)]
pub struct SchemaCatalog {
    tables: HashMap<String, Arc<TableSchema>>,
}

impl SchemaCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schema of a table, described through the sink on first use
    pub async fn fetch<S: TableSink + ?Sized>(
        &mut self,
        sink: &S,
        table: &str,
    ) -> Result<Arc<TableSchema>, SchemaError> {
        if let Some(schema) = self.tables.get(table) {
            return Ok(Arc::clone(schema));
        }
        let schema = Arc::new(sink.describe_table(table).await?);
        self.tables.insert(table.to_string(), Arc::clone(&schema));
        Ok(schema)
    }

    pub fn get(&self, table: &str) -> Option<Arc<TableSchema>> {
        self.tables.get(table).cloned()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::model::{ColumnDef, ColumnType};

    #[test]
    fn test_sqlstate_classification() {
        assert_eq!(InsertErrorKind::from_sqlstate(Some("23505")), InsertErrorKind::Duplicate);
        assert_eq!(InsertErrorKind::from_sqlstate(Some("23503")), InsertErrorKind::Constraint);
        assert_eq!(InsertErrorKind::from_sqlstate(Some("23502")), InsertErrorKind::Constraint);
        assert_eq!(InsertErrorKind::from_sqlstate(Some("23514")), InsertErrorKind::Constraint);
        assert_eq!(InsertErrorKind::from_sqlstate(Some("22P02")), InsertErrorKind::Data);
        assert_eq!(InsertErrorKind::from_sqlstate(Some("22001")), InsertErrorKind::Data);
        assert_eq!(InsertErrorKind::from_sqlstate(Some("40001")), InsertErrorKind::Other);
        assert_eq!(InsertErrorKind::from_sqlstate(None), InsertErrorKind::Other);
    }

    #[tokio::test]
    async fn test_catalog_caches_schema() {
        let sink = MemorySink::new().with_table(TableSchema::new(
            "severities",
            vec![ColumnDef::new("id", ColumnType::Integer, false)],
        ));
        let mut catalog = SchemaCatalog::new();

        let schema = catalog.fetch(&sink, "severities").await.unwrap();
        assert_eq!(schema.columns.len(), 1);
        assert!(catalog.get("severities").is_some());
        assert!(catalog.fetch(&sink, "missing").await.is_err());
        assert!(catalog.get("missing").is_none());
    }
}
