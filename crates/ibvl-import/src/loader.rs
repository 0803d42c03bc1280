//! Chunked loader
//!
//! Inserts resolved rows chunk by chunk. A chunk that fails as a whole is
//! retried row by row so one bad row costs only itself.

use crate::model::{Row, TableSchema};
use crate::registry::EntityType;
use crate::sink::{InsertErrorKind, TableSink};
use crate::stats::ImportCounts;
use crate::store::{PkStore, StoreError};
use ibvl_common::logging::DATA_ISSUE_TARGET;
use tracing::{debug, warn};

pub struct ChunkedLoader<'a, S: TableSink + ?Sized> {
    sink: &'a S,
    chunk_size: usize,
}

impl<'a, S: TableSink + ?Sized> ChunkedLoader<'a, S> {
    pub fn new(sink: &'a S, chunk_size: usize) -> Self {
        Self {
            sink,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Insert rows and register the natural keys of every row that is now
    /// in the table
    pub async fn load(
        &self,
        entity: &EntityType,
        schema: &TableSchema,
        rows: &[Row],
        store: &mut PkStore,
    ) -> Result<ImportCounts, StoreError> {
        let mut counts = ImportCounts::default();

        for chunk in rows.chunks(self.chunk_size) {
            match self.sink.insert_rows(schema, chunk).await {
                Ok(_) => {
                    counts.success += chunk.len() as u64;
                    counts.successful_chunks += 1;
                    for row in chunk {
                        register(entity, row, store)?;
                    }
                }
                Err(e) => {
                    counts.failed_chunks += 1;
                    debug!(
                        table = entity.name,
                        rows = chunk.len(),
                        kind = %e.kind,
                        error = %e.message,
                        "Chunk failed, retrying rows individually"
                    );
                    for row in chunk {
                        counts += self.insert_one(entity, schema, row, store).await?;
                    }
                }
            }
        }

        Ok(counts)
    }

    async fn insert_one(
        &self,
        entity: &EntityType,
        schema: &TableSchema,
        row: &Row,
        store: &mut PkStore,
    ) -> Result<ImportCounts, StoreError> {
        let mut counts = ImportCounts::default();
        match self.sink.insert_rows(schema, std::slice::from_ref(row)).await {
            Ok(_) => {
                counts.success = 1;
                register(entity, row, store)?;
            }
            Err(e) if e.kind == InsertErrorKind::Duplicate => {
                counts.success = 1;
                counts.duplicate = 1;
                debug!(table = entity.name, id = ?row.id(), error = %e.message, "Duplicate row");
                register(entity, row, store)?;
            }
            Err(e) => {
                counts.fail = 1;
                warn!(
                    target: DATA_ISSUE_TARGET,
                    table = entity.name,
                    id = ?row.id(),
                    kind = %e.kind,
                    error = %e.message,
                    row = %row.to_json(),
                    "Failed to insert row"
                );
            }
        }
        Ok(counts)
    }
}

fn register(entity: &EntityType, row: &Row, store: &mut PkStore) -> Result<(), StoreError> {
    if let (Some(key), Some(id)) = (entity.natural_key_of(row), row.id()) {
        store.append(entity.name, &key, id)?;
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::model::{ColumnDef, ColumnType, Value};
    use crate::registry::entity_type;
    use crate::sink::MemorySink;
    use tempfile::TempDir;

    fn genes_sink() -> (MemorySink, TableSchema) {
        let schema = TableSchema::new(
            "genes",
            vec![
                ColumnDef::new("id", ColumnType::Integer, false),
                ColumnDef::new("short_name", ColumnType::Text, false),
            ],
        );
        let sink = MemorySink::new()
            .with_table(schema.clone())
            .with_unique("genes", "short_name");
        (sink, schema)
    }

    fn gene(id: i64, name: &str) -> Row {
        [("id", Value::Int(id)), ("short_name", Value::from(name))]
            .into_iter()
            .collect()
    }

    #[tokio::test]
    async fn test_clean_chunks_register_keys() {
        let dir = TempDir::new().unwrap();
        let mut store = PkStore::new(dir.path(), dir.path());
        let (sink, schema) = genes_sink();
        let rows: Vec<Row> = (1..=5).map(|i| gene(i, &format!("G{}", i))).collect();

        let counts = ChunkedLoader::new(&sink, 2)
            .load(entity_type("genes").unwrap(), &schema, &rows, &mut store)
            .await
            .unwrap();

        assert_eq!(counts.success, 5);
        assert_eq!(counts.successful_chunks, 3);
        assert_eq!(counts.failed_chunks, 0);
        assert_eq!(store.resolve("genes", "g3"), Some(3));
    }

    #[tokio::test]
    async fn test_failed_chunk_falls_back_to_rows() {
        let dir = TempDir::new().unwrap();
        let mut store = PkStore::new(dir.path(), dir.path());
        let (sink, schema) = genes_sink();
        let mut bad = gene(3, "G3");
        bad.set("short_name", Value::Null);
        let rows = vec![gene(1, "G1"), gene(2, "G2"), bad, gene(4, "G4")];

        let counts = ChunkedLoader::new(&sink, 10)
            .load(entity_type("genes").unwrap(), &schema, &rows, &mut store)
            .await
            .unwrap();

        assert_eq!(counts.success, 3);
        assert_eq!(counts.fail, 1);
        assert_eq!(counts.failed_chunks, 1);
        assert_eq!(sink.row_count("genes"), 3);
        assert_eq!(store.resolve("genes", "G4"), Some(4));
    }

    #[tokio::test]
    async fn test_duplicates_count_as_success() {
        let dir = TempDir::new().unwrap();
        let mut store = PkStore::new(dir.path(), dir.path());
        let (sink, schema) = genes_sink();
        let rows = vec![gene(1, "TP53"), gene(2, "TP53")];

        let counts = ChunkedLoader::new(&sink, 10)
            .load(entity_type("genes").unwrap(), &schema, &rows, &mut store)
            .await
            .unwrap();

        assert_eq!(counts.success, 2);
        assert_eq!(counts.duplicate, 1);
        assert_eq!(counts.fail, 0);
        assert_eq!(store.resolve("genes", "TP53"), Some(1));
    }
}
