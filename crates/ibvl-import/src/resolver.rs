//! Foreign key resolution
//!
//! Replaces the natural keys in a row's FK source columns with surrogate IDs
//! from the [`PkStore`]. A row with a reference that cannot be resolved or
//! repaired is dropped before it reaches the loader.

use crate::injector::Injector;
use crate::model::{Row, TableSchema, Value};
use crate::reader::NA_TOKEN;
use crate::registry::{compound_key, EntityType, ForeignKey};
use crate::sink::TableSink;
use crate::store::{PkStore, StoreError};
use ibvl_common::logging::DATA_ISSUE_TARGET;
use tracing::warn;

/// Unresolved reference that got a row dropped
#[derive(Debug, Clone, PartialEq)]
pub struct MissingReference {
    pub column: &'static str,
    pub target: &'static str,
    /// Key looked up, `None` when the source value was null
    pub key: Option<String>,
    /// Row as it was before the failing column was touched
    pub row: Row,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Resolved(Row),
    Missing(MissingReference),
}

/// Outcome of a single key lookup
enum Lookup {
    Found(i64),
    NoReference,
    Missing(Option<String>),
}

pub struct FkResolver<'a, S: TableSink + ?Sized> {
    entity: &'static EntityType,
    schema: &'a TableSchema,
    injector: Injector<'a, S>,
}

impl<'a, S: TableSink + ?Sized> FkResolver<'a, S> {
    pub fn new(entity: &'static EntityType, schema: &'a TableSchema, injector: Injector<'a, S>) -> Self {
        Self {
            entity,
            schema,
            injector,
        }
    }

    /// Transform, resolve and complete one row.
    ///
    /// Resolution stops at the first unresolved reference.
    pub async fn resolve(&self, store: &mut PkStore, mut row: Row) -> Result<Resolution, StoreError> {
        self.apply_transforms(&mut row);

        for fk in self.entity.foreign_keys {
            match self.lookup(store, fk, &row, true).await? {
                Lookup::Found(id) => row.set(fk.column, Value::Int(id)),
                Lookup::NoReference => row.set(fk.column, Value::Null),
                Lookup::Missing(key) => return Ok(self.missing(fk.column, fk.target, key, row)),
            }
        }

        if let Some(compound) = &self.entity.compound_key {
            let snapshot = row.clone();
            let [left, right] = &compound.parts;
            let left_id = self.part_id(store, left, &row).await?;
            let right_id = self.part_id(store, right, &row).await?;
            let key = compound_key(left_id, right_id);
            row.remove(left.column);
            row.remove(right.column);

            match store.resolve(compound.target, &key) {
                Some(id) => row.set(compound.column, Value::Int(id)),
                None => {
                    return Ok(self.missing(compound.column, compound.target, Some(key), snapshot));
                }
            }
        }

        Ok(Resolution::Resolved(self.schema.complete_row(row)))
    }

    fn apply_transforms(&self, row: &mut Row) {
        for (column, transform) in self.entity.transforms {
            if let Some(text) = row.text(column) {
                let transformed = transform.apply(text);
                row.set(*column, transformed);
            }
        }
    }

    async fn lookup(
        &self,
        store: &mut PkStore,
        fk: &ForeignKey,
        row: &Row,
        repair: bool,
    ) -> Result<Lookup, StoreError> {
        let key = match row.get(fk.column) {
            Some(Value::Text(text)) => text.to_uppercase(),
            Some(Value::Null) | None => return Ok(Lookup::Missing(None)),
            Some(other) => other.to_string(),
        };
        if key == NA_TOKEN {
            return Ok(Lookup::NoReference);
        }
        if let Some(id) = store.resolve(fk.target, &key) {
            return Ok(Lookup::Found(id));
        }
        if repair {
            if let Some(rule) = self.entity.injection_for(fk.column) {
                if let Some(id) = self.injector.inject(store, rule, &key).await? {
                    return Ok(Lookup::Found(id));
                }
            }
        }
        Ok(Lookup::Missing(Some(key)))
    }

    /// Surrogate ID of one half of a compound key
    async fn part_id(&self, store: &mut PkStore, part: &ForeignKey, row: &Row) -> Result<Option<i64>, StoreError> {
        Ok(match self.lookup(store, part, row, false).await? {
            Lookup::Found(id) => Some(id),
            Lookup::NoReference | Lookup::Missing(_) => None,
        })
    }

    fn missing(&self, column: &'static str, target: &'static str, key: Option<String>, row: Row) -> Resolution {
        warn!(
            target: DATA_ISSUE_TARGET,
            table = self.entity.name,
            column,
            references = target,
            key = key.as_deref().unwrap_or("None"),
            row = %row.to_json(),
            "Missing reference, row dropped"
        );
        Resolution::Missing(MissingReference {
            column,
            target,
            key,
            row,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::model::{ColumnDef, ColumnType};
    use crate::registry::entity_type;
    use crate::sink::{MemorySink, SchemaCatalog};
    use tempfile::TempDir;

    fn schema(name: &str, columns: &[(&str, ColumnType)]) -> TableSchema {
        TableSchema::new(
            name,
            columns
                .iter()
                .map(|(n, t)| ColumnDef::new(*n, t.clone(), true))
                .collect(),
        )
    }

    fn row(values: &[(&str, &str)]) -> Row {
        values.iter().map(|(k, v)| (*k, Value::from(*v))).collect()
    }

    #[tokio::test]
    async fn test_resolves_ordinary_fk() {
        let dir = TempDir::new().unwrap();
        let mut store = PkStore::new(dir.path(), dir.path());
        store.append("variants", "1-100-A-G", 9).unwrap();
        let sink = MemorySink::new();
        let catalog = SchemaCatalog::new();
        let table = schema(
            "str",
            &[("id", ColumnType::Integer), ("variant", ColumnType::Integer), ("motif", ColumnType::Text)],
        );
        let resolver = FkResolver::new(entity_type("str").unwrap(), &table, Injector::new(&sink, &catalog));

        let resolved = resolver
            .resolve(&mut store, row(&[("variant", "1-100-a-g")]))
            .await
            .unwrap();
        let Resolution::Resolved(row) = resolved else {
            panic!("expected resolved row");
        };
        assert_eq!(row.get("variant"), Some(&Value::Int(9)));
        assert_eq!(row.text("motif"), Some(""));
    }

    #[tokio::test]
    async fn test_na_yields_null_fk() {
        let dir = TempDir::new().unwrap();
        let mut store = PkStore::new(dir.path(), dir.path());
        store.load(["genes", "variants"]).unwrap();
        let sink = MemorySink::new();
        let catalog = SchemaCatalog::new();
        let table = schema(
            "sv_consequences",
            &[("id", ColumnType::Integer), ("gene", ColumnType::Integer), ("variant", ColumnType::Integer)],
        );
        store.append("variants", "SV1", 4).unwrap();
        let resolver = FkResolver::new(
            entity_type("sv_consequences").unwrap(),
            &table,
            Injector::new(&sink, &catalog),
        );

        let resolved = resolver
            .resolve(&mut store, row(&[("gene", "NA"), ("variant", "SV1")]))
            .await
            .unwrap();
        let Resolution::Resolved(row) = resolved else {
            panic!("expected resolved row");
        };
        assert_eq!(row.get("gene"), Some(&Value::Null));
        assert_eq!(row.get("variant"), Some(&Value::Int(4)));
        assert_eq!(sink.insert_calls(), 0);
    }

    #[tokio::test]
    async fn test_null_source_is_missing() {
        let dir = TempDir::new().unwrap();
        let mut store = PkStore::new(dir.path(), dir.path());
        let sink = MemorySink::new();
        let catalog = SchemaCatalog::new();
        let table = schema("str", &[("id", ColumnType::Integer), ("variant", ColumnType::Integer)]);
        let resolver = FkResolver::new(entity_type("str").unwrap(), &table, Injector::new(&sink, &catalog));

        let mut source = Row::new();
        source.set("variant", Value::Null);
        let resolved = resolver.resolve(&mut store, source).await.unwrap();
        let Resolution::Missing(missing) = resolved else {
            panic!("expected missing reference");
        };
        assert_eq!(missing.column, "variant");
        assert_eq!(missing.key, None);
    }

    #[tokio::test]
    async fn test_compound_key() {
        let dir = TempDir::new().unwrap();
        let mut store = PkStore::new(dir.path(), dir.path());
        store.append("transcripts", "ENST01", 5).unwrap();
        store.append("variants", "1-100-A-G", 9).unwrap();
        store.append("variants_transcripts", "5-9", 42).unwrap();
        let sink = MemorySink::new();
        let catalog = SchemaCatalog::new();
        let table = schema(
            "variants_consequences",
            &[
                ("id", ColumnType::Integer),
                ("variant_transcript", ColumnType::Integer),
                ("severity", ColumnType::Integer),
            ],
        );
        let resolver = FkResolver::new(
            entity_type("variants_consequences").unwrap(),
            &table,
            Injector::new(&sink, &catalog),
        );

        let resolved = resolver
            .resolve(&mut store, row(&[("transcript", "ENST01"), ("variant", "1-100-A-G")]))
            .await
            .unwrap();
        let Resolution::Resolved(row) = resolved else {
            panic!("expected resolved row");
        };
        assert_eq!(row.get("variant_transcript"), Some(&Value::Int(42)));
        assert!(!row.contains("transcript"));
        assert!(!row.contains("variant"));
    }

    #[tokio::test]
    async fn test_compound_miss_keeps_snapshot() {
        let dir = TempDir::new().unwrap();
        let mut store = PkStore::new(dir.path(), dir.path());
        store.append("variants", "1-100-A-G", 9).unwrap();
        let sink = MemorySink::new();
        let catalog = SchemaCatalog::new();
        let table = schema(
            "variants_annotations",
            &[("id", ColumnType::Integer), ("variant_transcript", ColumnType::Integer)],
        );
        let resolver = FkResolver::new(
            entity_type("variants_annotations").unwrap(),
            &table,
            Injector::new(&sink, &catalog),
        );

        let resolved = resolver
            .resolve(&mut store, row(&[("transcript", "ENST99"), ("variant", "1-100-A-G")]))
            .await
            .unwrap();
        let Resolution::Missing(missing) = resolved else {
            panic!("expected missing reference");
        };
        assert_eq!(missing.key.as_deref(), Some("None-9"));
        assert_eq!(missing.row.text("transcript"), Some("ENST99"));
    }

    #[tokio::test]
    async fn test_transform_applied_before_storage() {
        let dir = TempDir::new().unwrap();
        let mut store = PkStore::new(dir.path(), dir.path());
        let sink = MemorySink::new();
        let catalog = SchemaCatalog::new();
        let table = schema("genes", &[("id", ColumnType::Integer), ("short_name", ColumnType::Text)]);
        let resolver = FkResolver::new(entity_type("genes").unwrap(), &table, Injector::new(&sink, &catalog));

        let resolved = resolver
            .resolve(&mut store, row(&[("short_name", "brca2")]))
            .await
            .unwrap();
        let Resolution::Resolved(row) = resolved else {
            panic!("expected resolved row");
        };
        assert_eq!(row.text("short_name"), Some("BRCA2"));
        assert_eq!(row.get("id"), Some(&Value::Null));
    }
}
