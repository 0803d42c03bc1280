//! Dynamic injection of stub rows for allow-listed missing references

use crate::model::{Row, Value, ID_COLUMN};
use crate::registry::Injection;
use crate::sink::{SchemaCatalog, TableSink};
use crate::store::{PkStore, StoreError};
use ibvl_common::logging::DATA_ISSUE_TARGET;
use tracing::warn;

pub struct Injector<'a, S: TableSink + ?Sized> {
    sink: &'a S,
    catalog: &'a SchemaCatalog,
}

impl<'a, S: TableSink + ?Sized> Injector<'a, S> {
    /// Schemas of injection targets must already be in the catalog
    pub fn new(sink: &'a S, catalog: &'a SchemaCatalog) -> Self {
        Self { sink, catalog }
    }

    /// Insert a stub for `key` into the rule's target and register it.
    ///
    /// Returns the new surrogate ID, or `None` when the stub could not be
    /// stored. Only checkpoint failures are errors.
    pub async fn inject(
        &self,
        store: &mut PkStore,
        rule: &Injection,
        key: &str,
    ) -> Result<Option<i64>, StoreError> {
        let Some(schema) = self.catalog.get(rule.target) else {
            warn!(
                target: DATA_ISSUE_TARGET,
                table = rule.target,
                key,
                "Cannot add missing row: target table is not available"
            );
            return Ok(None);
        };

        let id = store.next_id(rule.target)?;
        let mut stub = Row::new();
        stub.set(ID_COLUMN, Value::Int(id));
        stub.set(rule.key_column, key);
        for (column, value) in rule.fixed {
            stub.set(*column, *value);
        }
        let stub = schema.complete_row(stub);

        match self.sink.insert_rows(&schema, std::slice::from_ref(&stub)).await {
            Ok(_) => {
                store.append(rule.target, key, id)?;
                store.advance(rule.target, 1)?;
                warn!(
                    target: DATA_ISSUE_TARGET,
                    table = rule.target,
                    id,
                    row = %stub.to_json(),
                    "Dynamically added {} {}",
                    rule.key_column,
                    key
                );
                Ok(Some(id))
            }
            Err(e) => {
                warn!(
                    target: DATA_ISSUE_TARGET,
                    table = rule.target,
                    key,
                    kind = %e.kind,
                    error = %e.message,
                    "Failed to add missing row"
                );
                Ok(None)
            }
        }
    }
}
