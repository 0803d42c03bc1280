//! In-memory sink
//!
//! Holds tables as row vectors and checks the constraints a real schema
//! would: unique `id` plus any declared unique columns, non-null columns,
//! column types and foreign keys. Every call is all-or-nothing.

use super::{InsertError, InsertErrorKind, SchemaError, TableSink};
use crate::model::{ColumnType, Row, TableSchema, Value, ID_COLUMN};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug)]
struct MemoryTable {
    schema: TableSchema,
    rows: Vec<Row>,
    unique: Vec<String>,
    references: Vec<(String, String)>,
}

#[derive(Debug, Default)]
struct State {
    tables: BTreeMap<String, MemoryTable>,
    insert_calls: usize,
}

#[derive(Debug, Default)]
pub struct MemorySink {
    state: Mutex<State>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table; its `id` column is unique
    pub fn with_table(self, schema: TableSchema) -> Self {
        self.lock().tables.insert(
            schema.name.clone(),
            MemoryTable {
                schema,
                rows: Vec::new(),
                unique: vec![ID_COLUMN.to_string()],
                references: Vec::new(),
            },
        );
        self
    }

    /// Declare a unique column on an existing table
    pub fn with_unique(self, table: &str, column: &str) -> Self {
        if let Some(t) = self.lock().tables.get_mut(table) {
            t.unique.push(column.to_string());
        }
        self
    }

    /// Declare `table.column` as a foreign key to `target.id`
    pub fn with_reference(self, table: &str, column: &str, target: &str) -> Self {
        if let Some(t) = self.lock().tables.get_mut(table) {
            t.references.push((column.to_string(), target.to_string()));
        }
        self
    }

    /// Stored rows of a table in insertion order
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.lock()
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.lock().tables.get(table).map_or(0, |t| t.rows.len())
    }

    /// Number of `insert_rows` calls so far, successful or not
    pub fn insert_calls(&self) -> usize {
        self.lock().insert_calls
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl TableSink for MemorySink {
    async fn describe_table(&self, table: &str) -> Result<TableSchema, SchemaError> {
        self.lock()
            .tables
            .get(table)
            .map(|t| t.schema.clone())
            .ok_or_else(|| SchemaError::TableNotFound(table.to_string()))
    }

    async fn insert_rows(&self, schema: &TableSchema, rows: &[Row]) -> Result<u64, InsertError> {
        let mut state = self.lock();
        state.insert_calls += 1;
        validate(&state, &schema.name, rows)?;

        match state.tables.get_mut(&schema.name) {
            Some(table) => table.rows.extend_from_slice(rows),
            None => return Err(missing_table(&schema.name)),
        }
        Ok(rows.len() as u64)
    }
}

fn missing_table(name: &str) -> InsertError {
    InsertError::new(
        InsertErrorKind::Other,
        format!("relation \"{}\" does not exist", name),
    )
}

fn validate(state: &State, name: &str, rows: &[Row]) -> Result<(), InsertError> {
    let table = state.tables.get(name).ok_or_else(|| missing_table(name))?;

    for row in rows {
        for (column, value) in row.iter() {
            let def = table.schema.column(column).ok_or_else(|| {
                InsertError::new(
                    InsertErrorKind::Other,
                    format!("column \"{}\" of relation \"{}\" does not exist", column, name),
                )
            })?;
            if !accepts(&def.column_type, value) {
                return Err(InsertError::new(
                    InsertErrorKind::Data,
                    format!("invalid value {} for column \"{}\"", value, column),
                ));
            }
        }

        for def in table.schema.columns.iter().filter(|c| !c.nullable) {
            if row.get(&def.name).map_or(true, Value::is_null) {
                return Err(InsertError::new(
                    InsertErrorKind::Constraint,
                    format!("null value in column \"{}\" of relation \"{}\"", def.name, name),
                ));
            }
        }

        for (column, target) in &table.references {
            let Some(value) = row.get(column).filter(|v| !v.is_null()) else {
                continue;
            };
            let exists = state.tables.get(target).map_or(false, |t| {
                t.rows.iter().any(|r| r.get(ID_COLUMN) == Some(value))
            }) || (target == name && rows.iter().any(|r| r.get(ID_COLUMN) == Some(value)));
            if !exists {
                return Err(InsertError::new(
                    InsertErrorKind::Constraint,
                    format!(
                        "insert on \"{}\" violates foreign key on \"{}\": {} not present in \"{}\"",
                        name, column, value, target
                    ),
                ));
            }
        }
    }

    for column in &table.unique {
        let mut seen: HashSet<String> = table
            .rows
            .iter()
            .filter_map(|r| unique_value(r, column))
            .collect();
        for row in rows {
            if let Some(value) = unique_value(row, column) {
                if !seen.insert(value.clone()) {
                    return Err(InsertError::new(
                        InsertErrorKind::Duplicate,
                        format!("duplicate key value violates unique constraint: ({})=({})", column, value),
                    ));
                }
            }
        }
    }

    Ok(())
}

fn unique_value(row: &Row, column: &str) -> Option<String> {
    row.get(column)
        .filter(|v| !v.is_null())
        .map(|v| v.to_string())
}

fn accepts(column_type: &ColumnType, value: &Value) -> bool {
    matches!(
        (column_type, value),
        (_, Value::Null)
            | (ColumnType::Integer, Value::Int(_))
            | (ColumnType::Float, Value::Float(_) | Value::Int(_))
            | (ColumnType::Text, Value::Text(_))
            | (ColumnType::Boolean, Value::Bool(_))
            | (ColumnType::Other(_), _)
    )
}
