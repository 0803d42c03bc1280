//! Row and table types shared by the reader, resolver, loader and sinks

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Name of the surrogate primary key column every target table carries
pub const ID_COLUMN: &str = "id";

/// A single cell value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "None"),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

/// One record keyed by column name
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Row {
    values: BTreeMap<String, Value>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    /// Text value of a column, `None` when missing, null or non-text
    pub fn text(&self, column: &str) -> Option<&str> {
        self.values.get(column).and_then(Value::as_text)
    }

    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(column.into(), value.into());
    }

    pub fn remove(&mut self, column: &str) -> Option<Value> {
        self.values.remove(column)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.values.contains_key(column)
    }

    pub fn id(&self) -> Option<i64> {
        self.get(ID_COLUMN).and_then(Value::as_int)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.values.retain(|k, _| keep(k));
    }

    /// Compact JSON rendering used in data-issue log lines
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{:?}", self.values))
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Storage class of a target column, as far as parsing and binding care
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Float,
    Text,
    Boolean,
    /// Any other SQL type, carried as text and cast by the database
    Other(String),
}

impl ColumnType {
    /// Map an `information_schema.columns.data_type` to a column type
    pub fn from_sql(data_type: &str, udt_name: &str) -> Self {
        match data_type.to_lowercase().as_str() {
            "smallint" | "integer" | "bigint" => ColumnType::Integer,
            "real" | "double precision" | "numeric" | "decimal" => ColumnType::Float,
            "character varying" | "character" | "text" | "varchar" | "char" => ColumnType::Text,
            "boolean" => ColumnType::Boolean,
            _ => ColumnType::Other(udt_name.to_string()),
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, ColumnType::Text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, column_type: ColumnType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable,
        }
    }
}

/// Columns of a target table in ordinal order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnDef>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDef>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Fill a row out to the full column set and drop anything else.
    ///
    /// Missing or null text columns become `""`, every other missing column
    /// becomes null.
    pub fn complete_row(&self, mut row: Row) -> Row {
        row.retain(|column| self.has_column(column));
        for column in &self.columns {
            let missing = row.get(&column.name).map_or(true, Value::is_null);
            if missing {
                let default = if column.column_type.is_text() {
                    Value::Text(String::new())
                } else {
                    Value::Null
                };
                row.set(column.name.clone(), default);
            }
        }
        row
    }
}
