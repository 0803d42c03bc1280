//! Source file reader
//!
//! Parses one tab-delimited export file against the target table's schema.
//! Column types come from the schema, never from the data, so a column that
//! happens to hold only digits in one file is still stored as text when the
//! table says so.

use crate::model::{ColumnType, Row, TableSchema, Value};
use ibvl_common::logging::DATA_ISSUE_TARGET;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Extension of importable source files
pub const SOURCE_EXTENSION: &str = "tsv";

/// Tokens read as null in every column
const NULL_TOKENS: &[&str] = &["", "NaN", "nan", "NULL", "null", "None"];

/// Literal kept in text columns, read as null everywhere else
pub const NA_TOKEN: &str = "NA";

#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed header: {0}")]
    Header(#[source] csv::Error),

    #[error("failed to read {dir}: {source}")]
    List {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("read failed near line {line}: {source}")]
    Record {
        line: u64,
        #[source]
        source: csv::Error,
    },
}

/// A parsed data row and its 0-based position in the file
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRow {
    pub position: usize,
    pub row: Row,
}

/// A data row that could not be parsed
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedRow {
    pub position: usize,
    pub line: u64,
    pub reason: String,
}

/// Contents of one source file
#[derive(Debug, Default)]
pub struct SourceFile {
    pub rows: Vec<SourceRow>,
    pub rejected: Vec<RejectedRow>,
    /// Every data row, parsed or rejected
    pub total_rows: usize,
    pub dropped_columns: Vec<String>,
}

/// Reads source files for one entity type
pub struct SourceFileReader<'a> {
    schema: &'a TableSchema,
    key_columns: HashSet<&'a str>,
}

impl<'a> SourceFileReader<'a> {
    /// `key_columns` are FK source columns, read as text regardless of schema
    pub fn new(schema: &'a TableSchema, key_columns: &[&'a str]) -> Self {
        Self {
            schema,
            key_columns: key_columns.iter().copied().collect(),
        }
    }

    pub fn read_path(&self, path: &Path) -> Result<SourceFile, ReaderError> {
        let file = File::open(path).map_err(|source| ReaderError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        self.read(file)
    }

    pub fn read<R: Read>(&self, input: R) -> Result<SourceFile, ReaderError> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .quoting(false)
            .flexible(true)
            .from_reader(input);

        let headers = reader.headers().map_err(ReaderError::Header)?.clone();

        let mut layout = Vec::with_capacity(headers.len());
        let mut file = SourceFile::default();
        for name in headers.iter() {
            let column_type = if self.key_columns.contains(name) {
                Some(ColumnType::Text)
            } else {
                self.schema.column(name).map(|c| c.column_type.clone())
            };
            if column_type.is_none() {
                file.dropped_columns.push(name.to_string());
            }
            layout.push((name.to_string(), column_type));
        }

        if !file.dropped_columns.is_empty() {
            warn!(
                target: DATA_ISSUE_TARGET,
                table = %self.schema.name,
                columns = ?file.dropped_columns,
                "Dropping columns not present in the target table"
            );
        }

        for (position, record) in reader.byte_records().enumerate() {
            let fallback_line = position as u64 + 2;
            let parsed = match record {
                Ok(record) => {
                    let line = record.position().map_or(fallback_line, |p| p.line());
                    let row = csv::StringRecord::from_byte_record(record)
                        .map_err(|e| format!("invalid UTF-8 in field {}", e.utf8_error().field()))
                        .and_then(|record| parse_record(&layout, &record));
                    (line, row)
                }
                Err(source) if matches!(source.kind(), csv::ErrorKind::Io(_)) => {
                    return Err(ReaderError::Record {
                        line: fallback_line,
                        source,
                    });
                }
                Err(source) => {
                    let line = source.position().map_or(fallback_line, |p| p.line());
                    (line, Err(source.to_string()))
                }
            };

            file.total_rows += 1;
            match parsed {
                (_, Ok(row)) => file.rows.push(SourceRow { position, row }),
                (line, Err(reason)) => file.rejected.push(RejectedRow {
                    position,
                    line,
                    reason,
                }),
            }
        }

        Ok(file)
    }
}

fn parse_record(
    layout: &[(String, Option<ColumnType>)],
    record: &csv::StringRecord,
) -> Result<Row, String> {
    if record.len() != layout.len() {
        return Err(format!(
            "expected {} fields, found {}",
            layout.len(),
            record.len()
        ));
    }

    let mut row = Row::new();
    for ((name, column_type), raw) in layout.iter().zip(record.iter()) {
        let Some(column_type) = column_type else {
            continue;
        };
        let value = parse_cell(raw, column_type)
            .map_err(|reason| format!("column {}: {}", name, reason))?;
        row.set(name.clone(), value);
    }
    Ok(row)
}

/// Parse a single cell as the given column type
pub fn parse_cell(raw: &str, column_type: &ColumnType) -> Result<Value, String> {
    if NULL_TOKENS.contains(&raw) {
        return Ok(Value::Null);
    }
    match column_type {
        ColumnType::Text => Ok(Value::Text(raw.to_string())),
        _ if raw == NA_TOKEN => Ok(Value::Null),
        ColumnType::Integer => raw
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| format!("{:?} is not an integer", raw)),
        ColumnType::Float => raw
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| format!("{:?} is not a number", raw)),
        ColumnType::Boolean => match raw.trim().to_lowercase().as_str() {
            "true" | "t" | "1" | "yes" => Ok(Value::Bool(true)),
            "false" | "f" | "0" | "no" => Ok(Value::Bool(false)),
            _ => Err(format!("{:?} is not a boolean", raw)),
        },
        ColumnType::Other(_) => Ok(Value::Text(raw.to_string())),
    }
}

/// Importable files of an entity directory in natural sort order.
///
/// Hidden files and files without the source extension are ignored.
pub fn list_source_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with('.') || !entry.file_type()?.is_file() {
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) != Some(SOURCE_EXTENSION) {
            continue;
        }
        files.push(path);
    }
    files.sort_by(|a, b| natural_cmp(&file_name(a), &file_name(b)));
    Ok(files)
}

pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Compare strings treating digit runs as numbers, so `part2` < `part10`
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = a.chars().peekable();
    let mut right = b.chars().peekable();
    loop {
        match (left.peek().copied(), right.peek().copied()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let l = take_digits(&mut left);
                let r = take_digits(&mut right);
                let l_trim = l.trim_start_matches('0');
                let r_trim = r.trim_start_matches('0');
                let ordering = l_trim
                    .len()
                    .cmp(&r_trim.len())
                    .then_with(|| l_trim.cmp(r_trim));
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            (Some(x), Some(y)) => {
                if x != y {
                    return x.cmp(&y);
                }
                left.next();
                right.next();
            }
        }
    }
}

fn take_digits(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut digits = String::new();
    while let Some(c) = chars.peek().copied() {
        if !c.is_ascii_digit() {
            break;
        }
        digits.push(c);
        chars.next();
    }
    digits
}
