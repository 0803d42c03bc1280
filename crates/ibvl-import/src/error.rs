//! Import errors
//!
//! Row-level problems are counted and logged where they happen and never
//! surface here. An [`ImportError`] either stops the run or skips the file or
//! entity type it came from.

use crate::reader::ReaderError;
use crate::sink::SchemaError;
use crate::store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid value {value:?} for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("unknown entity type {0:?}")]
    UnknownEntityType(String),
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("checkpoint failure: {0}")]
    Checkpoint(#[from] StoreError),

    #[error(transparent)]
    Source(#[from] ReaderError),

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

impl ImportError {
    /// Whether the run has to stop
    pub fn is_fatal(&self) -> bool {
        matches!(self, ImportError::Checkpoint(_))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_fatality() {
        let checkpoint = ImportError::from(StoreError::Write {
            path: PathBuf::from("jobs/1/genes_pk_map.json"),
            source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        });
        assert!(checkpoint.is_fatal());
        assert!(checkpoint.to_string().contains("disk full"));

        let schema = ImportError::from(SchemaError::TableNotFound("str".into()));
        assert!(!schema.is_fatal());

        let source = ImportError::from(ReaderError::Open {
            path: PathBuf::from("genes/a.tsv"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        });
        assert!(!source.is_fatal());
        assert!(source.to_string().contains("genes/a.tsv"));
    }

    #[test]
    fn test_config_error_messages() {
        assert_eq!(ConfigError::Missing("CHUNK_SIZE").to_string(), "CHUNK_SIZE must be set");
    }
}
