//! Error types shared by the IBVL crates

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for IBVL operations
pub type Result<T> = std::result::Result<T, IbvlError>;

/// Main error type for IBVL
#[derive(Error, Debug)]
pub enum IbvlError {
    #[error("IO error at {path}: {source}")]
    PathIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl IbvlError {
    /// Attach the offending path to an I/O error
    pub fn path_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::PathIo {
            path: path.into(),
            source,
        }
    }
}
