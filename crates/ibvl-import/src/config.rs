//! Configuration management
//!
//! Settings come from the environment (a `.env` file is honoured). Empty
//! values count as unset.

use crate::error::ConfigError;
use crate::registry;
use crate::sink::postgres::DbConfig;
use std::path::PathBuf;

// ============================================================================
// Environment Variables
// ============================================================================

pub const ENV_INPUT_ROOT: &str = "PIPELINE_OUTPUT_PATH";
pub const ENV_CHUNK_SIZE: &str = "CHUNK_SIZE";
pub const ENV_DB: &str = "DB";
pub const ENV_DATABASE_URL: &str = "DATABASE_URL";
pub const ENV_COPY_MAPS_FROM_JOB: &str = "COPY_MAPS_FROM_JOB";
pub const ENV_SCHEMA_NAME: &str = "SCHEMA_NAME";
pub const ENV_START_AT_MODEL: &str = "START_AT_MODEL";
pub const ENV_START_AT_FILE: &str = "START_AT_FILE";
pub const ENV_JOBS_DIR: &str = "JOBS_DIR";
pub const ENV_SKIP_ENTITY_TYPES: &str = "SKIP_ENTITY_TYPES";
pub const ENV_DB_CONNECT_TIMEOUT: &str = "DB_CONNECT_TIMEOUT";

// ============================================================================
// Defaults
// ============================================================================

/// Default root directory of the source files.
pub const DEFAULT_INPUT_ROOT: &str = "data/fixtures";

/// Default root directory of the job directories.
pub const DEFAULT_JOBS_DIR: &str = "data/import_script/jobs";

/// Default pool acquire timeout in seconds.
pub const DEFAULT_DB_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Options the orchestrator runs with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub input_root: PathBuf,
    pub chunk_size: usize,
    pub start_at_model: Option<String>,
    pub start_at_file: Option<String>,
    pub skip_entity_types: Vec<String>,
}

impl RunOptions {
    pub fn new(input_root: impl Into<PathBuf>, chunk_size: usize) -> Self {
        Self {
            input_root: input_root.into(),
            chunk_size,
            start_at_model: None,
            start_at_file: None,
            skip_entity_types: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImportConfig {
    pub run: RunOptions,
    pub database: DbConfig,
    /// Target schema, the connection's current schema when unset
    pub schema: Option<String>,
    pub jobs_root: PathBuf,
    pub copy_maps_from_job: Option<String>,
}

impl ImportConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let chunk_size = match var(ENV_CHUNK_SIZE) {
            Some(raw) => parse_positive(ENV_CHUNK_SIZE, &raw)?,
            None => return Err(ConfigError::Missing(ENV_CHUNK_SIZE)),
        };

        let url = var(ENV_DB)
            .or_else(|| var(ENV_DATABASE_URL))
            .ok_or(ConfigError::Missing(ENV_DB))?;

        let connect_timeout_secs = match var(ENV_DB_CONNECT_TIMEOUT) {
            Some(raw) => parse_positive(ENV_DB_CONNECT_TIMEOUT, &raw)? as u64,
            None => DEFAULT_DB_CONNECT_TIMEOUT_SECS,
        };

        let skip_entity_types = var(ENV_SKIP_ENTITY_TYPES)
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let config = Self {
            run: RunOptions {
                input_root: var(ENV_INPUT_ROOT)
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_INPUT_ROOT)),
                chunk_size,
                start_at_model: var(ENV_START_AT_MODEL),
                start_at_file: var(ENV_START_AT_FILE),
                skip_entity_types,
            },
            database: DbConfig {
                url,
                connect_timeout_secs,
                ..DbConfig::default()
            },
            schema: var(ENV_SCHEMA_NAME),
            jobs_root: var(ENV_JOBS_DIR)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_JOBS_DIR)),
            copy_maps_from_job: var(ENV_COPY_MAPS_FROM_JOB),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.run.chunk_size == 0 {
            return Err(ConfigError::Invalid {
                var: ENV_CHUNK_SIZE,
                value: "0".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if let Some(model) = &self.run.start_at_model {
            if registry::entity_type(model).is_none() {
                return Err(ConfigError::UnknownEntityType(model.clone()));
            }
        }
        for name in &self.run.skip_entity_types {
            if registry::entity_type(name).is_none() {
                return Err(ConfigError::UnknownEntityType(name.clone()));
            }
        }
        if let Some(job) = &self.copy_maps_from_job {
            if job.parse::<u64>().is_err() {
                return Err(ConfigError::Invalid {
                    var: ENV_COPY_MAPS_FROM_JOB,
                    value: job.clone(),
                    reason: "must be a job number".to_string(),
                });
            }
        }
        Ok(())
    }
}

fn parse_positive(var: &'static str, raw: &str) -> Result<usize, ConfigError> {
    match raw.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::Invalid {
            var,
            value: raw.to_string(),
            reason: "must be a positive integer".to_string(),
        }),
    }
}
