//! PK resolution store
//!
//! Natural-key to surrogate-ID maps and next-ID counters per entity type,
//! checkpointed as `<entity>_pk_map.json` and `<entity>_next_id.json` in the
//! job directory. A type's state is loaded on first use and evicted again on
//! [`PkStore::persist`].

use ibvl_common::logging::PROGRESS_TARGET;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, info};

/// Natural key (uppercased) to surrogate ID
pub type PkMap = HashMap<String, i64>;

/// First surrogate ID handed out for a type without a checkpoint
pub const FIRST_ID: i64 = 1;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read checkpoint {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("checkpoint {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write checkpoint {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode checkpoint for {entity}: {source}")]
    Encode {
        entity: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug)]
pub(crate) struct EntityState {
    pub(crate) map: PkMap,
    pub(crate) next_id: i64,
}

/// Key maps and ID counters for one job
#[derive(Debug)]
pub struct PkStore {
    job_dir: PathBuf,
    load_dir: PathBuf,
    pub(crate) loaded: BTreeMap<String, EntityState>,
    persisted: HashSet<String>,
}

impl PkStore {
    /// Store writing checkpoints to `job_dir` and reading initial state from
    /// `load_dir`, which is either the job itself or an earlier job.
    pub fn new(job_dir: impl Into<PathBuf>, load_dir: impl Into<PathBuf>) -> Self {
        Self {
            job_dir: job_dir.into(),
            load_dir: load_dir.into(),
            loaded: BTreeMap::new(),
            persisted: HashSet::new(),
        }
    }

    pub fn job_dir(&self) -> &Path {
        &self.job_dir
    }

    pub fn is_loaded(&self, entity: &str) -> bool {
        self.loaded.contains_key(entity)
    }

    /// Load every listed type that is not loaded yet
    pub fn load<'a>(&mut self, entities: impl IntoIterator<Item = &'a str>) -> Result<(), StoreError> {
        for entity in entities {
            self.ensure_loaded(entity)?;
        }
        Ok(())
    }

    pub(crate) fn ensure_loaded(&mut self, entity: &str) -> Result<&mut EntityState, StoreError> {
        let dir = self.source_dir(entity).to_path_buf();
        match self.loaded.entry(entity.to_string()) {
            Entry::Occupied(state) => Ok(state.into_mut()),
            Entry::Vacant(slot) => Ok(slot.insert(read_state(&dir, entity)?)),
        }
    }

    /// Checkpoints of a type come from the job itself once it has written
    /// them, otherwise from the configured load directory
    fn source_dir(&self, entity: &str) -> &Path {
        if self.persisted.contains(entity) {
            &self.job_dir
        } else {
            &self.load_dir
        }
    }

    /// Surrogate ID of a natural key, `None` if unknown or the type is not
    /// loaded
    pub fn resolve(&self, entity: &str, natural_key: &str) -> Option<i64> {
        self.loaded
            .get(entity)
            .and_then(|state| state.map.get(&natural_key.to_uppercase()).copied())
    }

    /// Register a key. The first registration of a key wins; later ones are
    /// ignored. Returns whether the key was new.
    pub fn append(&mut self, entity: &str, natural_key: &str, pk: i64) -> Result<bool, StoreError> {
        let state = self.ensure_loaded(entity)?;
        let key = natural_key.to_uppercase();
        if state.map.contains_key(&key) {
            return Ok(false);
        }
        state.map.insert(key, pk);
        Ok(true)
    }

    /// Number of keys in a loaded map
    pub fn map_len(&self, entity: &str) -> usize {
        self.loaded.get(entity).map_or(0, |s| s.map.len())
    }

    /// Write every loaded map and counter to the job directory, then evict
    /// them. Returns the number of types written.
    pub fn persist(&mut self) -> Result<usize, StoreError> {
        std::fs::create_dir_all(&self.job_dir).map_err(|source| StoreError::Write {
            path: self.job_dir.clone(),
            source,
        })?;

        let loaded = std::mem::take(&mut self.loaded);
        let count = loaded.len();
        for (entity, state) in &loaded {
            let map = serde_json::to_vec(&state.map).map_err(|source| StoreError::Encode {
                entity: entity.clone(),
                source,
            })?;
            write_atomic(&map_path(&self.job_dir, entity), &map)?;
            write_atomic(
                &counter_path(&self.job_dir, entity),
                state.next_id.to_string().as_bytes(),
            )?;
            self.persisted.insert(entity.clone());
            info!(
                target: PROGRESS_TARGET,
                entity = %entity,
                keys = state.map.len(),
                next_id = state.next_id,
                "Saved pk map"
            );
        }
        Ok(count)
    }
}

impl Drop for PkStore {
    fn drop(&mut self) {
        if self.loaded.is_empty() {
            return;
        }
        if let Err(e) = self.persist() {
            error!(error = %e, "Failed to flush pk maps on shutdown");
        }
    }
}

fn read_state(dir: &Path, entity: &str) -> Result<EntityState, StoreError> {
    let map: PkMap = read_json(&map_path(dir, entity))?.unwrap_or_default();
    let next_id: i64 = read_json(&counter_path(dir, entity))?.unwrap_or(FIRST_ID);
    debug!(
        entity,
        keys = map.len(),
        next_id,
        dir = %dir.display(),
        "Loaded pk map"
    );
    Ok(EntityState { map, next_id })
}

pub fn map_path(dir: &Path, entity: &str) -> PathBuf {
    dir.join(format!("{}_pk_map.json", entity))
}

pub fn counter_path(dir: &Path, entity: &str) -> PathBuf {
    dir.join(format!("{}_next_id.json", entity))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(StoreError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| StoreError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
}

/// Write via a sibling temp file and rename so a crash never leaves a
/// truncated checkpoint
fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), StoreError> {
    let tmp = path.with_extension("json.tmp");
    let write_err = |source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    };
    std::fs::write(&tmp, contents).map_err(write_err)?;
    std::fs::rename(&tmp, path).map_err(write_err)
}
