//! Import counters and run summary

use chrono::{DateTime, Utc};
use ibvl_common::logging::PROGRESS_TARGET;
use serde::Serialize;
use std::fmt;
use std::ops::AddAssign;
use std::time::Duration;
use tracing::info;

/// Row and chunk outcomes of a file, an entity type or a whole run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportCounts {
    /// Rows stored, duplicates included
    pub success: u64,
    pub fail: u64,
    pub missing_ref: u64,
    /// Rows rejected as duplicate keys; also counted in `success`
    pub duplicate: u64,
    pub successful_chunks: u64,
    pub failed_chunks: u64,
}

impl ImportCounts {
    /// Rows with a final outcome
    pub fn accounted_rows(&self) -> u64 {
        self.success + self.fail + self.missing_ref
    }
}

impl AddAssign for ImportCounts {
    fn add_assign(&mut self, other: Self) {
        self.success += other.success;
        self.fail += other.fail;
        self.missing_ref += other.missing_ref;
        self.duplicate += other.duplicate;
        self.successful_chunks += other.successful_chunks;
        self.failed_chunks += other.failed_chunks;
    }
}

impl fmt::Display for ImportCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "success={} fail={} missing_ref={} duplicate={} chunks_ok={} chunks_failed={}",
            self.success,
            self.fail,
            self.missing_ref,
            self.duplicate,
            self.successful_chunks,
            self.failed_chunks
        )
    }
}

/// Outcome of one entity type within a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntitySummary {
    pub entity: String,
    pub files: usize,
    pub counts: ImportCounts,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub elapsed: Duration,
    pub entities: Vec<EntitySummary>,
    pub skipped: Vec<String>,
    pub interrupted: bool,
}

impl Default for RunSummary {
    fn default() -> Self {
        Self::new()
    }
}

impl RunSummary {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            elapsed: Duration::ZERO,
            entities: Vec::new(),
            skipped: Vec::new(),
            interrupted: false,
        }
    }

    pub fn record(&mut self, entity: &str, files: usize, counts: ImportCounts) {
        self.entities.push(EntitySummary {
            entity: entity.to_string(),
            files,
            counts,
        });
    }

    pub fn record_skip(&mut self, entity: &str) {
        self.skipped.push(entity.to_string());
    }

    pub fn totals(&self) -> ImportCounts {
        let mut totals = ImportCounts::default();
        for entity in &self.entities {
            totals += entity.counts;
        }
        totals
    }

    pub fn entity(&self, name: &str) -> Option<&EntitySummary> {
        self.entities.iter().find(|e| e.entity == name)
    }

    pub fn finish(&mut self, elapsed: Duration, interrupted: bool) {
        self.finished_at = Some(Utc::now());
        self.elapsed = elapsed;
        self.interrupted = interrupted;
    }

    /// Log the per-entity table and totals to the progress log
    pub fn report(&self) {
        for entity in &self.entities {
            info!(
                target: PROGRESS_TARGET,
                entity = %entity.entity,
                files = entity.files,
                "{}",
                entity.counts
            );
        }
        let totals = self.totals();
        info!(
            target: PROGRESS_TARGET,
            elapsed_secs = self.elapsed.as_secs_f64(),
            interrupted = self.interrupted,
            skipped = self.skipped.len(),
            "Import {}: {}",
            if self.interrupted { "interrupted" } else { "finished" },
            totals
        );
    }
}
