//! Import orchestrator
//!
//! Walks the entity registry in order. For each entity type it loads the key
//! maps the type needs, imports its files one at a time, then persists and
//! evicts the maps before moving on. Only checkpoint failures stop a run;
//! any other [`ImportError`] skips the file or entity type it came from.

use crate::config::RunOptions;
use crate::error::ImportError;
use crate::injector::Injector;
use crate::loader::ChunkedLoader;
use crate::model::{TableSchema, Value, ID_COLUMN};
use crate::reader::{file_name, list_source_files, ReaderError, SourceFileReader};
use crate::registry::{EntityType, ENTITY_TYPES};
use crate::resolver::{FkResolver, Resolution};
use crate::sink::{SchemaCatalog, TableSink};
use crate::stats::{ImportCounts, RunSummary};
use crate::store::PkStore;
use ibvl_common::logging::{DATA_ISSUE_TARGET, PROGRESS_TARGET};
use std::fmt;
use std::future::Future;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Lifecycle of one entity type within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityPhase {
    Skipped(SkipReason),
    Loading,
    Processing,
    Persisted,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    BeforeResumeMarker,
    DisabledInRegistry,
    DisabledByConfig,
    NoSourceDirectory,
    TableUnavailable,
    SourceUnreadable,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            SkipReason::BeforeResumeMarker => "before resume marker",
            SkipReason::DisabledInRegistry => "disabled in registry",
            SkipReason::DisabledByConfig => "disabled by configuration",
            SkipReason::NoSourceDirectory => "no source directory",
            SkipReason::TableUnavailable => "target table unavailable",
            SkipReason::SourceUnreadable => "source directory unreadable",
        };
        f.write_str(reason)
    }
}

/// "Start at" markers. Everything before a marker is skipped; reaching it
/// spends it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResumeMarkers {
    model: Option<String>,
    file: Option<String>,
}

impl ResumeMarkers {
    pub fn new(model: Option<String>, file: Option<String>) -> Self {
        Self { model, file }
    }

    pub fn skip_entity(&mut self, name: &str) -> bool {
        spend(&mut self.model, name)
    }

    pub fn skip_file(&mut self, name: &str) -> bool {
        spend(&mut self.file, name)
    }
}

fn spend(marker: &mut Option<String>, name: &str) -> bool {
    match marker {
        Some(m) if m == name => {
            *marker = None;
            false
        }
        Some(_) => true,
        None => false,
    }
}

pub struct Orchestrator<S: TableSink> {
    sink: S,
    store: PkStore,
    catalog: SchemaCatalog,
    options: RunOptions,
    markers: ResumeMarkers,
    summary: RunSummary,
}

impl<S: TableSink> Orchestrator<S> {
    pub fn new(sink: S, store: PkStore, options: RunOptions) -> Self {
        let markers = ResumeMarkers::new(options.start_at_model.clone(), options.start_at_file.clone());
        Self {
            sink,
            store,
            catalog: SchemaCatalog::new(),
            options,
            markers,
            summary: RunSummary::new(),
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn store(&self) -> &PkStore {
        &self.store
    }

    /// Run to completion or until `shutdown` resolves, then persist every
    /// loaded map and report. An interrupted run still returns its summary.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<RunSummary, ImportError>
    where
        F: Future<Output = ()>,
    {
        let started = Instant::now();
        let outcome = tokio::select! {
            biased;
            _ = shutdown => None,
            result = self.run() => Some(result),
        };
        let interrupted = outcome.is_none();

        if let Some(Err(e)) = outcome {
            error!(target: PROGRESS_TARGET, error = %e, "Import aborted");
            if let Err(persist) = self.store.persist() {
                error!(error = %persist, "Failed to save pk maps after abort");
            }
            return Err(e);
        }
        if interrupted {
            warn!(target: PROGRESS_TARGET, "Interrupted, saving pk maps");
        }

        self.store.persist()?;
        self.summary.finish(started.elapsed(), interrupted);
        self.summary.report();
        Ok(self.summary.clone())
    }

    /// Import every entity type in registry order
    pub async fn run(&mut self) -> Result<(), ImportError> {
        for (index, entity) in ENTITY_TYPES.iter().enumerate() {
            if let Some(reason) = self.skip_reason(entity) {
                self.transition(entity, EntityPhase::Skipped(reason));
                self.summary.record_skip(entity.name);
                continue;
            }

            match self.import_entity(entity).await {
                Ok((files, counts)) => {
                    self.summary.record(entity.name, files, counts);
                    info!(
                        target: PROGRESS_TARGET,
                        entity = entity.name,
                        files,
                        "Finished {}: {}",
                        entity.name,
                        counts
                    );
                }
                Err(e) if !e.is_fatal() => {
                    error!(target: PROGRESS_TARGET, entity = entity.name, error = %e, "Cannot import entity type");
                    let reason = match e {
                        ImportError::Schema(_) => SkipReason::TableUnavailable,
                        _ => SkipReason::SourceUnreadable,
                    };
                    self.transition(entity, EntityPhase::Skipped(reason));
                    self.summary.record_skip(entity.name);
                }
                Err(e) => return Err(e),
            }

            self.store.persist()?;
            self.transition(entity, EntityPhase::Persisted);
            self.transition(entity, EntityPhase::Done);

            let remaining: Vec<&str> = ENTITY_TYPES[index + 1..].iter().map(|e| e.name).collect();
            info!(target: PROGRESS_TARGET, remaining = ?remaining, "Remaining entity types");
        }
        Ok(())
    }

    fn skip_reason(&mut self, entity: &EntityType) -> Option<SkipReason> {
        if self.markers.skip_entity(entity.name) {
            return Some(SkipReason::BeforeResumeMarker);
        }
        if entity.skip {
            return Some(SkipReason::DisabledInRegistry);
        }
        if self.options.skip_entity_types.iter().any(|s| s == entity.name) {
            return Some(SkipReason::DisabledByConfig);
        }
        if !self.options.input_root.join(entity.name).is_dir() {
            return Some(SkipReason::NoSourceDirectory);
        }
        None
    }

    fn transition(&self, entity: &EntityType, phase: EntityPhase) {
        match phase {
            EntityPhase::Skipped(reason) => {
                info!(target: PROGRESS_TARGET, entity = entity.name, %reason, "Skipping {}", entity.name)
            }
            other => debug!(entity = entity.name, phase = ?other, "Entity phase"),
        }
    }

    /// Import all files of one entity type, returning the number of files
    /// imported and their counts
    async fn import_entity(&mut self, entity: &'static EntityType) -> Result<(usize, ImportCounts), ImportError> {
        self.transition(entity, EntityPhase::Loading);

        let schema = self.catalog.fetch(&self.sink, entity.name).await?;
        for injection in entity.injections {
            if let Err(e) = self.catalog.fetch(&self.sink, injection.target).await {
                warn!(
                    target: PROGRESS_TARGET,
                    entity = entity.name,
                    target_table = injection.target,
                    error = %e,
                    "Missing references will not be repaired"
                );
            }
        }
        let dir = self.options.input_root.join(entity.name);
        let files = list_source_files(&dir).map_err(|source| ReaderError::List { dir, source })?;
        self.store.load(entity.required_maps())?;

        self.transition(entity, EntityPhase::Processing);
        let mut counts = ImportCounts::default();
        let mut imported = 0;
        for path in files {
            let name = file_name(&path);
            if self.markers.skip_file(&name) {
                debug!(file = %name, "Skipping file before resume marker");
                continue;
            }
            match self.import_file(entity, &schema, &path).await {
                Ok(file_counts) => {
                    counts += file_counts;
                    imported += 1;
                }
                Err(e) if !e.is_fatal() => {
                    error!(target: DATA_ISSUE_TARGET, entity = entity.name, file = %name, error = %e, "Skipping unreadable file");
                    error!(target: PROGRESS_TARGET, entity = entity.name, file = %name, error = %e, "Skipping unreadable file");
                }
                Err(e) => return Err(e),
            }
        }

        Ok((imported, counts))
    }

    async fn import_file(
        &mut self,
        entity: &'static EntityType,
        schema: &TableSchema,
        path: &Path,
    ) -> Result<ImportCounts, ImportError> {
        let name = file_name(path);
        let key_columns = entity.key_source_columns();
        let source = SourceFileReader::new(schema, &key_columns).read_path(path)?;

        info!(
            target: PROGRESS_TARGET,
            "Importing {} ({}). Expecting {} rows",
            entity.name,
            name,
            source.total_rows
        );
        if source.total_rows == 0 {
            info!(target: PROGRESS_TARGET, file = %name, "Skipping empty file");
            return Ok(ImportCounts::default());
        }

        let started = Instant::now();
        let reservation = self.store.reserve(entity.name, source.total_rows)?;
        let mut counts = ImportCounts::default();

        for rejected in &source.rejected {
            counts.fail += 1;
            warn!(
                target: DATA_ISSUE_TARGET,
                entity = entity.name,
                file = %name,
                line = rejected.line,
                id = reservation.id_at(rejected.position),
                reason = %rejected.reason,
                "Rejected unparseable row"
            );
        }

        let resolver = FkResolver::new(entity, schema, Injector::new(&self.sink, &self.catalog));
        let mut resolved = Vec::with_capacity(source.rows.len());
        for source_row in source.rows {
            let mut row = source_row.row;
            row.set(ID_COLUMN, Value::Int(reservation.id_at(source_row.position)));
            match resolver.resolve(&mut self.store, row).await? {
                Resolution::Resolved(row) => resolved.push(row),
                Resolution::Missing(_) => counts.missing_ref += 1,
            }
        }

        let loader = ChunkedLoader::new(&self.sink, self.options.chunk_size);
        counts += loader.load(entity, schema, &resolved, &mut self.store).await?;
        let next_id = self.store.release(reservation)?;

        if counts.success == 0 {
            info!(target: PROGRESS_TARGET, file = %name, "No rows were imported");
        }
        info!(
            target: PROGRESS_TARGET,
            entity = entity.name,
            file = %name,
            next_id,
            elapsed_secs = started.elapsed().as_secs_f64(),
            "{}",
            counts
        );
        Ok(counts)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_model_marker_is_spent_on_arrival() {
        let mut markers = ResumeMarkers::new(Some("variants".into()), None);
        assert!(markers.skip_entity("genes"));
        assert!(markers.skip_entity("transcripts"));
        assert!(!markers.skip_entity("variants"));
        assert!(!markers.skip_entity("variants_transcripts"));
    }

    #[test]
    fn test_file_marker_is_global() {
        let mut markers = ResumeMarkers::new(None, Some("part3.tsv".into()));
        assert!(markers.skip_file("part1.tsv"));
        assert!(markers.skip_file("part2.tsv"));
        assert!(!markers.skip_file("part3.tsv"));
        assert!(!markers.skip_file("part1.tsv"));
    }

    #[test]
    fn test_no_markers_skip_nothing() {
        let mut markers = ResumeMarkers::default();
        assert!(!markers.skip_entity("genes"));
        assert!(!markers.skip_file("a.tsv"));
    }
}
