//! Job directories
//!
//! Each run writes its checkpoints and logs into a numbered directory under
//! the jobs root. An empty highest-numbered directory is reused, so a run
//! that failed before writing anything does not leave a gap.

use ibvl_common::{IbvlError, Result};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub number: u64,
    /// Where this run writes checkpoints and logs
    pub dir: PathBuf,
    /// Where key maps are first read from
    pub load_dir: PathBuf,
}

impl Job {
    /// Select the job directory, and the load directory when maps are copied
    /// from an earlier job
    pub fn open(jobs_root: &Path, copy_maps_from: Option<&str>) -> Result<Self> {
        let (number, dir) = select_job_dir(jobs_root)?;

        let load_dir = match copy_maps_from {
            Some(job) => {
                let source = jobs_root.join(job);
                if !source.is_dir() {
                    return Err(IbvlError::Config(format!(
                        "cannot copy maps from job {}: {} does not exist",
                        job,
                        source.display()
                    )));
                }
                source
            }
            None => dir.clone(),
        };

        info!(job = number, dir = %dir.display(), load_dir = %load_dir.display(), "Selected job directory");
        Ok(Self {
            number,
            dir,
            load_dir,
        })
    }

    pub fn copies_maps(&self) -> bool {
        self.load_dir != self.dir
    }
}

/// Highest-numbered job directory if it is empty, otherwise a new one
/// numbered one above it. Creates the root and job `1` as needed.
pub fn select_job_dir(jobs_root: &Path) -> Result<(u64, PathBuf)> {
    std::fs::create_dir_all(jobs_root).map_err(|e| IbvlError::path_io(jobs_root, e))?;

    let mut latest: Option<u64> = None;
    let entries = std::fs::read_dir(jobs_root).map_err(|e| IbvlError::path_io(jobs_root, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| IbvlError::path_io(jobs_root, e))?;
        if !entry.path().is_dir() {
            continue;
        }
        if let Some(number) = entry.file_name().to_str().and_then(|n| n.parse::<u64>().ok()) {
            latest = Some(latest.map_or(number, |l| l.max(number)));
        }
    }

    let number = match latest {
        Some(n) if is_empty_dir(&jobs_root.join(n.to_string()))? => n,
        Some(n) => n + 1,
        None => 1,
    };
    let dir = jobs_root.join(number.to_string());
    std::fs::create_dir_all(&dir).map_err(|e| IbvlError::path_io(&dir, e))?;
    Ok((number, dir))
}

fn is_empty_dir(dir: &Path) -> Result<bool> {
    let mut entries = std::fs::read_dir(dir).map_err(|e| IbvlError::path_io(dir, e))?;
    Ok(entries.next().is_none())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_first_job_is_one() {
        let root = TempDir::new().unwrap();
        let (number, dir) = select_job_dir(&root.path().join("jobs")).unwrap();
        assert_eq!(number, 1);
        assert!(dir.is_dir());
    }

    #[test]
    fn test_reuses_empty_latest_job() {
        let root = TempDir::new().unwrap();
        std::fs::create_dir_all(root.path().join("1")).unwrap();
        std::fs::write(root.path().join("1").join("genes_pk_map.json"), "{}").unwrap();
        std::fs::create_dir_all(root.path().join("2")).unwrap();

        let (number, _) = select_job_dir(root.path()).unwrap();
        assert_eq!(number, 2);
    }

    #[test]
    fn test_creates_next_job() {
        let root = TempDir::new().unwrap();
        for n in ["2", "10"] {
            std::fs::create_dir_all(root.path().join(n)).unwrap();
            std::fs::write(root.path().join(n).join("progress.log"), "").unwrap();
        }
        std::fs::create_dir_all(root.path().join("scratch")).unwrap();

        let (number, dir) = select_job_dir(root.path()).unwrap();
        assert_eq!(number, 11);
        assert_eq!(dir, root.path().join("11"));
    }

    #[test]
    fn test_copy_maps_from_existing_job() {
        let root = TempDir::new().unwrap();
        std::fs::create_dir_all(root.path().join("1")).unwrap();
        std::fs::write(root.path().join("1").join("genes_next_id.json"), "5").unwrap();

        let job = Job::open(root.path(), Some("1")).unwrap();
        assert_eq!(job.number, 2);
        assert_eq!(job.load_dir, root.path().join("1"));
        assert!(job.copies_maps());
    }

    #[test]
    fn test_copy_maps_from_missing_job() {
        let root = TempDir::new().unwrap();
        let err = Job::open(root.path(), Some("7")).unwrap_err();
        assert!(matches!(err, IbvlError::Config(_)));
    }
}
