//! Local artifact storage and the per-job workspace.
//!
//! Every job that produces local files gets a private temporary directory under
//! the configured download dir. The directory and everything in it is removed
//! when the workspace is dropped, so artifacts never outlive their job whether it
//! completed, failed or was cancelled.

mod writer;

pub use writer::ArtifactWriter;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::job::JobId;

/// Temporary file suffix used before the atomic rename.
pub const TEMP_SUFFIX: &str = ".part";

/// Path for the temp file: appends `.part` to the final path.
pub fn temp_path(final_path: &Path) -> PathBuf {
    let mut o = final_path.as_os_str().to_owned();
    o.push(TEMP_SUFFIX);
    PathBuf::from(o)
}

/// A job-owned scratch directory, deleted on drop.
pub struct JobWorkspace {
    dir: tempfile::TempDir,
    job_id: JobId,
}

impl JobWorkspace {
    /// Create `<root>/mirror-job-<id>-XXXX`, creating `root` if needed.
    pub fn create(root: &Path, job_id: JobId) -> Result<Self> {
        std::fs::create_dir_all(root)
            .with_context(|| format!("create download dir {}", root.display()))?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("mirror-job-{}-", job_id))
            .tempdir_in(root)
            .with_context(|| format!("create job workspace in {}", root.display()))?;
        tracing::debug!(job_id, path = %dir.path().display(), "job workspace created");
        Ok(Self { dir, job_id })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Remove the workspace now, logging instead of failing on errors.
    pub fn close(self) {
        let path = self.dir.path().to_path_buf();
        let job_id = self.job_id;
        match self.dir.close() {
            Ok(()) => tracing::debug!(job_id, path = %path.display(), "job workspace removed"),
            Err(e) => tracing::warn!(job_id, path = %path.display(), "job workspace cleanup: {}", e),
        }
    }
}

/// Total size of the regular files under `path` (or of `path` itself).
pub fn disk_usage(path: &Path) -> std::io::Result<u64> {
    let meta = std::fs::symlink_metadata(path)?;
    if meta.is_file() {
        return Ok(meta.len());
    }
    if !meta.is_dir() {
        return Ok(0);
    }
    let mut total = 0;
    for entry in std::fs::read_dir(path)? {
        total += disk_usage(&entry?.path())?;
    }
    Ok(total)
}

/// Regular files under `path` in sorted path order (`path` itself when it is a file).
pub fn list_files(path: &Path) -> std::io::Result<Vec<PathBuf>> {
    let meta = std::fs::symlink_metadata(path)?;
    if meta.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    let mut out = Vec::new();
    if meta.is_dir() {
        let mut entries: Vec<PathBuf> = std::fs::read_dir(path)?
            .map(|e| e.map(|e| e.path()))
            .collect::<std::io::Result<_>>()?;
        entries.sort();
        for entry in entries {
            out.extend(list_files(&entry)?);
        }
    }
    Ok(out)
}
