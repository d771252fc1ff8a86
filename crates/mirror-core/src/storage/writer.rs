//! Sequential writer for a fetched artifact.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::io::AsRawFd;

use super::temp_path;

/// Writes an artifact to `<final>.part`, then renames it into place on `finish`.
/// Dropping the writer without finishing leaves the `.part` file for the job
/// workspace to remove.
pub struct ArtifactWriter {
    file: BufWriter<File>,
    temp_path: PathBuf,
    final_path: PathBuf,
    written: u64,
}

impl ArtifactWriter {
    /// Create (truncating) the temp file for `final_path`.
    pub fn create(final_path: &Path) -> Result<Self> {
        let temp_path = temp_path(final_path);
        let file = File::options()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .with_context(|| format!("failed to create temp file: {}", temp_path.display()))?;
        Ok(Self {
            file: BufWriter::with_capacity(256 * 1024, file),
            temp_path,
            final_path: final_path.to_path_buf(),
            written: 0,
        })
    }

    /// Reserve `size` bytes up front. Uses `posix_fallocate` on Unix and falls back
    /// to `set_len`. The logical size is trimmed back to what was written on `finish`.
    pub fn preallocate(&mut self, size: u64) -> Result<()> {
        let file = self.file.get_ref();
        #[cfg(unix)]
        {
            let fd = file.as_raw_fd();
            let r = unsafe { libc::posix_fallocate(fd, 0, size as libc::off_t) };
            if r == 0 {
                return Ok(());
            }
            tracing::debug!(errno = r, "posix_fallocate failed, falling back to set_len");
        }
        file.set_len(size).context("failed to preallocate artifact")?;
        Ok(())
    }

    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        self.file
            .write_all(data)
            .with_context(|| format!("write {}", self.temp_path.display()))?;
        self.written += data.len() as u64;
        Ok(())
    }

    /// Bytes written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Flush, trim to the written length, sync and rename to the final path.
    /// Returns the final path and its size.
    pub fn finish(self) -> Result<(PathBuf, u64)> {
        let written = self.written;
        let file = self
            .file
            .into_inner()
            .map_err(|e| anyhow::anyhow!("flush {}: {}", self.temp_path.display(), e.error()))?;
        file.set_len(written).context("trim artifact")?;
        file.sync_all().context("sync artifact")?;
        drop(file);
        std::fs::rename(&self.temp_path, &self.final_path).with_context(|| {
            format!(
                "failed to rename {} to {}",
                self.temp_path.display(),
                self.final_path.display()
            )
        })?;
        Ok((self.final_path, written))
    }
}
