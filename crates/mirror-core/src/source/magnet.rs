//! Magnet links through a local torrent engine.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{LocalArtifact, Source};
use crate::config::TorrentConfig;
use crate::control::CancelToken;
use crate::error::MirrorError;
use crate::locator::Locator;
use crate::naming;
use crate::progress::{Progress, ProgressReporter};

/// Engine-side identifier of an added torrent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentHandle(pub String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TorrentState {
    /// Still resolving metadata from peers.
    Metadata,
    Downloading,
    /// Fully retrieved (seeding or complete).
    Complete,
    /// The engine gave up on this torrent.
    Failed(String),
}

/// One status poll of a torrent.
#[derive(Debug, Clone, PartialEq)]
pub struct TorrentStatus {
    pub state: TorrentState,
    /// Known once metadata arrived.
    pub name: Option<String>,
    pub total_bytes: Option<u64>,
    pub bytes_done: u64,
    pub download_rate: u64,
}

impl TorrentStatus {
    pub fn has_metadata(&self) -> bool {
        self.state != TorrentState::Metadata && self.name.is_some()
    }
}

/// The local torrent engine the magnet source drives.
pub trait TorrentEngine: Send + Sync {
    /// Register the magnet link, downloading into `save_dir`, and start peer discovery.
    fn add_magnet(&self, uri: &str, save_dir: &Path) -> Result<TorrentHandle, MirrorError>;

    fn status(&self, handle: &TorrentHandle) -> Result<TorrentStatus, MirrorError>;

    /// Forget the torrent, keeping its data on disk.
    fn remove(&self, handle: &TorrentHandle) -> Result<(), MirrorError>;
}

/// Poll intervals and the optional metadata bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MagnetTiming {
    pub metadata_poll: Duration,
    pub transfer_poll: Duration,
    /// `None` waits for metadata indefinitely.
    pub metadata_timeout: Option<Duration>,
}

impl Default for MagnetTiming {
    fn default() -> Self {
        Self::from_config(&TorrentConfig::default())
    }
}

impl MagnetTiming {
    pub fn from_config(cfg: &TorrentConfig) -> Self {
        Self {
            metadata_poll: Duration::from_millis(cfg.metadata_poll_ms),
            transfer_poll: Duration::from_millis(cfg.transfer_poll_ms),
            metadata_timeout: cfg.metadata_timeout_secs.map(Duration::from_secs),
        }
    }
}

/// Path of the engine's output inside `workdir`. The engine-reported name must be a
/// single plain path component.
fn artifact_path(workdir: &Path, name: &str) -> Result<PathBuf, MirrorError> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(part)), None) => Ok(workdir.join(part)),
        _ => Err(MirrorError::DownloadFailed(format!(
            "torrent name {:?} is not a plain file name",
            name
        ))),
    }
}

/// Removes the torrent from the engine on every exit path.
struct EngineGuard<'a> {
    engine: &'a dyn TorrentEngine,
    handle: TorrentHandle,
}

impl Drop for EngineGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.engine.remove(&self.handle) {
            tracing::warn!(torrent = %self.handle.0, "remove torrent from engine: {}", e);
        }
    }
}

pub struct MagnetSource {
    engine: Arc<dyn TorrentEngine>,
    timing: MagnetTiming,
}

impl MagnetSource {
    pub fn new(engine: Arc<dyn TorrentEngine>, timing: MagnetTiming) -> Self {
        Self { engine, timing }
    }

    fn wait_for_metadata(
        &self,
        handle: &TorrentHandle,
        reporter: &ProgressReporter,
        cancel: &CancelToken,
    ) -> Result<TorrentStatus, MirrorError> {
        let started = Instant::now();
        loop {
            cancel.check()?;
            let status = self.engine.status(handle)?;
            if let TorrentState::Failed(reason) = &status.state {
                return Err(MirrorError::DownloadFailed(reason.clone()));
            }
            if status.has_metadata() {
                return Ok(status);
            }
            if let Some(limit) = self.timing.metadata_timeout {
                if started.elapsed() >= limit {
                    tracing::warn!(job_id = reporter.job_id(), "no torrent metadata after {:?}", limit);
                    return Err(MirrorError::MetadataTimeout);
                }
            }
            tracing::debug!(job_id = reporter.job_id(), "waiting for torrent metadata");
            cancel.sleep(self.timing.metadata_poll)?;
        }
    }
}

impl Source for MagnetSource {
    fn name(&self) -> &'static str {
        "magnet"
    }

    fn fetch(
        &self,
        locator: &Locator,
        workdir: &Path,
        reporter: &ProgressReporter,
        cancel: &CancelToken,
    ) -> Result<LocalArtifact, MirrorError> {
        let (uri, display_name) = match locator {
            Locator::Magnet { uri, display_name } => (uri, display_name),
            other => {
                return Err(MirrorError::Resolution(format!(
                    "magnet source cannot fetch {}",
                    other
                )))
            }
        };
        cancel.check()?;
        let handle = self.engine.add_magnet(uri, workdir)?;
        tracing::info!(
            job_id = reporter.job_id(),
            torrent = %handle.0,
            name = display_name.as_deref().unwrap_or("?"),
            "magnet added, downloading metadata"
        );
        let guard = EngineGuard {
            engine: self.engine.as_ref(),
            handle,
        };

        let meta = self.wait_for_metadata(&guard.handle, reporter, cancel)?;
        let name = meta.name.clone().unwrap_or_default();
        let path = artifact_path(workdir, &name)?;
        tracing::info!(
            job_id = reporter.job_id(),
            name = %name,
            total_bytes = ?meta.total_bytes,
            "torrent metadata received"
        );

        let mut status = meta;
        loop {
            reporter.report(Progress::with_rate(
                status.bytes_done,
                status.total_bytes,
                status.download_rate as f64,
            ));
            match &status.state {
                TorrentState::Complete => break,
                TorrentState::Failed(reason) => {
                    return Err(MirrorError::DownloadFailed(reason.clone()))
                }
                TorrentState::Metadata | TorrentState::Downloading => {}
            }
            cancel.sleep(self.timing.transfer_poll)?;
            cancel.check()?;
            status = self.engine.status(&guard.handle)?;
            tracing::debug!(
                job_id = reporter.job_id(),
                bytes_done = status.bytes_done,
                rate = status.download_rate,
                "torrent status"
            );
        }
        drop(guard);

        if !path.exists() {
            return Err(MirrorError::DownloadFailed(format!(
                "engine reported completion but {} is missing",
                path.display()
            )));
        }
        let size_bytes = match status.total_bytes {
            Some(n) => n,
            None => crate::storage::disk_usage(&path).map_err(MirrorError::download)?,
        };
        tracing::info!(job_id = reporter.job_id(), path = %path.display(), size_bytes, "torrent complete");
        Ok(LocalArtifact {
            path,
            name: naming::safe_name(&name),
            size_bytes,
        })
    }
}
