//! Sources: turn a locator into a local artifact.
//!
//! The job manager picks the source from the locator scheme (`magnet:` goes to
//! [`MagnetSource`], `http(s)://` to [`HttpSource`]). Sources are blocking and
//! run on the job's pipeline thread; they check the cancel token at every poll
//! point and report progress through the job's reporter.

mod http;
mod magnet;
mod transmission;

pub use http::HttpSource;
pub use magnet::{MagnetSource, MagnetTiming, TorrentEngine, TorrentHandle, TorrentState, TorrentStatus};
pub use transmission::TransmissionEngine;

use std::path::{Path, PathBuf};

use crate::control::CancelToken;
use crate::error::MirrorError;
use crate::locator::Locator;
use crate::progress::ProgressReporter;

/// Content fetched into the job workspace: a single file or a directory tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalArtifact {
    pub path: PathBuf,
    /// Declared name (Content-Disposition, URL segment or torrent name).
    pub name: String,
    pub size_bytes: u64,
}

impl LocalArtifact {
    pub fn is_dir(&self) -> bool {
        self.path.is_dir()
    }
}

/// What a sink publishes. The orchestrator passes it through without looking inside.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    Local(LocalArtifact),
    /// Nothing was fetched locally; the sink's remote service resolves the locator itself.
    Remote { locator: String },
}

pub trait Source: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Fetch `locator` into `workdir` (owned by the job, removed after it ends).
    fn fetch(
        &self,
        locator: &Locator,
        workdir: &Path,
        reporter: &ProgressReporter,
        cancel: &CancelToken,
    ) -> Result<LocalArtifact, MirrorError>;
}
