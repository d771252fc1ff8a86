//! Sinks: publish an artifact and return retrievable links.

pub mod browser;
mod file_host;
pub mod staging;

pub use browser::BrowserUploadSink;
pub use file_host::FileHostSink;
pub use staging::RemoteStagingSink;

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::{MirrorConfig, SinkKind};
use crate::control::CancelToken;
use crate::error::MirrorError;
use crate::progress::ProgressReporter;
use crate::source::Artifact;

/// One retrievable file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub display_name: String,
    pub url: String,
    pub size_bytes: Option<u64>,
}

/// Links in discovery order.
pub type Links = Vec<Link>;

/// What a sink needs from the pipeline before it can publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkInput {
    /// The source must fetch the content into the job workspace first.
    LocalFile,
    /// The sink hands the locator to a remote service; nothing is fetched locally.
    Locator,
}

pub trait Sink: Send + Sync {
    fn name(&self) -> &'static str;

    fn input(&self) -> SinkInput {
        SinkInput::LocalFile
    }

    fn publish(
        &self,
        artifact: &Artifact,
        reporter: &ProgressReporter,
        cancel: &CancelToken,
    ) -> Result<Links, MirrorError>;
}

/// The sink selected by `cfg.sink`.
pub fn from_config(cfg: &MirrorConfig) -> Arc<dyn Sink> {
    match cfg.sink {
        SinkKind::FileHost => Arc::new(FileHostSink::from_config(&cfg.file_host, &cfg.http)),
        SinkKind::RemoteStaging => Arc::new(RemoteStagingSink::from_config(&cfg.staging)),
        SinkKind::BrowserUpload => Arc::new(BrowserUploadSink::from_config(&cfg.browser)),
    }
}

/// The local artifact, or `UnsupportedArtifact` for a remote reference.
pub(crate) fn expect_local<'a>(
    sink: &str,
    artifact: &'a Artifact,
) -> Result<&'a crate::source::LocalArtifact, MirrorError> {
    match artifact {
        Artifact::Local(local) => Ok(local),
        Artifact::Remote { locator } => Err(MirrorError::UnsupportedArtifact(format!(
            "{} sink needs a local file, got remote reference {}",
            sink, locator
        ))),
    }
}
