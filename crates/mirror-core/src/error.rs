//! Error taxonomy shared by the job manager, sources and sinks.
//!
//! Manager-level errors (`AlreadyRunning`, `NotFound`, `Resolution`) are returned
//! to the caller of `start`/`cancel`/`status`. Everything else is produced inside
//! the pipeline and ends up as the terminal result of a failed job.

use crate::job::JobId;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MirrorError {
    #[error("a mirror job is already running")]
    AlreadyRunning,

    #[error("job {0} not found")]
    NotFound(JobId),

    /// Unrecognized locator scheme, or no source configured for it.
    #[error("cannot resolve locator: {0}")]
    Resolution(String),

    #[error("timed out waiting for torrent metadata")]
    MetadataTimeout,

    #[error("download failed: {0}")]
    DownloadFailed(String),

    #[error("upload failed with HTTP {0}")]
    UploadFailed(u32),

    #[error("timed out waiting for the uploaded file link")]
    UploadTimeout,

    #[error("remote service error: {0}")]
    RemoteService(String),

    /// Network failure on the publishing side where no HTTP status is available.
    #[error("network error: {0}")]
    Transport(String),

    #[error("unsupported artifact: {0}")]
    UnsupportedArtifact(String),

    #[error("job cancelled")]
    Cancelled,

    /// The pipeline task panicked or could not be joined.
    #[error("internal error: {0}")]
    Internal(String),
}

impl MirrorError {
    /// Stable snake-case name used as `error_kind` in status payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            MirrorError::AlreadyRunning => "already_running",
            MirrorError::NotFound(_) => "not_found",
            MirrorError::Resolution(_) => "resolution_error",
            MirrorError::MetadataTimeout => "metadata_timeout",
            MirrorError::DownloadFailed(_) => "download_failed",
            MirrorError::UploadFailed(_) => "upload_failed",
            MirrorError::UploadTimeout => "upload_timeout",
            MirrorError::RemoteService(_) => "remote_service_error",
            MirrorError::Transport(_) => "transport_error",
            MirrorError::UnsupportedArtifact(_) => "unsupported_artifact",
            MirrorError::Cancelled => "cancelled",
            MirrorError::Internal(_) => "internal_error",
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, MirrorError::Cancelled)
    }

    pub(crate) fn download(cause: impl std::fmt::Display) -> Self {
        MirrorError::DownloadFailed(cause.to_string())
    }

    pub(crate) fn remote(message: impl std::fmt::Display) -> Self {
        MirrorError::RemoteService(message.to_string())
    }

    pub(crate) fn transport(cause: impl std::fmt::Display) -> Self {
        MirrorError::Transport(cause.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_distinct_and_snake_case() {
        let all = [
            MirrorError::AlreadyRunning,
            MirrorError::NotFound(7),
            MirrorError::Resolution("ftp://x".into()),
            MirrorError::MetadataTimeout,
            MirrorError::DownloadFailed("reset".into()),
            MirrorError::UploadFailed(500),
            MirrorError::UploadTimeout,
            MirrorError::RemoteService("quota".into()),
            MirrorError::Transport("dns".into()),
            MirrorError::UnsupportedArtifact("dir".into()),
            MirrorError::Cancelled,
            MirrorError::Internal("panic".into()),
        ];
        let mut kinds: Vec<&str> = all.iter().map(|e| e.kind()).collect();
        assert!(kinds
            .iter()
            .all(|k| k.chars().all(|c| c.is_ascii_lowercase() || c == '_')));
        kinds.sort_unstable();
        kinds.dedup();
        assert_eq!(kinds.len(), all.len());
    }

    #[test]
    fn display_carries_details() {
        assert_eq!(
            MirrorError::UploadFailed(503).to_string(),
            "upload failed with HTTP 503"
        );
        assert_eq!(MirrorError::NotFound(3).to_string(), "job 3 not found");
        assert!(MirrorError::Cancelled.is_cancelled());
        assert!(!MirrorError::UploadTimeout.is_cancelled());
    }
}
