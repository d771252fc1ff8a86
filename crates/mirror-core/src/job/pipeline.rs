//! The blocking fetch -> publish sequence of one job.

use std::path::Path;
use std::sync::Arc;

use super::types::{JobId, Stage};
use crate::control::CancelToken;
use crate::error::MirrorError;
use crate::locator::Locator;
use crate::progress::ProgressReporter;
use crate::sink::{Links, Sink, SinkInput};
use crate::source::{Artifact, Source};
use crate::storage::JobWorkspace;

/// Everything one pipeline run needs. Runs on a blocking thread.
pub(crate) struct Pipeline<'a> {
    pub job_id: JobId,
    pub locator: &'a Locator,
    /// `None` when the sink takes the locator itself.
    pub source: Option<Arc<dyn Source>>,
    pub sink: Arc<dyn Sink>,
    pub download_root: &'a Path,
    pub reporter: &'a ProgressReporter,
    pub cancel: &'a CancelToken,
}

impl Pipeline<'_> {
    /// Runs the steps, calling `enter_stage` before each one. The job workspace
    /// (if any) is removed before this returns, whatever the outcome.
    pub fn run(self, enter_stage: &dyn Fn(Stage)) -> Result<Links, MirrorError> {
        self.cancel.check()?;
        let source = match (self.sink.input(), &self.source) {
            (SinkInput::Locator, _) => {
                enter_stage(Stage::Publishing);
                let artifact = Artifact::Remote {
                    locator: self.locator.as_str().to_string(),
                };
                return self.sink.publish(&artifact, self.reporter, self.cancel);
            }
            (SinkInput::LocalFile, Some(source)) => Arc::clone(source),
            (SinkInput::LocalFile, None) => {
                return Err(MirrorError::Resolution(format!(
                    "no source configured for {}",
                    self.locator
                )))
            }
        };

        let workspace = JobWorkspace::create(self.download_root, self.job_id)
            .map_err(|e| MirrorError::DownloadFailed(format!("{:#}", e)))?;
        let outcome = self.fetch_then_publish(source.as_ref(), workspace.path(), enter_stage);
        workspace.close();
        outcome
    }

    fn fetch_then_publish(
        &self,
        source: &dyn Source,
        workdir: &Path,
        enter_stage: &dyn Fn(Stage),
    ) -> Result<Links, MirrorError> {
        enter_stage(Stage::Fetching);
        tracing::info!(job_id = self.job_id, source = source.name(), locator = %self.locator, "fetching");
        let artifact = source.fetch(self.locator, workdir, self.reporter, self.cancel)?;
        self.cancel.check()?;

        enter_stage(Stage::Publishing);
        tracing::info!(
            job_id = self.job_id,
            sink = self.sink.name(),
            path = %artifact.path.display(),
            size_bytes = artifact.size_bytes,
            "publishing"
        );
        self.sink
            .publish(&Artifact::Local(artifact), self.reporter, self.cancel)
    }
}
