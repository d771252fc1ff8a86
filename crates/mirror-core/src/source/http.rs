//! Streaming HTTP(S) GET into the job workspace.

use std::cell::{Cell, RefCell};
use std::path::Path;
use std::time::Instant;

use super::{LocalArtifact, Source};
use crate::control::CancelToken;
use crate::error::MirrorError;
use crate::http::{easy_for, HttpOptions, ResponseHeaders};
use crate::locator::Locator;
use crate::naming;
use crate::progress::{Progress, ProgressReporter};
use crate::storage::ArtifactWriter;

/// Single-stream GET, written sequentially to `<workdir>/<name>.part` and renamed
/// on success. Fails with `DownloadFailed` on transport errors, non-2xx
/// responses, or when fewer bytes than the declared `Content-Length` arrive.
#[derive(Debug, Clone, Default)]
pub struct HttpSource {
    opts: HttpOptions,
}

impl HttpSource {
    pub fn new(opts: HttpOptions) -> Self {
        Self { opts }
    }
}

fn open_artifact(
    workdir: &Path,
    url: &url::Url,
    headers: &ResponseHeaders,
) -> anyhow::Result<(ArtifactWriter, String)> {
    let name = naming::artifact_name(url, headers.content_disposition());
    let mut writer = ArtifactWriter::create(&workdir.join(&name))?;
    if let Some(len) = headers.content_length() {
        writer.preallocate(len)?;
    }
    Ok((writer, name))
}

impl Source for HttpSource {
    fn name(&self) -> &'static str {
        "http"
    }

    fn fetch(
        &self,
        locator: &Locator,
        workdir: &Path,
        reporter: &ProgressReporter,
        cancel: &CancelToken,
    ) -> Result<LocalArtifact, MirrorError> {
        let url = match locator {
            Locator::Http { url } => url,
            other => {
                return Err(MirrorError::Resolution(format!(
                    "http source cannot fetch {}",
                    other
                )))
            }
        };
        cancel.check()?;
        tracing::info!(job_id = reporter.job_id(), url = %url, "http fetch starting");

        let mut easy = easy_for(url.as_str(), &self.opts).map_err(MirrorError::download)?;
        easy.progress(true).map_err(MirrorError::download)?;

        let headers = RefCell::new(ResponseHeaders::default());
        let artifact: RefCell<Option<(ArtifactWriter, String)>> = RefCell::new(None);
        let write_error: RefCell<Option<anyhow::Error>> = RefCell::new(None);
        let cancelled = Cell::new(false);
        let started = Instant::now();

        let performed = {
            let mut transfer = easy.transfer();
            transfer
                .header_function(|line| {
                    headers.borrow_mut().push_line(line);
                    true
                })
                .map_err(MirrorError::download)?;
            transfer
                .write_function(|data| {
                    if cancel.is_cancelled() {
                        cancelled.set(true);
                        return Ok(0);
                    }
                    let headers = headers.borrow();
                    if !headers.is_success() {
                        // Error page body; the status is reported after perform.
                        return Ok(data.len());
                    }
                    let mut slot = artifact.borrow_mut();
                    if slot.is_none() {
                        match open_artifact(workdir, url, &headers) {
                            Ok(opened) => *slot = Some(opened),
                            Err(e) => {
                                *write_error.borrow_mut() = Some(e);
                                return Ok(0);
                            }
                        }
                    }
                    if let Some((writer, _)) = slot.as_mut() {
                        if let Err(e) = writer.write(data) {
                            *write_error.borrow_mut() = Some(e);
                            return Ok(0);
                        }
                        reporter.report(Progress::measured(
                            writer.written(),
                            headers.content_length(),
                            started.elapsed(),
                        ));
                    }
                    Ok(data.len())
                })
                .map_err(MirrorError::download)?;
            transfer
                .progress_function(|_, _, _, _| {
                    if cancel.is_cancelled() {
                        cancelled.set(true);
                        return false;
                    }
                    true
                })
                .map_err(MirrorError::download)?;
            transfer.perform()
        };

        if cancelled.get() {
            tracing::info!(job_id = reporter.job_id(), url = %url, "http fetch cancelled");
            return Err(MirrorError::Cancelled);
        }
        if let Some(e) = write_error.into_inner() {
            return Err(MirrorError::DownloadFailed(format!("write artifact: {:#}", e)));
        }
        performed.map_err(MirrorError::download)?;

        let code = easy.response_code().map_err(MirrorError::download)?;
        if !(200..300).contains(&code) {
            return Err(MirrorError::DownloadFailed(format!(
                "GET {} returned HTTP {}",
                url, code
            )));
        }

        let headers = headers.into_inner();
        let (writer, name) = match artifact.into_inner() {
            Some(opened) => opened,
            // Empty body: nothing reached the write callback.
            None => open_artifact(workdir, url, &headers).map_err(MirrorError::download)?,
        };
        let written = writer.written();
        if let Some(declared) = headers.content_length() {
            if written != declared {
                return Err(MirrorError::DownloadFailed(format!(
                    "partial transfer: received {} of {} bytes",
                    written, declared
                )));
            }
        }
        let (path, size_bytes) = writer
            .finish()
            .map_err(|e| MirrorError::DownloadFailed(format!("{:#}", e)))?;
        tracing::info!(
            job_id = reporter.job_id(),
            path = %path.display(),
            size_bytes,
            "http fetch complete"
        );
        Ok(LocalArtifact {
            path,
            name,
            size_bytes,
        })
    }
}
