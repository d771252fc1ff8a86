//! Anonymous file host: one multipart POST per file, plain-text URL in reply.

use std::path::Path;

use super::{expect_local, Link, Links, Sink};
use crate::config::{FileHostConfig, HttpConfig};
use crate::control::CancelToken;
use crate::error::MirrorError;
use crate::http::{easy_for, header_list, perform_buffered, HttpOptions};
use crate::progress::{Progress, ProgressReporter};
use crate::source::Artifact;
use crate::storage;

#[derive(Debug, Clone)]
pub struct FileHostSink {
    endpoint: String,
    field_name: String,
    opts: HttpOptions,
}

impl FileHostSink {
    pub fn new(endpoint: impl Into<String>, field_name: impl Into<String>, opts: HttpOptions) -> Self {
        Self {
            endpoint: endpoint.into(),
            field_name: field_name.into(),
            opts,
        }
    }

    pub fn from_config(cfg: &FileHostConfig, http: &HttpConfig) -> Self {
        Self::new(cfg.endpoint.clone(), cfg.field_name.clone(), HttpOptions::transfer(http))
    }

    fn upload_one(&self, path: &Path, name: &str, cancel: &CancelToken) -> Result<String, MirrorError> {
        let mut easy = easy_for(&self.endpoint, &self.opts).map_err(MirrorError::transport)?;
        let mut form = curl::easy::Form::new();
        form.part(&self.field_name)
            .file(path)
            .filename(name)
            .add()
            .map_err(|e| MirrorError::transport(format!("build form for {}: {}", path.display(), e)))?;
        easy.httppost(form).map_err(MirrorError::transport)?;
        // No 100-continue round trip before the body.
        easy.http_headers(header_list([("Expect", "")]).map_err(MirrorError::transport)?)
            .map_err(MirrorError::transport)?;

        easy.progress(true).map_err(MirrorError::transport)?;
        let cancel_flag = cancel.clone();
        easy.progress_function(move |_, _, _, _| !cancel_flag.is_cancelled())
            .map_err(MirrorError::transport)?;

        let resp = match perform_buffered(&mut easy) {
            Ok(resp) => resp,
            Err(_) if cancel.is_cancelled() => return Err(MirrorError::Cancelled),
            Err(e) => return Err(MirrorError::transport(e)),
        };
        if resp.code != 200 {
            tracing::warn!(endpoint = %self.endpoint, code = resp.code, body = %resp.text().trim(), "file host rejected upload");
            return Err(MirrorError::UploadFailed(resp.code));
        }
        let url = resp.text().trim().to_string();
        if url.is_empty() {
            return Err(MirrorError::remote("file host returned an empty body"));
        }
        Ok(url)
    }
}

impl Sink for FileHostSink {
    fn name(&self) -> &'static str {
        "file_host"
    }

    fn publish(
        &self,
        artifact: &Artifact,
        reporter: &ProgressReporter,
        cancel: &CancelToken,
    ) -> Result<Links, MirrorError> {
        let local = expect_local(self.name(), artifact)?;
        let files = storage::list_files(&local.path)
            .map_err(|e| MirrorError::UnsupportedArtifact(format!("{}: {}", local.path.display(), e)))?;
        if files.is_empty() {
            return Err(MirrorError::UnsupportedArtifact(format!(
                "{} contains no files",
                local.path.display()
            )));
        }

        reporter.report(Progress::with_rate(0, Some(local.size_bytes), 0.0));
        let mut links = Links::with_capacity(files.len());
        let mut uploaded = 0u64;
        for file in &files {
            cancel.check()?;
            let display_name = if local.is_dir() {
                file.strip_prefix(&local.path)
                    .unwrap_or(file)
                    .to_string_lossy()
                    .into_owned()
            } else {
                local.name.clone()
            };
            let size = std::fs::metadata(file).map(|m| m.len()).ok();
            tracing::info!(job_id = reporter.job_id(), file = %display_name, endpoint = %self.endpoint, "uploading");
            let url = self.upload_one(file, &display_name, cancel)?;
            tracing::info!(job_id = reporter.job_id(), file = %display_name, url = %url, "uploaded");
            uploaded += size.unwrap_or(0);
            links.push(Link {
                display_name,
                url,
                size_bytes: size,
            });
        }
        reporter.report(Progress::with_rate(uploaded, Some(local.size_bytes), 0.0));
        Ok(links)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{LimitPolicy, TracingObserver};
    use crate::source::LocalArtifact;
    use std::sync::Arc;
    use std::time::Duration;

    fn reporter() -> ProgressReporter {
        ProgressReporter::new(1, LimitPolicy::Interval(Duration::from_secs(1)), Arc::new(TracingObserver))
    }

    #[test]
    fn remote_reference_is_unsupported() {
        let sink = FileHostSink::new("http://127.0.0.1:9/", "file", HttpOptions::api());
        let err = sink
            .publish(
                &Artifact::Remote { locator: "magnet:?xt=urn:btih:abc".into() },
                &reporter(),
                &CancelToken::new(),
            )
            .unwrap_err();
        assert_eq!(err.kind(), "unsupported_artifact");
    }

    #[test]
    fn empty_directory_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileHostSink::new("http://127.0.0.1:9/", "file", HttpOptions::api());
        let artifact = Artifact::Local(LocalArtifact {
            path: dir.path().to_path_buf(),
            name: "empty".into(),
            size_bytes: 0,
        });
        let err = sink.publish(&artifact, &reporter(), &CancelToken::new()).unwrap_err();
        assert_eq!(err.kind(), "unsupported_artifact");
    }

    #[test]
    fn cancelled_before_upload() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f.bin");
        std::fs::write(&file, b"abc").unwrap();
        let sink = FileHostSink::new("http://127.0.0.1:9/", "file", HttpOptions::api());
        let cancel = CancelToken::new();
        cancel.cancel();
        let artifact = Artifact::Local(LocalArtifact {
            path: file,
            name: "f.bin".into(),
            size_bytes: 3,
        });
        assert_eq!(
            sink.publish(&artifact, &reporter(), &cancel),
            Err(MirrorError::Cancelled)
        );
    }
}
