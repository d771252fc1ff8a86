//! Remote staging: hand the locator to a service that fetches it, then poll
//! the resulting container until files show up.

mod client;
mod response;

pub use client::HttpStagingClient;
pub use response::{Container, ContainerId, StagedFile, StagedTorrent};

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{Links, Sink, SinkInput};
use crate::config::StagingConfig;
use crate::control::CancelToken;
use crate::error::MirrorError;
use crate::progress::{Progress, ProgressReporter};
use crate::source::Artifact;

/// Contract of the remote staging service.
pub trait StagingService: Send + Sync {
    fn add(&self, locator: &str) -> Result<ContainerId, MirrorError>;
    fn list_contents(&self, id: &str) -> Result<Container, MirrorError>;
    fn list_all(&self) -> Result<Vec<Container>, MirrorError>;
    fn delete_file(&self, id: &str) -> Result<(), MirrorError>;
    fn delete_folder(&self, id: &str) -> Result<(), MirrorError>;
}

pub struct RemoteStagingSink {
    service: Arc<dyn StagingService>,
    poll: Duration,
    /// `None` polls until files appear, a torrent fails, or the job is cancelled.
    timeout: Option<Duration>,
}

impl RemoteStagingSink {
    pub fn new(service: Arc<dyn StagingService>, poll: Duration, timeout: Option<Duration>) -> Self {
        Self {
            service,
            poll,
            timeout,
        }
    }

    pub fn from_config(cfg: &StagingConfig) -> Self {
        Self::new(
            Arc::new(HttpStagingClient::from_config(cfg)),
            Duration::from_secs(cfg.poll_secs),
            cfg.timeout_secs.map(Duration::from_secs),
        )
    }

    pub fn list_all(&self) -> Result<Vec<Container>, MirrorError> {
        self.service.list_all()
    }

    pub fn delete_file(&self, id: &str) -> Result<(), MirrorError> {
        self.service.delete_file(id)?;
        tracing::info!(file_id = id, "staged file deleted");
        Ok(())
    }

    pub fn delete_folder(&self, id: &str) -> Result<(), MirrorError> {
        self.service.delete_folder(id)?;
        tracing::info!(folder_id = id, "staging folder deleted");
        Ok(())
    }
}

fn report_torrents(reporter: &ProgressReporter, container: &Container) {
    let Some(t) = container.torrents.first() else {
        return;
    };
    let fraction = t.progress.clamp(0.0, 1.0);
    let (done, total) = match t.size_bytes {
        Some(size) => ((size as f64 * fraction) as u64, Some(size)),
        None => ((fraction * 100.0) as u64, Some(100)),
    };
    reporter.report(Progress::with_rate(done, total, 0.0));
}

impl Sink for RemoteStagingSink {
    fn name(&self) -> &'static str {
        "remote_staging"
    }

    fn input(&self) -> SinkInput {
        SinkInput::Locator
    }

    fn publish(
        &self,
        artifact: &Artifact,
        reporter: &ProgressReporter,
        cancel: &CancelToken,
    ) -> Result<Links, MirrorError> {
        let locator = match artifact {
            Artifact::Remote { locator } => locator,
            Artifact::Local(local) => {
                return Err(MirrorError::UnsupportedArtifact(format!(
                    "remote staging takes a locator, got local file {}",
                    local.path.display()
                )))
            }
        };
        cancel.check()?;
        let container_id = self.service.add(locator)?;
        tracing::info!(job_id = reporter.job_id(), container = %container_id, "locator added to staging");

        let started = Instant::now();
        loop {
            cancel.check()?;
            let container = self.service.list_contents(&container_id)?;
            if !container.files.is_empty() {
                tracing::info!(
                    job_id = reporter.job_id(),
                    container = %container_id,
                    files = container.files.len(),
                    "staging container ready"
                );
                return Ok(container.files.iter().map(StagedFile::to_link).collect());
            }
            if let Some(t) = container.torrents.iter().find(|t| t.is_failed()) {
                return Err(MirrorError::remote(format!(
                    "staging torrent {} ended with status {}",
                    t.name, t.status
                )));
            }
            if !container.torrents.is_empty() && container.torrents.iter().all(StagedTorrent::is_finished) {
                return Err(MirrorError::remote(format!(
                    "staging container {} finished without files",
                    container_id
                )));
            }
            report_torrents(reporter, &container);
            if let Some(limit) = self.timeout {
                if started.elapsed() >= limit {
                    return Err(MirrorError::remote(format!(
                        "staging container {} not ready after {:?}",
                        container_id, limit
                    )));
                }
            }
            tracing::debug!(job_id = reporter.job_id(), container = %container_id, "staging container empty, polling");
            cancel.sleep(self.poll)?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{LimitPolicy, TracingObserver};
    use crate::sink::Link;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Container fills after `files_after` polls; `add_error` fails the add call.
    struct FakeStaging {
        add_error: Option<String>,
        files_after: usize,
        torrent_status: &'static str,
        polls: AtomicUsize,
        deleted: Mutex<Vec<String>>,
    }

    impl FakeStaging {
        fn new(files_after: usize) -> Self {
            Self {
                add_error: None,
                files_after,
                torrent_status: "downloading",
                polls: AtomicUsize::new(0),
                deleted: Mutex::new(Vec::new()),
            }
        }
    }

    impl StagingService for FakeStaging {
        fn add(&self, _locator: &str) -> Result<ContainerId, MirrorError> {
            match &self.add_error {
                Some(e) => Err(MirrorError::RemoteService(e.clone())),
                None => Ok("c1".into()),
            }
        }

        fn list_contents(&self, id: &str) -> Result<Container, MirrorError> {
            let n = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
            let ready = n >= self.files_after;
            Ok(Container {
                id: id.to_string(),
                name: Some("ubuntu".into()),
                files: if ready {
                    vec![StagedFile {
                        id: "f1".into(),
                        name: "ubuntu.iso".into(),
                        url: "https://staging.example/f1".into(),
                        size_bytes: Some(100),
                    }]
                } else {
                    Vec::new()
                },
                torrents: if ready {
                    Vec::new()
                } else {
                    vec![StagedTorrent {
                        id: "t1".into(),
                        name: "ubuntu".into(),
                        status: self.torrent_status.into(),
                        progress: 0.5,
                        size_bytes: Some(100),
                    }]
                },
            })
        }

        fn list_all(&self) -> Result<Vec<Container>, MirrorError> {
            Ok(Vec::new())
        }

        fn delete_file(&self, id: &str) -> Result<(), MirrorError> {
            self.deleted.lock().unwrap().push(format!("file:{}", id));
            Ok(())
        }

        fn delete_folder(&self, id: &str) -> Result<(), MirrorError> {
            self.deleted.lock().unwrap().push(format!("folder:{}", id));
            Ok(())
        }
    }

    fn reporter() -> ProgressReporter {
        ProgressReporter::new(1, LimitPolicy::ByteDelta(1), Arc::new(TracingObserver))
    }

    fn remote() -> Artifact {
        Artifact::Remote {
            locator: "magnet:?xt=urn:btih:abc".into(),
        }
    }

    #[test]
    fn links_only_after_files_appear() {
        let fake = Arc::new(FakeStaging::new(3));
        let sink = RemoteStagingSink::new(fake.clone(), Duration::from_millis(5), None);
        let links = sink.publish(&remote(), &reporter(), &CancelToken::new()).unwrap();
        assert_eq!(fake.polls.load(Ordering::SeqCst), 3);
        assert_eq!(
            links,
            vec![Link {
                display_name: "ubuntu.iso".into(),
                url: "https://staging.example/f1".into(),
                size_bytes: Some(100),
            }]
        );
    }

    #[test]
    fn add_error_skips_polling() {
        let mut fake = FakeStaging::new(1);
        fake.add_error = Some("invalid magnet".into());
        let fake = Arc::new(fake);
        let sink = RemoteStagingSink::new(fake.clone(), Duration::from_millis(5), None);
        let err = sink.publish(&remote(), &reporter(), &CancelToken::new()).unwrap_err();
        assert_eq!(err, MirrorError::RemoteService("invalid magnet".into()));
        assert_eq!(fake.polls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn failed_torrent_ends_polling() {
        let mut fake = FakeStaging::new(usize::MAX);
        fake.torrent_status = "error";
        let sink = RemoteStagingSink::new(Arc::new(fake), Duration::from_millis(5), None);
        let err = sink.publish(&remote(), &reporter(), &CancelToken::new()).unwrap_err();
        assert_eq!(err.kind(), "remote_service_error");
    }

    #[test]
    fn bounded_wait_times_out() {
        let fake = Arc::new(FakeStaging::new(usize::MAX));
        let sink = RemoteStagingSink::new(fake, Duration::from_millis(5), Some(Duration::from_millis(30)));
        let err = sink.publish(&remote(), &reporter(), &CancelToken::new()).unwrap_err();
        assert!(matches!(err, MirrorError::RemoteService(ref m) if m.contains("not ready")));
    }

    #[test]
    fn cancel_stops_polling() {
        let fake = Arc::new(FakeStaging::new(usize::MAX));
        let sink = RemoteStagingSink::new(fake, Duration::from_millis(20), None);
        let cancel = CancelToken::new();
        let remote_cancel = cancel.clone();
        let t = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            remote_cancel.cancel();
        });
        let started = Instant::now();
        assert_eq!(
            sink.publish(&remote(), &reporter(), &cancel),
            Err(MirrorError::Cancelled)
        );
        t.join().unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn local_artifact_is_unsupported_and_admin_ops_delegate() {
        let fake = Arc::new(FakeStaging::new(1));
        let sink = RemoteStagingSink::new(fake.clone(), Duration::from_millis(5), None);
        let local = Artifact::Local(crate::source::LocalArtifact {
            path: "/tmp/x".into(),
            name: "x".into(),
            size_bytes: 1,
        });
        assert_eq!(
            sink.publish(&local, &reporter(), &CancelToken::new()).unwrap_err().kind(),
            "unsupported_artifact"
        );
        sink.delete_file("f1").unwrap();
        sink.delete_folder("c1").unwrap();
        assert!(sink.list_all().unwrap().is_empty());
        assert_eq!(*fake.deleted.lock().unwrap(), vec!["file:f1", "folder:c1"]);
    }
}
