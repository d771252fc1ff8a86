//! `JobManager`: start, cancel and inspect the single mirror job.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::runtime::Handle;

use super::pipeline::Pipeline;
use super::slot::JobSlot;
use super::types::{Job, JobId, Stage};
use crate::config::MirrorConfig;
use crate::control::CancelToken;
use crate::error::MirrorError;
use crate::http::HttpOptions;
use crate::locator::Locator;
use crate::progress::{JobObserver, LimitPolicy, ProgressReporter, TracingObserver};
use crate::sink::{self, Sink, SinkInput};
use crate::source::{HttpSource, MagnetSource, MagnetTiming, Source, TransmissionEngine};

struct Inner {
    slot: Mutex<JobSlot>,
    http_source: Option<Arc<dyn Source>>,
    magnet_source: Option<Arc<dyn Source>>,
    sink: Arc<dyn Sink>,
    observer: Arc<dyn JobObserver>,
    policy: LimitPolicy,
    download_root: PathBuf,
    runtime: Handle,
}

impl Inner {
    fn slot(&self) -> MutexGuard<'_, JobSlot> {
        // The slot is only mutated by short non-panicking sections; a poisoned
        // lock still holds consistent data.
        match self.slot.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Owns the single-flight job slot and runs each job's pipeline on a blocking
/// thread of the runtime it was built in. Cheap to clone; clones share the slot.
///
/// `start`, `cancel` and `status` never wait on pipeline activity and may be
/// called from any thread.
#[derive(Clone)]
pub struct JobManager {
    inner: Arc<Inner>,
}

impl JobManager {
    pub fn builder() -> JobManagerBuilder {
        JobManagerBuilder::default()
    }

    fn source_for(&self, locator: &Locator) -> Result<Option<Arc<dyn Source>>, MirrorError> {
        if self.inner.sink.input() == SinkInput::Locator {
            return Ok(None);
        }
        let source = if locator.is_magnet() {
            &self.inner.magnet_source
        } else {
            &self.inner.http_source
        };
        match source {
            Some(s) => Ok(Some(Arc::clone(s))),
            None => Err(MirrorError::Resolution(format!(
                "no source configured for {}",
                locator
            ))),
        }
    }

    /// Start a job for `raw`. Fails synchronously with `Resolution` for a bad
    /// locator and `AlreadyRunning` while another job is active.
    pub fn start(&self, raw: &str) -> Result<JobId, MirrorError> {
        let locator = Locator::parse(raw)?;
        let source = self.source_for(&locator)?;
        let claimed = self.inner.slot().claim(locator.clone())?;
        let job_id = claimed.id;
        tracing::info!(job_id, locator = %locator, sink = self.inner.sink.name(), "job started");

        let recorder_inner = Arc::clone(&self.inner);
        let reporter = ProgressReporter::new(job_id, self.inner.policy, Arc::clone(&self.inner.observer))
            .with_recorder(move |p| recorder_inner.slot().set_progress(job_id, p));
        let reporter = Arc::new(reporter);

        let inner = Arc::clone(&self.inner);
        let cancel = claimed.cancel;
        self.inner.runtime.spawn(async move {
            let task_inner = Arc::clone(&inner);
            let task_reporter = Arc::clone(&reporter);
            let joined = inner
                .runtime
                .spawn_blocking(move || run_job(&task_inner, job_id, &locator, source, &task_reporter, &cancel))
                .await;
            let outcome = joined.unwrap_or_else(|e| {
                tracing::error!(job_id, "pipeline task failed: {}", e);
                Err(MirrorError::Internal(format!("pipeline task: {}", e)))
            });
            let finished = inner.slot().finish(job_id, outcome.clone());
            match finished {
                Some(job) => match &outcome {
                    Ok(links) => tracing::info!(job_id, links = links.len(), "job completed"),
                    Err(e) => tracing::info!(job_id, state = job.state.as_str(), kind = e.kind(), "job ended: {}", e),
                },
                None => tracing::warn!(job_id, "job already terminal, outcome dropped"),
            }
            reporter.finish(&outcome);
        });
        Ok(job_id)
    }

    /// Request cancellation of a running job. Returns immediately; the pipeline
    /// stops at its next poll point. No-op for a finished job.
    pub fn cancel(&self, id: JobId) -> Result<(), MirrorError> {
        if self.inner.slot().cancel(id)? {
            tracing::info!(job_id = id, "cancellation requested");
        }
        Ok(())
    }

    pub fn status(&self, id: JobId) -> Result<Job, MirrorError> {
        self.inner.slot().snapshot(id)
    }

    /// The current (or most recent, still retained) job.
    pub fn current(&self) -> Option<Job> {
        self.inner.slot().current()
    }

    /// Resolves with the terminal snapshot of `id`.
    pub async fn wait(&self, id: JobId) -> Result<Job, MirrorError> {
        let mut rx = self.inner.slot().subscribe(id)?;
        let done = rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| MirrorError::NotFound(id))?;
        (*done).clone().ok_or(MirrorError::NotFound(id))
    }
}

fn run_job(
    inner: &Inner,
    job_id: JobId,
    locator: &Locator,
    source: Option<Arc<dyn Source>>,
    reporter: &ProgressReporter,
    cancel: &CancelToken,
) -> Result<sink::Links, MirrorError> {
    let enter_stage = |stage: Stage| {
        inner.slot().set_stage(job_id, stage);
        reporter.stage(stage);
    };
    Pipeline {
        job_id,
        locator,
        source,
        sink: Arc::clone(&inner.sink),
        download_root: &inner.download_root,
        reporter,
        cancel,
    }
    .run(&enter_stage)
}

/// Assembles a [`JobManager`] from configuration or explicit parts.
#[derive(Default)]
pub struct JobManagerBuilder {
    http_source: Option<Arc<dyn Source>>,
    magnet_source: Option<Arc<dyn Source>>,
    sink: Option<Arc<dyn Sink>>,
    observer: Option<Arc<dyn JobObserver>>,
    policy: Option<LimitPolicy>,
    download_root: Option<PathBuf>,
    retention: Option<Duration>,
}

impl JobManagerBuilder {
    /// Sources, sink, progress policy and retention as configured.
    pub fn from_config(cfg: &MirrorConfig) -> Result<Self> {
        let engine = Arc::new(TransmissionEngine::from_config(&cfg.torrent));
        Ok(Self {
            http_source: Some(Arc::new(HttpSource::new(HttpOptions::transfer(&cfg.http)))),
            magnet_source: Some(Arc::new(MagnetSource::new(
                engine,
                MagnetTiming::from_config(&cfg.torrent),
            ))),
            sink: Some(sink::from_config(cfg)),
            observer: None,
            policy: Some(cfg.progress.policy()),
            download_root: Some(cfg.resolved_download_dir()?),
            retention: cfg.finished_retention(),
        })
    }

    pub fn http_source(mut self, source: Arc<dyn Source>) -> Self {
        self.http_source = Some(source);
        self
    }

    pub fn magnet_source(mut self, source: Arc<dyn Source>) -> Self {
        self.magnet_source = Some(source);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn Sink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Consumer of progress and terminal events (default: [`TracingObserver`]).
    pub fn observer(mut self, observer: Arc<dyn JobObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn progress_policy(mut self, policy: LimitPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Root under which per-job workspaces are created.
    pub fn download_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.download_root = Some(root.into());
        self
    }

    /// Keep a finished job queryable for at most `retention`.
    pub fn retention(mut self, retention: Duration) -> Self {
        self.retention = Some(retention);
        self
    }

    /// Must be called inside a tokio runtime; jobs run on that runtime.
    pub fn build(self) -> Result<JobManager> {
        let runtime = Handle::try_current().context("JobManager must be built inside a tokio runtime")?;
        let sink = self.sink.context("no sink configured")?;
        let download_root = match self.download_root {
            Some(root) => root,
            None => std::env::temp_dir().join("mirror-jobs"),
        };
        Ok(JobManager {
            inner: Arc::new(Inner {
                slot: Mutex::new(JobSlot::new(self.retention)),
                http_source: self.http_source,
                magnet_source: self.magnet_source,
                sink,
                observer: self.observer.unwrap_or_else(|| Arc::new(TracingObserver)),
                policy: self
                    .policy
                    .unwrap_or(LimitPolicy::Interval(Duration::from_secs(1))),
                download_root,
                runtime,
            }),
        })
    }
}
