//! Forwarding of progress and terminal events to the consumer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc::UnboundedSender;

use super::{LimitPolicy, Progress, RateLimiter};
use crate::error::MirrorError;
use crate::job::{JobId, Stage};
use crate::sink::Links;

/// Consumer of job events. Implementations must return quickly: they are called
/// from the job's pipeline thread.
pub trait JobObserver: Send + Sync {
    fn on_progress(&self, job_id: JobId, progress: &Progress);

    fn on_stage(&self, _job_id: JobId, _stage: Stage) {}

    /// Called exactly once per job with its outcome.
    fn on_finished(&self, job_id: JobId, outcome: &Result<Links, MirrorError>);
}

/// Owned event, as delivered by [`ChannelObserver`].
#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    Progress { job_id: JobId, progress: Progress },
    Stage { job_id: JobId, stage: Stage },
    Finished {
        job_id: JobId,
        outcome: Result<Links, MirrorError>,
    },
}

/// Pushes events into an unbounded tokio channel; never blocks and never drops.
/// The reporter's limiter keeps the volume bounded.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: UnboundedSender<JobEvent>,
}

impl ChannelObserver {
    pub fn new(tx: UnboundedSender<JobEvent>) -> Self {
        Self { tx }
    }
}

impl JobObserver for ChannelObserver {
    fn on_progress(&self, job_id: JobId, progress: &Progress) {
        let _ = self.tx.send(JobEvent::Progress {
            job_id,
            progress: progress.clone(),
        });
    }

    fn on_stage(&self, job_id: JobId, stage: Stage) {
        let _ = self.tx.send(JobEvent::Stage { job_id, stage });
    }

    fn on_finished(&self, job_id: JobId, outcome: &Result<Links, MirrorError>) {
        let _ = self.tx.send(JobEvent::Finished {
            job_id,
            outcome: outcome.clone(),
        });
    }
}

/// Logs events through `tracing`. Default observer for the daemon.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl JobObserver for TracingObserver {
    fn on_progress(&self, job_id: JobId, progress: &Progress) {
        tracing::info!(
            job_id,
            bytes_done = progress.bytes_done,
            bytes_total = ?progress.bytes_total,
            rate = progress.rate_bytes_per_sec as u64,
            estimated = progress.estimated,
            "progress"
        );
    }

    fn on_stage(&self, job_id: JobId, stage: Stage) {
        tracing::info!(job_id, stage = stage.as_str(), "stage");
    }

    fn on_finished(&self, job_id: JobId, outcome: &Result<Links, MirrorError>) {
        match outcome {
            Ok(links) => tracing::info!(job_id, links = links.len(), "job finished"),
            Err(e) => tracing::warn!(job_id, kind = e.kind(), "job finished: {}", e),
        }
    }
}

type Recorder = Box<dyn Fn(&Progress) + Send + Sync>;

/// Rate-limited progress forwarding for one job.
///
/// Every raw update goes to the optional recorder (the job manager keeps the
/// latest value for status snapshots); only updates the limiter allows reach the
/// observer. The terminal event bypasses the limiter.
pub struct ProgressReporter {
    job_id: JobId,
    limiter: Mutex<RateLimiter>,
    observer: Arc<dyn JobObserver>,
    recorder: Option<Recorder>,
    finished: AtomicBool,
}

impl ProgressReporter {
    pub fn new(job_id: JobId, policy: LimitPolicy, observer: Arc<dyn JobObserver>) -> Self {
        Self {
            job_id,
            limiter: Mutex::new(RateLimiter::new(policy)),
            observer,
            recorder: None,
            finished: AtomicBool::new(false),
        }
    }

    /// Also hand every raw update to `recorder`, limiter or not.
    pub fn with_recorder(mut self, recorder: impl Fn(&Progress) + Send + Sync + 'static) -> Self {
        self.recorder = Some(Box::new(recorder));
        self
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Raw update from a source or sink. Returns true when it was forwarded.
    pub fn report(&self, progress: Progress) -> bool {
        if self.finished.load(Ordering::Acquire) {
            return false;
        }
        if let Some(record) = &self.recorder {
            record(&progress);
        }
        let allowed = match self.limiter.lock() {
            Ok(mut limiter) => limiter.allow(progress.bytes_done),
            Err(poisoned) => poisoned.into_inner().allow(progress.bytes_done),
        };
        if allowed {
            self.observer.on_progress(self.job_id, &progress);
        }
        allowed
    }

    /// Announces a new stage. Byte counts restart per stage, so the limiter does too.
    pub fn stage(&self, stage: Stage) {
        match self.limiter.lock() {
            Ok(mut limiter) => limiter.reset(),
            Err(poisoned) => poisoned.into_inner().reset(),
        }
        self.observer.on_stage(self.job_id, stage);
    }

    /// Terminal event: always forwarded, at most once.
    pub fn finish(&self, outcome: &Result<Links, MirrorError>) {
        if self.finished.swap(true, Ordering::AcqRel) {
            return;
        }
        self.observer.on_finished(self.job_id, outcome);
    }
}
