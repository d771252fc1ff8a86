//! The single-flight slot: the one current job and its bookkeeping.
//!
//! Every read and write of the current job goes through `JobSlot` under the
//! manager's mutex. Nothing in here blocks.

use std::time::{Duration, Instant, SystemTime};

use tokio::sync::watch;

use super::types::{Job, JobId, JobState, Stage};
use crate::control::CancelToken;
use crate::error::MirrorError;
use crate::locator::Locator;
use crate::progress::Progress;
use crate::sink::Links;

/// The current job plus what the manager needs to drive it.
struct Record {
    job: Job,
    cancel: CancelToken,
    finished_at: Option<Instant>,
    /// Receives the terminal snapshot once; waiters subscribe to it.
    done_tx: watch::Sender<Option<Job>>,
}

/// Handles for a freshly claimed job.
pub(crate) struct Claimed {
    pub id: JobId,
    pub cancel: CancelToken,
}

pub(crate) struct JobSlot {
    current: Option<Record>,
    next_id: JobId,
    retention: Option<Duration>,
}

impl JobSlot {
    pub fn new(retention: Option<Duration>) -> Self {
        Self {
            current: None,
            next_id: 1,
            retention,
        }
    }

    /// Drop a finished record whose retention window has passed.
    fn expire(&mut self, now: Instant) {
        let (Some(retention), Some(rec)) = (self.retention, &self.current) else {
            return;
        };
        if let Some(at) = rec.finished_at {
            if now.duration_since(at) >= retention {
                tracing::debug!(job_id = rec.job.id, "finished job snapshot expired");
                self.current = None;
            }
        }
    }

    fn record(&mut self, id: JobId) -> Option<&mut Record> {
        self.expire(Instant::now());
        self.current.as_mut().filter(|r| r.job.id == id)
    }

    /// Atomic check-and-set: fails with `AlreadyRunning` while the current job
    /// is not terminal; otherwise replaces it with a new `Running` job.
    pub fn claim(&mut self, locator: Locator) -> Result<Claimed, MirrorError> {
        if self.is_busy() {
            return Err(MirrorError::AlreadyRunning);
        }
        let id = self.next_id;
        self.next_id += 1;
        let mut job = Job {
            id,
            locator,
            state: JobState::Pending,
            stage: None,
            created_at: SystemTime::now(),
            progress: Progress::default(),
            result: None,
        };
        debug_assert!(job.state.can_move_to(JobState::Running));
        job.state = JobState::Running;
        let cancel = CancelToken::new();
        let (done_tx, _) = watch::channel(None);
        self.current = Some(Record {
            job,
            cancel: cancel.clone(),
            finished_at: None,
            done_tx,
        });
        Ok(Claimed { id, cancel })
    }

    pub fn snapshot(&mut self, id: JobId) -> Result<Job, MirrorError> {
        self.record(id)
            .map(|r| r.job.clone())
            .ok_or(MirrorError::NotFound(id))
    }

    pub fn current(&mut self) -> Option<Job> {
        self.expire(Instant::now());
        self.current.as_ref().map(|r| r.job.clone())
    }

    pub fn is_busy(&self) -> bool {
        matches!(&self.current, Some(r) if !r.job.state.is_terminal())
    }

    /// Set the cancel token of a running job. No-op on terminal jobs.
    /// Returns whether a cancellation was requested.
    pub fn cancel(&mut self, id: JobId) -> Result<bool, MirrorError> {
        let rec = self.record(id).ok_or(MirrorError::NotFound(id))?;
        if rec.job.state.is_terminal() {
            return Ok(false);
        }
        rec.cancel.cancel();
        Ok(true)
    }

    /// Subscribe to the terminal snapshot of `id`.
    pub fn subscribe(&mut self, id: JobId) -> Result<watch::Receiver<Option<Job>>, MirrorError> {
        self.record(id)
            .map(|r| r.done_tx.subscribe())
            .ok_or(MirrorError::NotFound(id))
    }

    pub fn set_progress(&mut self, id: JobId, progress: &Progress) {
        if let Some(rec) = self.record(id) {
            if !rec.job.state.is_terminal() {
                rec.job.progress = progress.clone();
            }
        }
    }

    pub fn set_stage(&mut self, id: JobId, stage: Stage) {
        if let Some(rec) = self.record(id) {
            if !rec.job.state.is_terminal() {
                rec.job.stage = Some(stage);
                rec.job.progress = Progress::default();
            }
        }
    }

    /// Write the terminal state and free the slot for the next `claim`.
    /// Returns the terminal snapshot, or `None` if the job was already terminal.
    pub fn finish(&mut self, id: JobId, outcome: Result<Links, MirrorError>) -> Option<Job> {
        let rec = self.record(id)?;
        let next = JobState::for_outcome(&outcome);
        if !rec.job.state.can_move_to(next) {
            return None;
        }
        rec.job.state = next;
        rec.job.result = Some(outcome);
        rec.finished_at = Some(Instant::now());
        let snapshot = rec.job.clone();
        rec.done_tx.send_replace(Some(snapshot.clone()));
        Some(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc() -> Locator {
        Locator::parse("https://example.com/f.bin").unwrap()
    }

    #[test]
    fn second_claim_while_running_is_rejected() {
        let mut slot = JobSlot::new(None);
        let first = slot.claim(loc()).unwrap();
        assert_eq!(slot.claim(loc()).err(), Some(MirrorError::AlreadyRunning));
        let job = slot.snapshot(first.id).unwrap();
        assert_eq!(job.state, JobState::Running);
        assert!(slot.is_busy());
    }

    #[test]
    fn finish_frees_slot_and_next_start_supersedes() {
        let mut slot = JobSlot::new(None);
        let first = slot.claim(loc()).unwrap();
        let done = slot.finish(first.id, Ok(Vec::new())).unwrap();
        assert_eq!(done.state, JobState::Completed);
        assert!(!slot.is_busy());
        assert_eq!(slot.snapshot(first.id).unwrap().state, JobState::Completed);

        let second = slot.claim(loc()).unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(slot.snapshot(first.id), Err(MirrorError::NotFound(first.id)));
    }

    #[test]
    fn terminal_state_is_final() {
        let mut slot = JobSlot::new(None);
        let c = slot.claim(loc()).unwrap();
        slot.finish(c.id, Err(MirrorError::Cancelled)).unwrap();
        assert!(slot.finish(c.id, Ok(Vec::new())).is_none());
        slot.set_progress(c.id, &Progress::with_rate(5, None, 0.0));
        let job = slot.snapshot(c.id).unwrap();
        assert_eq!(job.state, JobState::Cancelled);
        assert_eq!(job.result, Some(Err(MirrorError::Cancelled)));
        assert_eq!(job.progress.bytes_done, 0);
    }

    #[test]
    fn cancel_semantics() {
        let mut slot = JobSlot::new(None);
        assert_eq!(slot.cancel(42), Err(MirrorError::NotFound(42)));
        let c = slot.claim(loc()).unwrap();
        assert_eq!(slot.cancel(c.id), Ok(true));
        assert!(c.cancel.is_cancelled());
        slot.finish(c.id, Err(MirrorError::Cancelled));
        assert_eq!(slot.cancel(c.id), Ok(false));
        assert_eq!(slot.cancel(c.id + 1), Err(MirrorError::NotFound(c.id + 1)));
    }

    #[test]
    fn retention_window_expires_snapshot() {
        let mut slot = JobSlot::new(Some(Duration::from_millis(20)));
        let c = slot.claim(loc()).unwrap();
        slot.finish(c.id, Ok(Vec::new()));
        assert!(slot.snapshot(c.id).is_ok());
        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(slot.snapshot(c.id), Err(MirrorError::NotFound(c.id)));
        assert!(slot.current().is_none());
    }

    #[test]
    fn stage_resets_progress_and_subscribers_see_terminal() {
        let mut slot = JobSlot::new(None);
        let c = slot.claim(loc()).unwrap();
        let rx = slot.subscribe(c.id).unwrap();
        slot.set_progress(c.id, &Progress::with_rate(10, Some(10), 1.0));
        slot.set_stage(c.id, Stage::Publishing);
        let job = slot.snapshot(c.id).unwrap();
        assert_eq!(job.stage, Some(Stage::Publishing));
        assert_eq!(job.progress, Progress::default());
        assert!(rx.borrow().is_none());
        slot.finish(c.id, Err(MirrorError::UploadFailed(500)));
        assert_eq!(rx.borrow().as_ref().map(|j| j.state), Some(JobState::Failed));
    }
}
