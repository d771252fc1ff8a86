//! Mirror jobs: the single-flight manager and the fetch -> publish pipeline.
//!
//! At most one job runs at a time. `JobManager::start` claims the slot under a
//! mutex and launches the pipeline on a blocking thread; the source fetches into
//! a job-owned workspace, the sink publishes, and the manager writes the
//! terminal state before the consumer sees the terminal event.

mod manager;
mod pipeline;
mod slot;
mod types;

pub use manager::{JobManager, JobManagerBuilder};
pub use types::{Job, JobId, JobState, Stage, StatusPayload};
