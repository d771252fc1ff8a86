pub mod config;
pub mod logging;

pub mod control;
pub mod error;
pub mod http;
pub mod job;
pub mod locator;
pub mod naming;
pub mod progress;
pub mod sink;
pub mod source;
pub mod storage;

pub use control::CancelToken;
pub use error::MirrorError;
pub use job::{Job, JobId, JobManager, JobManagerBuilder, JobState, Stage};
pub use locator::Locator;
pub use progress::{Progress, ProgressReporter};
pub use sink::{Link, Links, Sink};
pub use source::{Artifact, LocalArtifact, Source};
