//! Job identity, lifecycle and the status payload.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::error::MirrorError;
use crate::locator::Locator;
use crate::progress::Progress;
use crate::sink::Links;

pub type JobId = u64;

/// Lifecycle state. Transitions only move forward:
/// `Pending -> Running -> {Completed, Failed, Cancelled}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Cancelled
        )
    }

    /// Whether `self -> next` is a legal transition.
    pub fn can_move_to(&self, next: JobState) -> bool {
        match self {
            JobState::Pending => matches!(next, JobState::Running | JobState::Cancelled),
            JobState::Running => next.is_terminal(),
            _ => false,
        }
    }

    /// Terminal state for a pipeline outcome.
    pub fn for_outcome(outcome: &Result<Links, MirrorError>) -> JobState {
        match outcome {
            Ok(_) => JobState::Completed,
            Err(e) if e.is_cancelled() => JobState::Cancelled,
            Err(_) => JobState::Failed,
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline step a running job is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Fetching,
    Publishing,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Fetching => "fetching",
            Stage::Publishing => "publishing",
        }
    }
}

/// Immutable snapshot of a job.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: JobId,
    pub locator: Locator,
    pub state: JobState,
    pub stage: Option<Stage>,
    pub created_at: SystemTime,
    /// Latest raw progress of the current stage.
    pub progress: Progress,
    /// Set once the job is terminal.
    pub result: Option<Result<Links, MirrorError>>,
}

impl Job {
    pub fn status_payload(&self) -> StatusPayload {
        let (links, error_kind, message) = match &self.result {
            Some(Ok(links)) => (Some(links.clone()), None, None),
            Some(Err(e)) => (None, Some(e.kind().to_string()), Some(e.to_string())),
            None => (None, None, None),
        };
        StatusPayload {
            id: self.id,
            locator: self.locator.as_str().to_string(),
            state: self.state,
            stage: self.stage,
            progress: self.progress.clone(),
            links,
            error_kind,
            message,
        }
    }
}

/// Wire form of a job snapshot: `links` on success, `error_kind` + `message` on failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusPayload {
    pub id: JobId,
    pub locator: String,
    pub state: JobState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    pub progress: Progress,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Links>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
