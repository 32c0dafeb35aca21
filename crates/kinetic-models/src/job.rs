//! Job records and lifecycle states.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

use crate::CompositionRequest;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Job lifecycle state. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Job is accepted and waiting for a worker slot
    #[default]
    Pending,
    /// Pipeline is running
    Processing,
    /// Output is available
    Completed,
    /// Pipeline aborted; see the error message
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Processing => "processing",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    /// Whether `next` is a legal successor of this state.
    pub fn can_transition_to(&self, next: JobState) -> bool {
        matches!(
            (self, next),
            (JobState::Pending, JobState::Processing)
                | (JobState::Pending, JobState::Failed)
                | (JobState::Processing, JobState::Completed)
                | (JobState::Processing, JobState::Failed)
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Rejected state change.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid job transition: {from} -> {to}")]
pub struct InvalidTransition {
    pub from: JobState,
    pub to: JobState,
}

/// A composition job as observed by pollers.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    /// Unique job ID
    pub id: JobId,

    /// Current state
    pub state: JobState,

    /// What to render
    pub request: CompositionRequest,

    /// Final output location (set on completion only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,

    /// Error message (if failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Progress (0-100)
    #[serde(default)]
    pub progress: u8,

    /// Current pipeline stage
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,

    /// Started at timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// Completed or failed at timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a new pending job.
    pub fn new(request: CompositionRequest) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            state: JobState::Pending,
            request,
            output_path: None,
            error_message: None,
            progress: 0,
            current_step: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    fn transition(&mut self, next: JobState) -> Result<(), InvalidTransition> {
        if !self.state.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Start processing the job.
    pub fn start(&mut self) -> Result<(), InvalidTransition> {
        self.transition(JobState::Processing)?;
        self.started_at = Some(self.updated_at);
        Ok(())
    }

    /// Mark job as completed.
    pub fn complete(&mut self, output_path: PathBuf) -> Result<(), InvalidTransition> {
        self.transition(JobState::Completed)?;
        self.output_path = Some(output_path);
        self.finished_at = Some(self.updated_at);
        self.progress = 100;
        self.current_step = None;
        Ok(())
    }

    /// Mark job as failed.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), InvalidTransition> {
        self.transition(JobState::Failed)?;
        self.error_message = Some(error.into());
        self.finished_at = Some(self.updated_at);
        Ok(())
    }

    /// Update progress. Progress never moves backwards.
    pub fn set_progress(&mut self, progress: u8) {
        let progress = progress.min(100);
        if progress > self.progress {
            self.progress = progress;
            self.updated_at = Utc::now();
        }
    }

    /// Record the current pipeline stage.
    pub fn set_step(&mut self, step: impl Into<String>) {
        self.current_step = Some(step.into());
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SourceInput;

    fn request() -> CompositionRequest {
        CompositionRequest::new(SourceInput::Video {
            path: "/tmp/bg.mp4".into(),
            loop_to_audio: false,
        })
    }

    #[test]
    fn test_job_creation() {
        let job = Job::new(request());
        assert_eq!(job.state, JobState::Pending);
        assert!(job.output_path.is_none());
        assert!(!job.is_terminal());
    }

    #[test]
    fn test_job_state_transitions() {
        let mut job = Job::new(request());

        job.start().unwrap();
        assert_eq!(job.state, JobState::Processing);
        assert!(job.started_at.is_some());

        job.complete("/out/a.mp4".into()).unwrap();
        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.progress, 100);
        assert!(job.is_terminal());
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut job = Job::new(request());
        job.start().unwrap();
        job.fail("encoder exploded").unwrap();

        let err = job.start().unwrap_err();
        assert_eq!(err.from, JobState::Failed);
        assert!(job.complete("/out/a.mp4".into()).is_err());
        assert_eq!(job.error_message.as_deref(), Some("encoder exploded"));
    }

    #[test]
    fn test_pending_can_fail_but_not_complete() {
        let mut job = Job::new(request());
        assert!(job.complete("/out/a.mp4".into()).is_err());
        assert!(job.fail("Canceled").is_ok());
        assert!(job.started_at.is_none());
    }

    #[test]
    fn test_progress_is_monotonic() {
        let mut job = Job::new(request());
        job.set_progress(40);
        job.set_progress(20);
        assert_eq!(job.progress, 40);
        job.set_progress(250);
        assert_eq!(job.progress, 100);
    }
}
