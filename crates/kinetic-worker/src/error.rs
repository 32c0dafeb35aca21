//! Worker error types.

use thiserror::Error;

use kinetic_media::MediaError;
use kinetic_models::{InvalidTransition, JobId};

pub type WorkerResult<T> = Result<T, WorkerError>;

/// Message recorded on a job failed by cancellation.
pub const CANCELED_MESSAGE: &str = "Canceled";

#[derive(Debug, Error)]
pub enum WorkerError {
    /// Rejected at submission; no job is created.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("Worker is shutting down")]
    ShuttingDown,

    #[error(transparent)]
    InvalidState(#[from] InvalidTransition),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl WorkerError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, WorkerError::Media(MediaError::Cancelled))
    }

    /// Human-readable message stored on a failed job.
    ///
    /// Encoder failures get the last diagnostic line appended.
    pub fn job_message(&self) -> String {
        if self.is_canceled() {
            return CANCELED_MESSAGE.to_string();
        }
        let last_line = match self {
            WorkerError::Media(e) => e
                .diagnostics()
                .and_then(|d| d.lines().rev().find(|l| !l.trim().is_empty())),
            _ => None,
        };
        match last_line {
            Some(line) => format!("{}: {}", self, line.trim()),
            None => self.to_string(),
        }
    }
}

impl From<validator::ValidationErrors> for WorkerError {
    fn from(e: validator::ValidationErrors) -> Self {
        Self::InvalidInput(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canceled_message() {
        let err = WorkerError::from(MediaError::Cancelled);
        assert!(err.is_canceled());
        assert_eq!(err.job_message(), "Canceled");
    }

    #[test]
    fn test_encoder_diagnostics_in_message() {
        let err = WorkerError::from(MediaError::ffmpeg_failed(
            "FFmpeg exited with exit status: 1",
            Some("frame=1\nNo such filter: 'bogus'\n".to_string()),
            Some(1),
        ));
        let msg = err.job_message();
        assert!(msg.starts_with("Media error: FFmpeg command failed"));
        assert!(msg.ends_with("No such filter: 'bogus'"));
    }

    #[test]
    fn test_plain_message() {
        let err = WorkerError::from(MediaError::EmptyText);
        assert_eq!(err.job_message(), "Media error: Text content is empty after processing");
    }
}
