//! Job submission, status and cancellation.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;

use kinetic_models::{CompositionRequest, Job, JobId, JobState};

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Serialize)]
pub struct SubmitResponse {
    pub job_id: JobId,
    pub state: JobState,
}

/// Public view of a job; the request itself is not echoed back.
#[derive(Serialize)]
pub struct JobResponse {
    pub job_id: JobId,
    pub state: JobState,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub source: &'static str,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Job> for JobResponse {
    fn from(job: Job) -> Self {
        Self {
            source: job.request.source.kind(),
            job_id: job.id,
            state: job.state,
            progress: job.progress,
            current_step: job.current_step,
            output_path: job.output_path,
            error_message: job.error_message,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

/// POST /api/jobs
pub async fn submit_job(
    State(state): State<AppState>,
    Json(request): Json<CompositionRequest>,
) -> ApiResult<(StatusCode, Json<SubmitResponse>)> {
    let job_id = state.jobs.submit(request).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            job_id,
            state: JobState::Pending,
        }),
    ))
}

/// GET /api/jobs
pub async fn list_jobs(State(state): State<AppState>) -> Json<Vec<JobResponse>> {
    Json(state.jobs.list().await.into_iter().map(Into::into).collect())
}

/// GET /api/jobs/:job_id
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobResponse>> {
    let job = state.jobs.get_status(&JobId::from_string(job_id)).await?;
    Ok(Json(job.into()))
}

/// POST /api/jobs/:job_id/cancel
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobResponse>> {
    let job = state.jobs.cancel(&JobId::from_string(job_id)).await?;
    Ok(Json(job.into()))
}
