//! Job metrics.
//!
//! Recorded through the `metrics` facade; nothing is exported unless the
//! host process installs a recorder.

use metrics::{counter, gauge, histogram};

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_SUBMITTED_TOTAL: &str = "kinetic_jobs_submitted_total";
    pub const JOBS_REJECTED_TOTAL: &str = "kinetic_jobs_rejected_total";
    pub const JOBS_COMPLETED_TOTAL: &str = "kinetic_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "kinetic_jobs_failed_total";
    pub const JOBS_CANCELED_TOTAL: &str = "kinetic_jobs_canceled_total";
    pub const JOBS_ACTIVE: &str = "kinetic_jobs_active";
    pub const JOB_DURATION_SECONDS: &str = "kinetic_job_duration_seconds";
    pub const ENCODE_DURATION_SECONDS: &str = "kinetic_encode_duration_seconds";
}

pub fn record_job_submitted(source_kind: &str) {
    let labels = [("source", source_kind.to_string())];
    counter!(names::JOBS_SUBMITTED_TOTAL, &labels).increment(1);
}

pub fn record_job_rejected() {
    counter!(names::JOBS_REJECTED_TOTAL).increment(1);
}

pub fn record_job_completed(source_kind: &str, duration_secs: f64) {
    let labels = [("source", source_kind.to_string())];
    counter!(names::JOBS_COMPLETED_TOTAL, &labels).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_job_failed(source_kind: &str) {
    let labels = [("source", source_kind.to_string())];
    counter!(names::JOBS_FAILED_TOTAL, &labels).increment(1);
}

pub fn record_job_canceled() {
    counter!(names::JOBS_CANCELED_TOTAL).increment(1);
}

/// Record one encoder run; `stage` is "motion", "solid" or "encoding".
pub fn record_encode_duration(stage: &str, duration_secs: f64) {
    let labels = [("stage", stage.to_string())];
    histogram!(names::ENCODE_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn job_started() {
    gauge!(names::JOBS_ACTIVE).increment(1.0);
}

pub fn job_finished() {
    gauge!(names::JOBS_ACTIVE).decrement(1.0);
}
