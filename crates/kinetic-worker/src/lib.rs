//! Job lifecycle for kinetic compositions.
//!
//! This crate owns the job table and the pipeline that drives one request
//! through probing, motion synthesis, layout, rasterization, composition and
//! encoding. Jobs run on a bounded pool and can be canceled at any time.

pub mod config;
pub mod error;
pub mod logging;
pub mod manager;
pub mod metrics;
pub mod pipeline;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult, CANCELED_MESSAGE};
pub use logging::JobLogger;
pub use manager::JobManager;
pub use pipeline::{Pipeline, PipelineOutput, StageUpdate};
