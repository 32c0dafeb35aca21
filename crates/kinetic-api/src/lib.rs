//! Axum HTTP API for the kinetic composition service.
//!
//! Requests reference files already staged on the host by path; the API
//! only submits, polls and cancels jobs on the worker's job manager.

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
