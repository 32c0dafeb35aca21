//! Shared data models for the Kinetic composition service.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs and their lifecycle states
//! - Composition requests (source, text overlay, audio)
//! - Layout styles and canvas geometry
//! - Encoding configuration

pub mod canvas;
pub mod encoding;
pub mod job;
pub mod request;
pub mod style;

// Re-export common types
pub use canvas::{Canvas, MediaDescriptor, Orientation};
pub use encoding::EncodingConfig;
pub use job::{InvalidTransition, Job, JobId, JobState};
pub use request::{AudioInput, AudioRole, CompositionRequest, SourceInput, TextOverlay};
pub use style::{LayoutStyle, StyleParseError};
