//! Motion, typography and filter-graph composition on top of the FFmpeg CLI.
//!
//! This crate provides:
//! - Motion synthesis: zoom/pan/colour plans derived from named presets
//! - Text layout and SVG rasterization of overlay bands
//! - A typed filter graph and expression language rendered to FFmpeg syntax
//! - Adapters for probing (`ffprobe`) and encoding (`ffmpeg`) with progress,
//!   cancellation and timeouts

pub mod command;
pub mod compose;
pub mod encoder;
pub mod error;
pub mod expr;
pub mod fs_utils;
pub mod graph;
pub mod layout;
pub mod motion;
pub mod probe;
pub mod progress;
pub mod raster;
pub mod thumbnail;

pub use command::{FfmpegCommand, FfmpegInput, FfmpegRunner};
pub use compose::{
    compose, compose_motion, compose_solid, render, resolve_target_canvas, AudioMap, AudioTrack,
    Composition, CompositionSpec, OverlayLayer, VisibilityWindow,
};
pub use encoder::{EncodeControl, EncodeSession, Encoder, FfmpegEncoder};
pub use error::{MediaError, MediaResult};
pub use layout::{layout, TextBlock};
pub use motion::{synthesize, synthesize_for, MotionPlan, MotionPreset, MotionStage};
pub use probe::{probe_media, FfprobeProbe, MediaProbe};
pub use progress::{FfmpegProgress, ProgressEvent, ProgressStream};
pub use raster::{Rasterizer, SvgRasterizer};
pub use thumbnail::{attach_cover_command, generate_thumbnail};
