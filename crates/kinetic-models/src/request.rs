//! Composition request: what a job renders.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use validator::{Validate, ValidationErrors};

use crate::{EncodingConfig, LayoutStyle};

/// Default duration for still-image and solid-colour sources.
pub const DEFAULT_STILL_DURATION_SECS: f64 = 8.0;

/// Default mix weight of a background music track.
pub const DEFAULT_MUSIC_VOLUME: f32 = 0.3;

/// Where the moving picture comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceInput {
    /// Still image animated by the motion engine
    Image {
        path: PathBuf,
        /// Motion preset name; unknown names fall back to the default preset
        #[serde(default, skip_serializing_if = "Option::is_none")]
        preset: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_secs: Option<f64>,
    },
    /// Background video used as-is
    Video {
        path: PathBuf,
        /// Loop the video until a longer narration track ends
        #[serde(default)]
        loop_to_audio: bool,
    },
    /// Plain colour clip generated by the encoder
    Solid {
        #[serde(default = "default_solid_color")]
        color: String,
        width: u32,
        height: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_secs: Option<f64>,
    },
}

fn default_solid_color() -> String {
    "black".to_string()
}

impl SourceInput {
    /// Input file backing this source, if any.
    pub fn path(&self) -> Option<&Path> {
        match self {
            SourceInput::Image { path, .. } | SourceInput::Video { path, .. } => Some(path),
            SourceInput::Solid { .. } => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SourceInput::Image { .. } => "image",
            SourceInput::Video { .. } => "video",
            SourceInput::Solid { .. } => "solid",
        }
    }
}

/// Text and attribution drawn over the video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct TextOverlay {
    #[validate(length(min = 1, max = 2000))]
    pub text: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 300))]
    pub attribution: Option<String>,

    #[serde(default)]
    pub style: LayoutStyle,

    /// Show the overlay only during the last N seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 0.0))]
    pub visible_last_seconds: Option<f64>,

    /// Cross-fade the overlay in over this many seconds when it appears
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 0.0))]
    pub fade_in_secs: Option<f64>,
}

/// How an added audio track is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AudioRole {
    /// Played once; bounds the output duration
    #[default]
    Narration,
    /// Looped underneath the whole video
    BackgroundMusic,
}

/// Audio track merged into the output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct AudioInput {
    pub path: PathBuf,

    #[serde(default)]
    pub role: AudioRole,

    /// Mix weight of this track
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 0.0, max = 4.0))]
    pub volume: Option<f32>,
}

impl AudioInput {
    pub fn effective_volume(&self) -> f32 {
        self.volume.unwrap_or(match self.role {
            AudioRole::Narration => 1.0,
            AudioRole::BackgroundMusic => DEFAULT_MUSIC_VOLUME,
        })
    }
}

/// A full composition request handed to the job manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CompositionRequest {
    pub source: SourceInput,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<TextOverlay>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<AudioInput>,

    /// Render onto a 4K canvas matching the source orientation
    #[serde(default)]
    pub upscale: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<EncodingConfig>,

    /// PNG or JPEG embedded in the output as its cover art
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<PathBuf>,
}

impl CompositionRequest {
    pub fn new(source: SourceInput) -> Self {
        Self {
            source,
            text: None,
            audio: None,
            upscale: false,
            encoding: None,
            cover_image: None,
        }
    }

    pub fn with_text(mut self, text: TextOverlay) -> Self {
        self.text = Some(text);
        self
    }

    pub fn with_audio(mut self, audio: AudioInput) -> Self {
        self.audio = Some(audio);
        self
    }

    pub fn with_upscale(mut self, upscale: bool) -> Self {
        self.upscale = upscale;
        self
    }

    pub fn with_cover_image(mut self, path: impl Into<PathBuf>) -> Self {
        self.cover_image = Some(path.into());
        self
    }

    /// Validate field constraints of the nested parts.
    pub fn validate_fields(&self) -> Result<(), ValidationErrors> {
        if let Some(text) = &self.text {
            text.validate()?;
        }
        if let Some(audio) = &self.audio {
            audio.validate()?;
        }
        Ok(())
    }

    /// All input files the request references.
    pub fn input_paths(&self) -> Vec<&Path> {
        let mut paths = Vec::new();
        if let Some(path) = self.source.path() {
            paths.push(path);
        }
        if let Some(audio) = &self.audio {
            paths.push(audio.path.as_path());
        }
        if let Some(cover) = &self.cover_image {
            paths.push(cover.as_path());
        }
        paths
    }
}
