//! Canvas geometry and probed media descriptors.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Default vertical canvas used when nothing better is known.
pub const DEFAULT_CANVAS: Canvas = Canvas::new(1080, 1920);

/// 4K portrait canvas used by the upscale option.
pub const UHD_PORTRAIT: Canvas = Canvas::new(2160, 3840);

/// 4K landscape canvas used by the upscale option.
pub const UHD_LANDSCAPE: Canvas = Canvas::new(3840, 2160);

/// Pixel dimensions of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
}

/// Aspect orientation of a canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    Portrait,
    Landscape,
}

impl Canvas {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Square frames count as portrait.
    pub fn orientation(&self) -> Orientation {
        if self.width > self.height {
            Orientation::Landscape
        } else {
            Orientation::Portrait
        }
    }

    /// Round both dimensions up to the next even value (required by 4:2:0 output).
    pub fn even(&self) -> Self {
        Self::new(self.width + self.width % 2, self.height + self.height % 2)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl Default for Canvas {
    fn default() -> Self {
        DEFAULT_CANVAS
    }
}

impl fmt::Display for Canvas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Probed description of a media file. Read-only once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MediaDescriptor {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    /// Duration in seconds (0 for still images)
    pub duration_secs: f64,
    /// Frame rate of the first video stream, if any
    pub fps: f64,
    /// Whether the container carries an audio stream
    pub has_audio: bool,
}

impl MediaDescriptor {
    pub fn canvas(&self) -> Canvas {
        Canvas::new(self.width, self.height)
    }

    /// Audio-only files probe with zero dimensions.
    pub fn has_video(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}
