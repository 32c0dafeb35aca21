//! Filter-graph compositor.
//!
//! Builds a [`CompositionSpec`] (inputs, typed filter graph, output
//! options) and hands it to an [`Encoder`]. Nothing here spawns a process
//! until [`render`] is called.
//!
//! Layer order for an overlaid composition:
//! 1. a solid background canvas at target size,
//! 2. the source scaled and padded to fit below the band offset,
//! 3. the rasterized overlay at the origin, optionally time-gated.

use futures_util::StreamExt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use kinetic_models::canvas::{UHD_LANDSCAPE, UHD_PORTRAIT};
use kinetic_models::{AudioRole, Canvas, EncodingConfig, MediaDescriptor, Orientation};

use crate::command::{FfmpegCommand, FfmpegInput};
use crate::encoder::{EncodeControl, Encoder};
use crate::error::{MediaError, MediaResult};
use crate::expr::{Expr, Var};
use crate::fs_utils::{move_file, remove_if_exists};
use crate::graph::{Filter, FilterChain, FilterGraph, Pad};
use crate::layout::TextBlock;
use crate::motion::{MotionPlan, MotionStage, SEPIA_MATRIX};
use crate::progress::ProgressEvent;

const VIDEO_OUT: &str = "vout";
const AUDIO_OUT: &str = "aout";

/// Pick the output canvas.
///
/// Without upscale the (even-rounded) source size is kept. With upscale a
/// 4K canvas matching the source orientation is used.
pub fn resolve_target_canvas(source: Canvas, upscale: bool) -> Canvas {
    if !upscale {
        return source.even();
    }
    match source.orientation() {
        Orientation::Portrait => UHD_PORTRAIT,
        Orientation::Landscape => UHD_LANDSCAPE,
    }
}

/// Rasterized overlay image covering the whole target canvas.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayLayer {
    pub image: PathBuf,
    /// Source content starts this many pixels from the top
    pub offset: u32,
}

impl OverlayLayer {
    /// Overlay for a laid-out block; opaque bands push the source down.
    pub fn for_block(image: impl Into<PathBuf>, block: &TextBlock) -> Self {
        Self {
            image: image.into(),
            offset: block.content_offset(),
        }
    }
}

/// Show the overlay only during the last `last_seconds`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisibilityWindow {
    pub last_seconds: f64,
    /// Without a fade the overlay switches on as a step
    pub fade_in_secs: Option<f64>,
}

impl VisibilityWindow {
    pub fn start_time(&self, total_duration: f64) -> f64 {
        (total_duration - self.last_seconds).max(0.0)
    }
}

/// Audio track merged into the output.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioTrack {
    pub path: PathBuf,
    pub role: AudioRole,
    /// Mix weight
    pub volume: f32,
    /// Probed length; 0 when unknown
    pub duration_secs: f64,
}

/// How the output's audio is produced.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioMap {
    None,
    /// Output of a filter chain
    Label(String),
    /// Audio stream of input `n`, unfiltered
    Stream(usize),
}

/// Everything needed to compose a source video into the final output.
#[derive(Debug, Clone)]
pub struct Composition {
    pub source: MediaDescriptor,
    pub target: Canvas,
    pub overlay: Option<OverlayLayer>,
    pub visibility: Option<VisibilityWindow>,
    pub audio: Option<AudioTrack>,
    /// Loop the source video to the length of a narration track
    pub loop_to_audio: bool,
    pub background: String,
    pub frame_rate: u32,
    pub encoding: EncodingConfig,
}

impl Composition {
    pub fn new(source: MediaDescriptor, target: Canvas) -> Self {
        Self {
            source,
            target,
            overlay: None,
            visibility: None,
            audio: None,
            loop_to_audio: false,
            background: "black".to_string(),
            frame_rate: kinetic_models::encoding::DEFAULT_FRAME_RATE,
            encoding: EncodingConfig::default(),
        }
    }

    pub fn with_overlay(mut self, overlay: OverlayLayer) -> Self {
        self.overlay = Some(overlay);
        self
    }

    pub fn with_visibility(mut self, visibility: VisibilityWindow) -> Self {
        self.visibility = Some(visibility);
        self
    }

    pub fn with_audio(mut self, audio: AudioTrack) -> Self {
        self.audio = Some(audio);
        self
    }

    pub fn with_encoding(mut self, encoding: EncodingConfig) -> Self {
        self.encoding = encoding;
        self
    }

    /// Output length after applying the audio policy.
    pub fn output_duration(&self) -> f64 {
        let video = self.source.duration_secs;
        match &self.audio {
            Some(track) if track.role == AudioRole::Narration && track.duration_secs > 0.0 => {
                if self.loop_to_audio {
                    track.duration_secs
                } else {
                    video.min(track.duration_secs)
                }
            }
            _ => video,
        }
    }
}

/// A ready-to-run composition. Consumed once by an [`Encoder`].
#[derive(Debug, Clone)]
pub struct CompositionSpec {
    pub source_canvas: Canvas,
    pub target_canvas: Canvas,
    pub inputs: Vec<FfmpegInput>,
    pub graph: FilterGraph,
    pub video_out: String,
    pub audio: AudioMap,
    pub duration_secs: f64,
    pub frame_rate: Option<u32>,
    pub encoding: EncodingConfig,
    pub overlay_image: Option<PathBuf>,
    /// Time the overlay becomes visible, when gated
    pub visibility_start: Option<f64>,
    /// Vertical offset of the source below the band
    pub band_offset: u32,
}

impl CompositionSpec {
    pub fn has_audio(&self) -> bool {
        self.audio != AudioMap::None
    }

    /// Encoder command writing to `output`.
    pub fn to_command(&self, output: impl AsRef<Path>) -> FfmpegCommand {
        let mut cmd = FfmpegCommand::new(output);
        for input in &self.inputs {
            cmd = cmd.input(input.clone());
        }

        cmd = cmd
            .filter_complex(self.graph.render())
            .map(format!("[{}]", self.video_out));

        cmd = match &self.audio {
            AudioMap::None => cmd,
            AudioMap::Label(label) => cmd.map(format!("[{}]", label)),
            AudioMap::Stream(index) => cmd.map(format!("{}:a", index)),
        };

        cmd = cmd
            .output_args(self.encoding.to_ffmpeg_args(self.has_audio()))
            .duration(self.duration_secs);

        match self.frame_rate {
            Some(fps) => cmd.output_arg("-r").output_arg(fps.to_string()),
            None => cmd,
        }
    }
}

/// Compose a source video with an optional overlay and audio track.
pub fn compose(composition: &Composition) -> MediaResult<CompositionSpec> {
    let source = &composition.source;
    if !source.has_video() {
        return Err(MediaError::InvalidVideo(format!(
            "{} has no video stream",
            source.path.display()
        )));
    }

    let target = composition.target.even();
    let duration = composition.output_duration();
    if !(duration.is_finite() && duration > 0.0) {
        return Err(MediaError::InvalidVideo(format!(
            "{} has no usable duration",
            source.path.display()
        )));
    }

    let fps = composition.frame_rate.max(1);
    let offset = composition
        .overlay
        .as_ref()
        .map(|o| o.offset.min(target.height.saturating_sub(2)))
        .unwrap_or(0);
    let offset = offset - offset % 2;
    let content_height = target.height - offset;

    let loop_video = composition.loop_to_audio
        && matches!(&composition.audio, Some(t) if t.role == AudioRole::Narration);
    let mut source_input = FfmpegInput::file(&source.path);
    if loop_video {
        source_input = source_input.looped();
    }
    let mut inputs = vec![source_input];
    let mut graph = FilterGraph::new();

    graph.push(
        FilterChain::new()
            .filter(
                Filter::new("color")
                    .arg("c", composition.background.as_str())
                    .arg("s", target.to_string())
                    .arg("r", fps)
                    .arg("d", duration),
            )
            .output("bg"),
    );

    let ow = || Expr::var(Var::OutputWidth);
    let oh = || Expr::var(Var::OutputHeight);
    let iw = || Expr::var(Var::InputWidth);
    let ih = || Expr::var(Var::InputHeight);

    graph.push(
        FilterChain::new()
            .input(Pad::video(0))
            .filter(
                Filter::new("scale")
                    .arg("w", target.width)
                    .arg("h", content_height)
                    .arg("force_original_aspect_ratio", "decrease")
                    .arg("flags", "lanczos"),
            )
            .filter(
                Filter::new("pad")
                    .arg("w", target.width)
                    .arg("h", content_height)
                    .arg("x", (ow() - iw()) / 2.0)
                    .arg("y", (oh() - ih()) / 2.0)
                    .arg("color", composition.background.as_str()),
            )
            .filter(Filter::new("setsar").arg("sar", 1u32))
            .output("src"),
    );

    let base_label = if composition.overlay.is_some() { "base" } else { VIDEO_OUT };
    graph.push(
        FilterChain::new()
            .input(Pad::label("bg"))
            .input(Pad::label("src"))
            .filter(
                Filter::new("overlay")
                    .arg("x", 0u32)
                    .arg("y", offset)
                    .arg("shortest", 1u32),
            )
            .output(base_label),
    );

    let mut visibility_start = None;
    if let Some(overlay) = &composition.overlay {
        let index = inputs.len();
        inputs.push(FfmpegInput::file(&overlay.image).still(fps));

        let mut overlay_chain = FilterChain::new()
            .input(Pad::video(index))
            .filter(Filter::new("format").arg("pix_fmts", "rgba"));

        let window = composition
            .visibility
            .map(|w| (w.start_time(duration), w.fade_in_secs.filter(|f| *f > 0.0)));
        if let Some((start, Some(fade))) = window {
            overlay_chain = overlay_chain.filter(
                Filter::new("fade")
                    .arg("t", "in")
                    .arg("st", start)
                    .arg("d", fade)
                    .arg("alpha", 1u32),
            );
        }
        graph.push(overlay_chain.output("ovl"));

        let mut place = Filter::new("overlay").arg("x", 0u32).arg("y", 0u32);
        if let Some((start, _)) = window {
            place = place.arg("enable", Expr::var(Var::Time).gte(Expr::c(start)));
            visibility_start = Some(start);
        }
        graph.push(
            FilterChain::new()
                .input(Pad::label("base"))
                .input(Pad::label("ovl"))
                .filter(place)
                .output(VIDEO_OUT),
        );
    }

    let audio = match &composition.audio {
        Some(track) => {
            let index = inputs.len();
            let mut input = FfmpegInput::file(&track.path);
            if track.role == AudioRole::BackgroundMusic {
                input = input.looped();
            }
            inputs.push(input);

            let weight = Filter::new("volume").arg("volume", f64::from(track.volume));
            if source.has_audio {
                graph.push(
                    FilterChain::new()
                        .input(Pad::audio(index))
                        .filter(weight)
                        .output("added"),
                );
                let mix_duration = match track.role {
                    AudioRole::BackgroundMusic => "first",
                    AudioRole::Narration => "longest",
                };
                graph.push(
                    FilterChain::new()
                        .input(Pad::audio(0))
                        .input(Pad::label("added"))
                        .filter(
                            Filter::new("amix")
                                .arg("inputs", 2u32)
                                .arg("duration", mix_duration)
                                .arg("dropout_transition", 0u32)
                                .arg("normalize", 0u32),
                        )
                        .output(AUDIO_OUT),
                );
            } else {
                graph.push(
                    FilterChain::new()
                        .input(Pad::audio(index))
                        .filter(weight)
                        .output(AUDIO_OUT),
                );
            }
            AudioMap::Label(AUDIO_OUT.to_string())
        }
        None if source.has_audio => AudioMap::Stream(0),
        None => AudioMap::None,
    };

    graph.validate(inputs.len())?;

    debug!(
        source = %source.canvas(),
        target = %target,
        duration,
        offset,
        "Composed filter graph"
    );

    Ok(CompositionSpec {
        source_canvas: source.canvas(),
        target_canvas: target,
        inputs,
        graph,
        video_out: VIDEO_OUT.to_string(),
        audio,
        duration_secs: duration,
        frame_rate: Some(fps),
        encoding: composition.encoding.clone(),
        overlay_image: composition.overlay.as_ref().map(|o| o.image.clone()),
        visibility_start,
        band_offset: offset,
    })
}

/// Compose a still image animated by a motion plan. The result has no audio.
pub fn compose_motion(
    image: impl AsRef<Path>,
    plan: &MotionPlan,
    encoding: &EncodingConfig,
) -> MediaResult<CompositionSpec> {
    let inputs = vec![FfmpegInput::file(image).still(plan.fps)];

    let mut chain = FilterChain::new().input(Pad::video(0));
    for stage in &plan.stages {
        chain = chain.filter(motion_filter(stage));
    }

    let mut graph = FilterGraph::new();
    graph.push(chain.output(VIDEO_OUT));
    graph.validate(inputs.len())?;

    Ok(CompositionSpec {
        source_canvas: plan.canvas,
        target_canvas: plan.canvas,
        inputs,
        graph,
        video_out: VIDEO_OUT.to_string(),
        audio: AudioMap::None,
        duration_secs: plan.duration_secs,
        frame_rate: Some(plan.fps),
        encoding: encoding.clone(),
        overlay_image: None,
        visibility_start: None,
        band_offset: 0,
    })
}

/// Encoder binding for one motion stage.
fn motion_filter(stage: &MotionStage) -> Filter {
    match stage {
        MotionStage::Crop { width, height } => Filter::new("crop")
            .arg("w", width.clone())
            .arg("h", height.clone()),
        MotionStage::Prescale { width } => Filter::new("scale").arg("w", *width).arg("h", -2i64),
        MotionStage::ZoomPan {
            zoom,
            x,
            y,
            width,
            height,
            fps,
        } => Filter::new("zoompan")
            .arg("z", zoom.clone())
            .arg("x", x.clone())
            .arg("y", y.clone())
            .arg("d", 1u32)
            .arg("s", format!("{}x{}", width, height))
            .arg("fps", *fps),
        MotionStage::Letterbox {
            width,
            height,
            y,
            color,
        } => Filter::new("pad")
            .arg("w", *width)
            .arg("h", *height)
            .arg("x", 0u32)
            .arg("y", *y)
            .arg("color", *color),
        MotionStage::Blur { sigma, until_secs } => Filter::new("gblur")
            .arg("sigma", *sigma)
            .arg("steps", 2u32)
            .arg(
                "enable",
                Expr::var(Var::Time).between(Expr::c(0.0), Expr::c(*until_secs)),
            ),
        MotionStage::FadeIn { duration_secs } => Filter::new("fade")
            .arg("t", "in")
            .arg("st", 0u32)
            .arg("d", *duration_secs),
        MotionStage::Grain { strength } => Filter::new("noise")
            .arg("c0s", *strength)
            .arg("c1s", *strength)
            .arg("c2s", *strength)
            .arg("allf", "t"),
        MotionStage::ColorGrade {
            contrast,
            saturation,
        } => Filter::new("eq")
            .arg("contrast", *contrast)
            .arg("saturation", *saturation),
        MotionStage::Sepia => {
            const KEYS: [&str; 9] = ["rr", "rg", "rb", "gr", "gg", "gb", "br", "bg", "bb"];
            KEYS.iter()
                .zip(SEPIA_MATRIX)
                .fold(Filter::new("colorchannelmixer"), |f, (k, v)| f.arg(*k, v))
        }
        MotionStage::Flicker { amplitude } => {
            let jitter = Expr::c(2.0) * Expr::Random(1) - 1.0;
            Filter::new("eq")
                .arg("gamma", Expr::c(1.0) + Expr::c(*amplitude) * jitter)
                .arg("eval", "frame")
        }
        MotionStage::Vignette { angle } => Filter::new("vignette").arg("angle", angle.clone()),
    }
}

/// Colour names and `#RRGGBB[@alpha]` forms; nothing that could break out
/// of a filter argument.
pub fn is_valid_color(color: &str) -> bool {
    !color.is_empty()
        && color
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '#' | '@' | '.'))
}

/// Plain colour clip with no input file.
pub fn compose_solid(
    color: &str,
    canvas: Canvas,
    duration_secs: f64,
    fps: u32,
    encoding: &EncodingConfig,
) -> MediaResult<CompositionSpec> {
    if !is_valid_color(color) {
        return Err(MediaError::InvalidVideo(format!("invalid colour '{}'", color)));
    }
    if canvas.is_empty() {
        return Err(MediaError::InvalidVideo(format!("invalid canvas {}", canvas)));
    }
    if !(duration_secs.is_finite() && duration_secs > 0.0) {
        return Err(MediaError::InvalidVideo("solid clip needs a positive duration".to_string()));
    }

    let canvas = canvas.even();
    let fps = fps.max(1);
    let source = Filter::new("color")
        .arg("c", color)
        .arg("s", canvas.to_string())
        .arg("r", fps);
    let inputs = vec![FfmpegInput::lavfi(source.to_string())];

    let mut graph = FilterGraph::new();
    graph.push(
        FilterChain::new()
            .input(Pad::video(0))
            .filter(Filter::new("format").arg("pix_fmts", encoding.pixel_format.as_str()))
            .output(VIDEO_OUT),
    );
    graph.validate(inputs.len())?;

    Ok(CompositionSpec {
        source_canvas: canvas,
        target_canvas: canvas,
        inputs,
        graph,
        video_out: VIDEO_OUT.to_string(),
        audio: AudioMap::None,
        duration_secs,
        frame_rate: Some(fps),
        encoding: encoding.clone(),
        overlay_image: None,
        visibility_start: None,
        band_offset: 0,
    })
}

/// Encode `spec` into `staging`, then move the result to `output`.
///
/// `on_progress` sees every progress event. On failure the staging file is
/// removed and `output` is left untouched.
pub async fn render<F>(
    encoder: &dyn Encoder,
    spec: &CompositionSpec,
    staging: &Path,
    output: &Path,
    control: EncodeControl,
    mut on_progress: F,
) -> MediaResult<PathBuf>
where
    F: FnMut(&ProgressEvent) + Send,
{
    let result = async {
        let mut session = encoder.start(spec, staging, control).await?;
        while let Some(event) = session.progress().next().await {
            on_progress(&event);
        }
        session.finish().await
    }
    .await;

    match result {
        Ok(written) => {
            move_file(&written, output).await?;
            info!(output = %output.display(), "Rendered composition");
            Ok(output.to_path_buf())
        }
        Err(e) => {
            remove_if_exists(staging).await;
            Err(e)
        }
    }
}
