//! One full traversal: probe, motion or layout, rasterize, compose, encode,
//! then optional cover art.

use chrono::Utc;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tempfile::TempDir;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use kinetic_media::compose::{
    compose, compose_motion, compose_solid, render, resolve_target_canvas, AudioTrack,
    Composition, CompositionSpec, OverlayLayer, VisibilityWindow,
};
use kinetic_media::layout::{layout, split_attribution, TextBlock};
use kinetic_media::motion::{synthesize_for, MotionPreset};
use kinetic_media::fs_utils::move_file;
use kinetic_media::{
    generate_thumbnail, EncodeControl, Encoder, MediaError, MediaProbe, Rasterizer,
};
use kinetic_models::request::DEFAULT_STILL_DURATION_SECS;
use kinetic_models::{
    Canvas, CompositionRequest, EncodingConfig, JobId, LayoutStyle, MediaDescriptor, SourceInput,
    TextOverlay,
};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;

/// Progress share reserved for the steps before the final encode.
const PREPARE_SHARE: u8 = 15;
/// Progress share of the motion/solid pre-render, when there is one.
const SOURCE_RENDER_SHARE: u8 = 30;

/// Stage and overall progress of a running job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageUpdate {
    pub step: &'static str,
    pub progress: u8,
}

/// What a finished pipeline produced.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub output_path: PathBuf,
    pub target_canvas: Canvas,
    pub text_block: Option<TextBlock>,
    pub duration_secs: f64,
}

/// Reproducibility record written next to an output.
#[derive(Debug, Serialize)]
struct Sidecar<'a> {
    job_id: &'a JobId,
    output_filename: String,
    source_kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    motion_preset: Option<MotionPreset>,
    #[serde(skip_serializing_if = "Option::is_none")]
    style: Option<LayoutStyle>,
    source_canvas: Canvas,
    target_canvas: Canvas,
    duration_secs: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    layout: Option<&'a TextBlock>,
    created_at: chrono::DateTime<Utc>,
}

/// The composition pipeline with its external adapters.
#[derive(Clone)]
pub struct Pipeline {
    config: WorkerConfig,
    probe: Arc<dyn MediaProbe>,
    rasterizer: Arc<dyn Rasterizer>,
    encoder: Arc<dyn Encoder>,
}

/// Per-run state threaded through the steps.
struct RunContext<'a> {
    job_id: &'a JobId,
    logger: JobLogger,
    updates: mpsc::UnboundedSender<StageUpdate>,
    cancel: watch::Receiver<bool>,
    temp: TempDir,
    encoding: EncodingConfig,
}

impl RunContext<'_> {
    fn report(&self, step: &'static str, progress: u8) {
        self.logger.log_stage(step, progress);
        let _ = self.updates.send(StageUpdate { step, progress });
    }

    fn ensure_active(&self) -> WorkerResult<()> {
        if *self.cancel.borrow() {
            return Err(MediaError::Cancelled.into());
        }
        Ok(())
    }

    fn control(&self, timeout: std::time::Duration) -> EncodeControl {
        EncodeControl::default()
            .with_cancel(self.cancel.clone())
            .with_timeout(timeout)
    }
}

impl Pipeline {
    pub fn new(
        config: WorkerConfig,
        probe: Arc<dyn MediaProbe>,
        rasterizer: Arc<dyn Rasterizer>,
        encoder: Arc<dyn Encoder>,
    ) -> Self {
        Self {
            config,
            probe,
            rasterizer,
            encoder,
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Final output location for a job.
    pub fn output_path(&self, job_id: &JobId) -> PathBuf {
        self.config.output_dir.join(format!("{}.mp4", job_id))
    }

    /// Run the pipeline for one job.
    ///
    /// Intermediates live in a per-job directory under the work dir that is
    /// removed on every exit path. Nothing is written to the output
    /// location unless the final encode, and the cover remux when a cover
    /// is given, succeed.
    pub async fn run(
        &self,
        job_id: &JobId,
        request: &CompositionRequest,
        updates: mpsc::UnboundedSender<StageUpdate>,
        cancel: watch::Receiver<bool>,
    ) -> WorkerResult<PipelineOutput> {
        tokio::fs::create_dir_all(&self.config.work_dir).await?;
        let temp = tempfile::Builder::new()
            .prefix(&format!("{}-", job_id))
            .tempdir_in(&self.config.work_dir)?;

        let ctx = RunContext {
            job_id,
            logger: JobLogger::new(job_id, request.source.kind()),
            updates,
            cancel,
            temp,
            encoding: request.encoding.clone().unwrap_or_default(),
        };

        let result = self.run_steps(&ctx, request).await;

        let temp_path = ctx.temp.path().to_path_buf();
        if let Err(e) = ctx.temp.close() {
            warn!(path = %temp_path.display(), "Failed to remove job work dir: {}", e);
        }

        result
    }

    async fn run_steps(
        &self,
        ctx: &RunContext<'_>,
        request: &CompositionRequest,
    ) -> WorkerResult<PipelineOutput> {
        ctx.logger.log_start(request.upscale);
        ctx.report("probing", 1);

        let (source, motion_preset) = self.prepare_source(ctx, request).await?;
        ctx.ensure_active()?;

        let target = resolve_target_canvas(source.canvas(), request.upscale);
        let mut composition = Composition::new(source.clone(), target)
            .with_encoding(ctx.encoding.clone());
        composition.frame_rate = self.config.frame_rate;

        let mut text_block = None;
        if let Some(text) = &request.text {
            ctx.report("layout", PREPARE_SHARE.saturating_sub(5));
            let block = layout_overlay(text, composition.target)?;
            ctx.ensure_active()?;

            ctx.report("rasterizing", PREPARE_SHARE.saturating_sub(3));
            let image = self.rasterize_overlay(ctx, &block).await?;
            composition = composition.with_overlay(OverlayLayer::for_block(image, &block));

            if let Some(last_seconds) = text.visible_last_seconds {
                composition = composition.with_visibility(VisibilityWindow {
                    last_seconds,
                    fade_in_secs: text.fade_in_secs,
                });
            }
            text_block = Some(block);
        }

        if let Some(audio) = &request.audio {
            let duration_secs = match self.probe.probe(&audio.path).await {
                Ok(desc) => desc.duration_secs,
                Err(e) => {
                    ctx.logger
                        .log_warning(&format!("audio probe failed, duration unknown: {}", e));
                    0.0
                }
            };
            composition = composition.with_audio(AudioTrack {
                path: audio.path.clone(),
                role: audio.role,
                volume: audio.effective_volume(),
                duration_secs,
            });
        }
        if let SourceInput::Video { loop_to_audio, .. } = &request.source {
            composition.loop_to_audio = *loop_to_audio;
        }

        let spec = compose(&composition)?;
        ctx.ensure_active()?;

        let start = if motion_preset.is_some() || matches!(request.source, SourceInput::Solid { .. }) {
            PREPARE_SHARE + SOURCE_RENDER_SHARE
        } else {
            PREPARE_SHARE
        };
        let output_path = self.output_path(ctx.job_id);
        match &request.cover_image {
            Some(cover) => {
                let composed = ctx.temp.path().join("composed.mp4");
                self.encode(ctx, "encoding", &spec, &composed, start, 98)
                    .await?;
                self.embed_cover(ctx, &composed, cover, &output_path).await?;
            }
            None => {
                self.encode(ctx, "encoding", &spec, &output_path, start, 99)
                    .await?
            }
        }

        self.write_artifacts(ctx, request, &source, &spec, &output_path, motion_preset, text_block.as_ref())
            .await;

        Ok(PipelineOutput {
            output_path,
            target_canvas: spec.target_canvas,
            text_block,
            duration_secs: spec.duration_secs,
        })
    }

    /// Resolve the source into a video file with known geometry.
    async fn prepare_source(
        &self,
        ctx: &RunContext<'_>,
        request: &CompositionRequest,
    ) -> WorkerResult<(MediaDescriptor, Option<MotionPreset>)> {
        match &request.source {
            SourceInput::Video { path, .. } => {
                let desc = self.probe.probe(path).await?;
                debug!(
                    width = desc.width,
                    height = desc.height,
                    duration = desc.duration_secs,
                    "Probed source video"
                );
                Ok((desc, None))
            }
            SourceInput::Image {
                path,
                preset,
                duration_secs,
            } => {
                let preset = MotionPreset::from_name(preset.as_deref().unwrap_or_default());
                let plan = synthesize_for(
                    duration_secs.unwrap_or(DEFAULT_STILL_DURATION_SECS),
                    preset,
                    Canvas::default(),
                    self.config.frame_rate,
                );
                debug!(
                    preset = %preset,
                    duration = plan.duration_secs,
                    frames = plan.total_frames,
                    "Synthesized motion plan"
                );

                let spec = compose_motion(path, &plan, &ctx.encoding)?;
                let clip = ctx.temp.path().join("motion.mp4");
                self.encode(ctx, "motion", &spec, &clip, PREPARE_SHARE, PREPARE_SHARE + SOURCE_RENDER_SHARE)
                    .await?;

                Ok((rendered_descriptor(clip, &spec), Some(preset)))
            }
            SourceInput::Solid {
                color,
                width,
                height,
                duration_secs,
            } => {
                let spec = compose_solid(
                    color,
                    Canvas::new(*width, *height),
                    duration_secs.unwrap_or(DEFAULT_STILL_DURATION_SECS),
                    self.config.frame_rate,
                    &ctx.encoding,
                )?;
                let clip = ctx.temp.path().join("solid.mp4");
                self.encode(ctx, "solid", &spec, &clip, PREPARE_SHARE, PREPARE_SHARE + SOURCE_RENDER_SHARE)
                    .await?;

                Ok((rendered_descriptor(clip, &spec), None))
            }
        }
    }

    async fn rasterize_overlay(&self, ctx: &RunContext<'_>, block: &TextBlock) -> WorkerResult<PathBuf> {
        let markup = block.to_svg();
        let canvas = block.canvas;
        let rasterizer = Arc::clone(&self.rasterizer);

        let png = tokio::task::spawn_blocking(move || {
            rasterizer.rasterize(&markup, canvas.width, canvas.height)
        })
        .await
        .map_err(|e| WorkerError::internal(format!("rasterizer task failed: {}", e)))??;

        let path = ctx.temp.path().join("overlay.png");
        tokio::fs::write(&path, png).await?;
        debug!(
            lines = block.lines.len(),
            font_size = block.font_size,
            band = block.header_band_height,
            "Rasterized overlay"
        );
        Ok(path)
    }

    /// Encode `spec` to `output`, mapping encoder progress onto `[from, to]`.
    async fn encode(
        &self,
        ctx: &RunContext<'_>,
        stage: &'static str,
        spec: &CompositionSpec,
        output: &Path,
        from: u8,
        to: u8,
    ) -> WorkerResult<()> {
        ctx.ensure_active()?;
        ctx.report(stage, from);

        let staging = ctx.temp.path().join(format!("{}.partial.mp4", stage));
        let started = Instant::now();
        let span = f64::from(to.saturating_sub(from));
        let updates = ctx.updates.clone();

        render(
            self.encoder.as_ref(),
            spec,
            &staging,
            output,
            ctx.control(self.config.encode_timeout),
            move |event| {
                let progress = from + (span * f64::from(event.percent) / 100.0).round() as u8;
                let _ = updates.send(StageUpdate {
                    step: stage,
                    progress,
                });
            },
        )
        .await?;

        let elapsed = started.elapsed().as_secs_f64();
        metrics::record_encode_duration(stage, elapsed);
        info!(stage, elapsed_secs = elapsed, "Encode finished");
        Ok(())
    }

    /// Remux `video` with `cover` attached, then publish it at `output`.
    async fn embed_cover(
        &self,
        ctx: &RunContext<'_>,
        video: &Path,
        cover: &Path,
        output: &Path,
    ) -> WorkerResult<()> {
        ctx.ensure_active()?;
        ctx.report("cover", 99);

        let staging = ctx.temp.path().join("cover.partial.mp4");
        let written = self
            .encoder
            .attach_cover(video, cover, &staging, ctx.control(self.config.encode_timeout))
            .await?;
        move_file(&written, output).await?;
        debug!(cover = %cover.display(), "Embedded cover image");
        Ok(())
    }

    /// Optional sidecar, and a frame-grab thumbnail when no cover was
    /// embedded. Failures only warn.
    #[allow(clippy::too_many_arguments)]
    async fn write_artifacts(
        &self,
        ctx: &RunContext<'_>,
        request: &CompositionRequest,
        source: &MediaDescriptor,
        spec: &CompositionSpec,
        output_path: &Path,
        motion_preset: Option<MotionPreset>,
        text_block: Option<&TextBlock>,
    ) {
        if self.config.write_sidecar {
            let sidecar = Sidecar {
                job_id: ctx.job_id,
                output_filename: output_path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default(),
                source_kind: request.source.kind(),
                motion_preset,
                style: request.text.as_ref().map(|t| t.style),
                source_canvas: source.canvas(),
                target_canvas: spec.target_canvas,
                duration_secs: spec.duration_secs,
                layout: text_block,
                created_at: Utc::now(),
            };
            let path = output_path.with_extension("json");
            let written = match serde_json::to_vec_pretty(&sidecar) {
                Ok(bytes) => tokio::fs::write(&path, bytes).await.map_err(WorkerError::from),
                Err(e) => Err(e.into()),
            };
            if let Err(e) = written {
                ctx.logger.log_warning(&format!("failed to write sidecar: {}", e));
            }
        }

        if self.config.generate_thumbnail && request.cover_image.is_none() {
            let thumb = output_path.with_extension("jpg");
            if let Err(e) = generate_thumbnail(output_path, &thumb).await {
                ctx.logger.log_warning(&format!("failed to generate thumbnail: {}", e));
            }
        }
    }
}

/// Lay out a text overlay, splitting "quote - source" when no attribution is given.
fn layout_overlay(text: &TextOverlay, canvas: Canvas) -> WorkerResult<TextBlock> {
    let (body, attribution) = match &text.attribution {
        Some(a) => (text.text.clone(), Some(a.clone())),
        None => split_attribution(&text.text),
    };
    Ok(layout(
        &body,
        attribution.as_deref(),
        text.style,
        canvas.width,
        canvas.height,
    )?)
}

fn rendered_descriptor(path: PathBuf, spec: &CompositionSpec) -> MediaDescriptor {
    MediaDescriptor {
        path,
        width: spec.target_canvas.width,
        height: spec.target_canvas.height,
        duration_secs: spec.duration_secs,
        fps: spec.frame_rate.map(f64::from).unwrap_or_default(),
        has_audio: false,
    }
}
