//! Encoder adapter: runs a [`CompositionSpec`] and streams progress.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::command::{check_ffmpeg, FfmpegRunner};
use crate::compose::CompositionSpec;
use crate::error::{MediaError, MediaResult};
use crate::progress::ProgressStream;
use crate::thumbnail::attach_cover_command;

/// Cancellation and timeout applied to one encode.
#[derive(Debug, Clone, Default)]
pub struct EncodeControl {
    /// Flipping the value to `true` kills the encoder
    pub cancel: Option<watch::Receiver<bool>>,
    pub timeout: Option<Duration>,
}

impl EncodeControl {
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// A zero duration disables the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }
}

/// A running encode.
///
/// Drain [`EncodeSession::progress`] while waiting, then call
/// [`EncodeSession::finish`] for the outcome.
pub struct EncodeSession {
    progress: ProgressStream,
    completion: JoinHandle<MediaResult<PathBuf>>,
}

impl EncodeSession {
    pub fn new(progress: ProgressStream, completion: JoinHandle<MediaResult<PathBuf>>) -> Self {
        Self {
            progress,
            completion,
        }
    }

    /// Progress events; the stream ends when the encoder exits.
    pub fn progress(&mut self) -> &mut ProgressStream {
        &mut self.progress
    }

    /// Wait for the encoder and return the written path.
    pub async fn finish(self) -> MediaResult<PathBuf> {
        drop(self.progress);
        match self.completion.await {
            Ok(result) => result,
            Err(e) => Err(MediaError::internal(format!("encoder task failed: {}", e))),
        }
    }
}

/// Renders a composition to a file.
#[async_trait]
pub trait Encoder: Send + Sync {
    /// Start encoding `spec` into `output`.
    ///
    /// Fails with [`MediaError::FfmpegFailed`] carrying the encoder's
    /// stderr on a non-zero exit.
    async fn start(
        &self,
        spec: &CompositionSpec,
        output: &Path,
        control: EncodeControl,
    ) -> MediaResult<EncodeSession>;

    /// Copy `video` into `output` with `cover` attached as cover art.
    async fn attach_cover(
        &self,
        video: &Path,
        cover: &Path,
        output: &Path,
        control: EncodeControl,
    ) -> MediaResult<PathBuf>;
}

/// [`Encoder`] backed by the `ffmpeg` binary.
#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegEncoder;

#[async_trait]
impl Encoder for FfmpegEncoder {
    async fn start(
        &self,
        spec: &CompositionSpec,
        output: &Path,
        control: EncodeControl,
    ) -> MediaResult<EncodeSession> {
        check_ffmpeg()?;

        let cmd = spec.to_command(output);
        let total_ms = (spec.duration_secs * 1000.0).round() as i64;
        let (tx, progress) = ProgressStream::channel(total_ms);

        let runner = runner_for(control);

        debug!(
            output = %output.display(),
            target = %spec.target_canvas,
            duration = spec.duration_secs,
            "Starting encode"
        );

        let output = output.to_path_buf();
        let completion = tokio::spawn(async move {
            runner.run_with_progress(&cmd, Some(tx)).await?;
            Ok(output)
        });

        Ok(EncodeSession::new(progress, completion))
    }

    async fn attach_cover(
        &self,
        video: &Path,
        cover: &Path,
        output: &Path,
        control: EncodeControl,
    ) -> MediaResult<PathBuf> {
        check_ffmpeg()?;
        debug!(cover = %cover.display(), output = %output.display(), "Attaching cover");
        runner_for(control)
            .run(&attach_cover_command(video, cover, output))
            .await?;
        Ok(output.to_path_buf())
    }
}

fn runner_for(control: EncodeControl) -> FfmpegRunner {
    let mut runner = FfmpegRunner::new();
    if let Some(cancel) = control.cancel {
        runner = runner.with_cancel(cancel);
    }
    if let Some(timeout) = control.timeout {
        runner = runner.with_timeout(timeout);
    }
    runner
}
