//! FFmpeg command builder and runner.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::error::{MediaError, MediaResult};
use crate::progress::{parse_progress_line, FfmpegProgress};

/// Stderr lines kept for failure diagnostics.
const STDERR_TAIL_LINES: usize = 40;

/// Where an input's frames come from.
#[derive(Debug, Clone, PartialEq)]
pub enum InputSource {
    File(PathBuf),
    /// libavfilter source graph, e.g. `color=c=black:s=1080x1920`
    Lavfi(String),
}

/// One `-i` input with its per-input options.
#[derive(Debug, Clone, PartialEq)]
pub struct FfmpegInput {
    pub source: InputSource,
    /// Options placed before `-i`
    pub args: Vec<String>,
}

impl FfmpegInput {
    pub fn file(path: impl AsRef<Path>) -> Self {
        Self {
            source: InputSource::File(path.as_ref().to_path_buf()),
            args: Vec::new(),
        }
    }

    pub fn lavfi(graph: impl Into<String>) -> Self {
        Self {
            source: InputSource::Lavfi(graph.into()),
            args: vec!["-f".to_string(), "lavfi".to_string()],
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Repeat the input forever (`-stream_loop -1`).
    pub fn looped(self) -> Self {
        self.arg("-stream_loop").arg("-1")
    }

    /// Treat a still image as an endless frame sequence.
    pub fn still(self, fps: u32) -> Self {
        self.arg("-loop").arg("1").arg("-framerate").arg(fps.to_string())
    }

    pub fn seek(self, timestamp: impl Into<String>) -> Self {
        self.arg("-ss").arg(timestamp)
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.source {
            InputSource::File(path) => Some(path),
            InputSource::Lavfi(_) => None,
        }
    }
}

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    inputs: Vec<FfmpegInput>,
    output: PathBuf,
    /// Output arguments (after all inputs)
    output_args: Vec<String>,
    overwrite: bool,
    log_level: String,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command writing to `output`.
    pub fn new(output: impl AsRef<Path>) -> Self {
        Self {
            inputs: Vec::new(),
            output: output.as_ref().to_path_buf(),
            output_args: Vec::new(),
            overwrite: true,
            log_level: "error".to_string(),
        }
    }

    pub fn input(mut self, input: FfmpegInput) -> Self {
        self.inputs.push(input);
        self
    }

    pub fn inputs(&self) -> &[FfmpegInput] {
        &self.inputs
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Add an output argument.
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Add multiple output arguments.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Limit output duration.
    pub fn duration(self, seconds: f64) -> Self {
        self.output_arg("-t").output_arg(format!("{:.3}", seconds))
    }

    /// Set video filter.
    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    /// Set filter complex.
    pub fn filter_complex(self, filter: impl Into<String>) -> Self {
        self.output_arg("-filter_complex").output_arg(filter)
    }

    pub fn map(self, stream: impl Into<String>) -> Self {
        self.output_arg("-map").output_arg(stream)
    }

    /// Extract single frame.
    pub fn single_frame(self) -> Self {
        self.output_arg("-frames:v").output_arg("1")
    }

    /// Set log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }

        args.push("-v".to_string());
        args.push(self.log_level.clone());
        args.push("-nostats".to_string());

        // Machine-readable progress on stdout, diagnostics stay on stderr
        args.push("-progress".to_string());
        args.push("pipe:1".to_string());

        for input in &self.inputs {
            args.extend(input.args.iter().cloned());
            args.push("-i".to_string());
            args.push(match &input.source {
                InputSource::File(path) => path.to_string_lossy().to_string(),
                InputSource::Lavfi(graph) => graph.clone(),
            });
        }

        args.extend(self.output_args.iter().cloned());
        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Runner for FFmpeg commands with progress tracking, cancellation and timeout.
#[derive(Debug, Clone, Default)]
pub struct FfmpegRunner {
    cancel_rx: Option<watch::Receiver<bool>>,
    timeout: Option<Duration>,
}

impl FfmpegRunner {
    /// Create a new runner.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set cancellation signal.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    /// Set timeout. A zero duration disables it.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    /// Run an FFmpeg command.
    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        self.run_with_progress(cmd, None).await
    }

    /// Run an FFmpeg command, sending progress snapshots to `progress_tx`.
    ///
    /// The sender is dropped when the process exits.
    pub async fn run_with_progress(
        &self,
        cmd: &FfmpegCommand,
        progress_tx: Option<mpsc::Sender<FfmpegProgress>>,
    ) -> MediaResult<()> {
        check_ffmpeg()?;

        let args = cmd.build_args();
        debug!("Running FFmpeg: ffmpeg {}", args.join(" "));

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::internal("ffmpeg stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::internal("ffmpeg stderr not captured"))?;

        let progress_handle = tokio::spawn(forward_progress(stdout, progress_tx));
        let stderr_handle = tokio::spawn(collect_tail(stderr, STDERR_TAIL_LINES));

        let cancel_rx = self.cancel_rx.clone();
        let outcome = tokio::select! {
            status = child.wait() => Ok(status?),
            _ = wait_cancelled(cancel_rx) => Err(MediaError::Cancelled),
            _ = wait_timeout(self.timeout) => Err(MediaError::Timeout(
                self.timeout.map(|t| t.as_secs()).unwrap_or_default(),
            )),
        };

        let status = match outcome {
            Ok(status) => status,
            Err(err) => {
                match &err {
                    MediaError::Cancelled => info!("FFmpeg cancelled, killing process"),
                    _ => warn!("FFmpeg timed out, killing process"),
                }
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill FFmpeg: {}", e);
                }
                progress_handle.abort();
                stderr_handle.abort();
                return Err(err);
            }
        };

        let _ = progress_handle.await;
        let stderr_tail = stderr_handle.await.unwrap_or_default();

        if status.success() {
            Ok(())
        } else {
            Err(MediaError::ffmpeg_failed(
                format!("FFmpeg exited with {}", status),
                (!stderr_tail.is_empty()).then_some(stderr_tail),
                status.code(),
            ))
        }
    }
}

async fn forward_progress<R>(stdout: R, progress_tx: Option<mpsc::Sender<FfmpegProgress>>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stdout).lines();
    let mut current = FfmpegProgress::default();

    while let Ok(Some(line)) = reader.next_line().await {
        if let Some(snapshot) = parse_progress_line(&line, &mut current) {
            if let Some(tx) = &progress_tx {
                // Never block the pipe on a slow or absent consumer
                let _ = tx.try_send(snapshot);
            }
        }
    }
}

async fn collect_tail<R>(stderr: R, max_lines: usize) -> String
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stderr).lines();
    let mut tail = VecDeque::with_capacity(max_lines);

    while let Ok(Some(line)) = reader.next_line().await {
        if tail.len() == max_lines {
            tail.pop_front();
        }
        tail.push_back(line);
    }

    tail.into_iter().collect::<Vec<_>>().join("\n")
}

async fn wait_cancelled(cancel_rx: Option<watch::Receiver<bool>>) {
    let Some(mut rx) = cancel_rx else {
        return std::future::pending().await;
    };
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            // Sender gone without cancelling
            return std::future::pending().await;
        }
    }
}

async fn wait_timeout(timeout: Option<Duration>) {
    match timeout {
        Some(timeout) => tokio::time::sleep(timeout).await,
        None => std::future::pending().await,
    }
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Check if FFprobe is available.
pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_builder() {
        let cmd = FfmpegCommand::new("output.mp4")
            .input(FfmpegInput::file("input.mp4").looped())
            .input(FfmpegInput::file("overlay.png").still(30))
            .filter_complex("[0:v][1:v]overlay[vout]")
            .map("[vout]")
            .duration(20.0);

        let args = cmd.build_args();
        let joined = args.join(" ");
        assert!(joined.starts_with("-y -v error -nostats -progress pipe:1"));
        assert!(joined.contains("-stream_loop -1 -i input.mp4"));
        assert!(joined.contains("-loop 1 -framerate 30 -i overlay.png"));
        assert!(joined.contains("-t 20.000"));
        assert_eq!(args.last().map(String::as_str), Some("output.mp4"));
    }

    #[test]
    fn test_lavfi_input() {
        let cmd = FfmpegCommand::new("out.mp4").input(FfmpegInput::lavfi("color=c=red:s=8x8"));
        let joined = cmd.build_args().join(" ");
        assert!(joined.contains("-f lavfi -i color=c=red:s=8x8"));
        assert!(cmd.inputs()[0].path().is_none());
    }

    #[test]
    fn test_zero_timeout_disables() {
        let runner = FfmpegRunner::new().with_timeout(Duration::ZERO);
        assert!(runner.timeout.is_none());
        let runner = FfmpegRunner::new().with_timeout(Duration::from_secs(5));
        assert_eq!(runner.timeout, Some(Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn test_wait_cancelled_fires() {
        let (tx, rx) = watch::channel(false);
        let waiter = tokio::spawn(wait_cancelled(Some(rx)));
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_collect_tail_keeps_last_lines() {
        let input: &[u8] = b"one\ntwo\nthree\nfour\n";
        let tail = collect_tail(input, 2).await;
        assert_eq!(tail, "three\nfour");
    }
}
