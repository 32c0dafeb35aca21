//! FFmpeg progress parsing and the progress event stream.

use futures_util::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// Raw progress state accumulated from FFmpeg's `-progress` output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FfmpegProgress {
    /// Current frame number
    pub frame: u64,
    /// Current FPS
    pub fps: f64,
    /// Output time in milliseconds
    pub out_time_ms: i64,
    /// Output time as string (HH:MM:SS.microseconds)
    pub out_time: String,
    /// Encoding speed (e.g., 1.5 = 1.5x realtime)
    pub speed: f64,
    /// Whether encoding is complete
    pub is_complete: bool,
}

impl FfmpegProgress {
    /// Calculate progress percentage given total duration in milliseconds.
    pub fn percentage(&self, total_duration_ms: i64) -> f64 {
        if self.is_complete {
            return 100.0;
        }
        if total_duration_ms <= 0 {
            return 0.0;
        }
        ((self.out_time_ms as f64 / total_duration_ms as f64) * 100.0).clamp(0.0, 100.0)
    }

    /// Estimate time remaining in seconds.
    pub fn eta_seconds(&self, total_duration_ms: i64) -> Option<f64> {
        if self.speed <= 0.0 || self.out_time_ms <= 0 {
            return None;
        }

        let remaining_ms = total_duration_ms - self.out_time_ms;
        if remaining_ms <= 0 {
            return Some(0.0);
        }

        Some((remaining_ms as f64 / 1000.0) / self.speed)
    }
}

/// Parse one line of `-progress` output into `current`.
///
/// Returns a snapshot at the end of each block (`progress=continue|end`).
pub fn parse_progress_line(line: &str, current: &mut FfmpegProgress) -> Option<FfmpegProgress> {
    let (key, value) = line.trim().split_once('=')?;

    match key {
        "out_time_ms" | "out_time_us" => {
            // FFmpeg reports microseconds under both keys
            if let Ok(us) = value.parse::<i64>() {
                current.out_time_ms = us / 1000;
            }
        }
        "out_time" => {
            current.out_time = value.to_string();
        }
        "frame" => {
            if let Ok(frame) = value.parse() {
                current.frame = frame;
            }
        }
        "fps" => {
            if let Ok(fps) = value.parse() {
                current.fps = fps;
            }
        }
        "speed" => {
            if let Some(speed) = value.trim().strip_suffix('x').and_then(|s| s.parse().ok()) {
                current.speed = speed;
            }
        }
        "progress" => {
            if value == "end" {
                current.is_complete = true;
            }
            return Some(current.clone());
        }
        _ => {}
    }

    None
}

/// A percent-complete tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    /// 0-100
    pub percent: u8,
    pub out_time_ms: i64,
    pub speed: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta_secs: Option<f64>,
    pub is_complete: bool,
}

impl ProgressEvent {
    pub fn from_progress(progress: &FfmpegProgress, total_duration_ms: i64) -> Self {
        Self {
            percent: progress.percentage(total_duration_ms).floor() as u8,
            out_time_ms: progress.out_time_ms,
            speed: progress.speed,
            eta_secs: progress.eta_seconds(total_duration_ms),
            is_complete: progress.is_complete,
        }
    }
}

/// Finite stream of progress events for one encode.
///
/// Ends when the encoder exits. Consumed once; not restartable.
pub struct ProgressStream {
    rx: mpsc::Receiver<FfmpegProgress>,
    total_duration_ms: i64,
}

impl ProgressStream {
    pub fn new(rx: mpsc::Receiver<FfmpegProgress>, total_duration_ms: i64) -> Self {
        Self {
            rx,
            total_duration_ms,
        }
    }

    /// Create a sender/stream pair.
    pub fn channel(total_duration_ms: i64) -> (mpsc::Sender<FfmpegProgress>, Self) {
        let (tx, rx) = mpsc::channel(64);
        (tx, Self::new(rx, total_duration_ms))
    }

    /// A stream that yields nothing.
    pub fn empty() -> Self {
        let (_tx, stream) = Self::channel(0);
        stream
    }
}

impl Stream for ProgressStream {
    type Item = ProgressEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let total = self.total_duration_ms;
        self.rx
            .poll_recv(cx)
            .map(|item| item.map(|p| ProgressEvent::from_progress(&p, total)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[test]
    fn test_progress_percentage() {
        let progress = FfmpegProgress {
            out_time_ms: 5000,
            ..Default::default()
        };

        assert!((progress.percentage(10000) - 50.0).abs() < 0.01);
        assert!((progress.percentage(5000) - 100.0).abs() < 0.01);
        assert!((progress.percentage(2000) - 100.0).abs() < 0.01);
    }

    #[test]
    fn test_eta_calculation() {
        let progress = FfmpegProgress {
            out_time_ms: 5000,
            speed: 2.0,
            ..Default::default()
        };

        // 5 seconds remaining at 2x speed
        let eta = progress.eta_seconds(10000).unwrap();
        assert!((eta - 2.5).abs() < 0.01);
    }

    #[test]
    fn test_progress_parsing() {
        let mut progress = FfmpegProgress::default();

        assert!(parse_progress_line("out_time_us=5000000", &mut progress).is_none());
        assert_eq!(progress.out_time_ms, 5000);

        parse_progress_line("speed= 1.5x", &mut progress);
        assert!((progress.speed - 1.5).abs() < 0.01);
        parse_progress_line("speed=N/A", &mut progress);
        assert!((progress.speed - 1.5).abs() < 0.01);

        let snapshot = parse_progress_line("progress=continue", &mut progress).unwrap();
        assert!(!snapshot.is_complete);

        let result = parse_progress_line("progress=end", &mut progress);
        assert!(result.is_some());
        assert!(progress.is_complete);
        assert!(parse_progress_line("garbage", &mut progress).is_none());
    }

    #[tokio::test]
    async fn test_stream_is_finite() {
        let (tx, mut stream) = ProgressStream::channel(10_000);

        tx.send(FfmpegProgress {
            out_time_ms: 2500,
            ..Default::default()
        })
        .await
        .unwrap();
        tx.send(FfmpegProgress {
            out_time_ms: 10_000,
            is_complete: true,
            ..Default::default()
        })
        .await
        .unwrap();
        drop(tx);

        let first = stream.next().await.unwrap();
        assert_eq!(first.percent, 25);
        let last = stream.next().await.unwrap();
        assert_eq!(last.percent, 100);
        assert!(last.is_complete);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_empty_stream() {
        let mut stream = ProgressStream::empty();
        assert!(stream.next().await.is_none());
    }
}
