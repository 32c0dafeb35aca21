//! Structured job logging.
//!
//! Every event for one job carries the same `job_id` and `source` fields,
//! so a single job can be followed through the log stream. Stage events add
//! `stage` and `progress`, completion adds the output geometry.

use std::path::Path;
use tracing::{error, info, warn, Span};

use kinetic_models::{Canvas, JobId};

/// Logger bound to one job.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: JobId,
    /// Source kind: "video", "image" or "solid"
    source: &'static str,
}

impl JobLogger {
    pub fn new(job_id: &JobId, source: &'static str) -> Self {
        Self {
            job_id: job_id.clone(),
            source,
        }
    }

    pub fn log_start(&self, upscale: bool) {
        info!(
            job_id = %self.job_id,
            source = self.source,
            upscale,
            "Job started"
        );
    }

    /// A step began at `progress` percent overall.
    pub fn log_stage(&self, stage: &str, progress: u8) {
        info!(
            job_id = %self.job_id,
            source = self.source,
            stage = %stage,
            progress,
            "Job stage"
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            job_id = %self.job_id,
            source = self.source,
            "Job warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            job_id = %self.job_id,
            source = self.source,
            "Job failed: {}", message
        );
    }

    pub fn log_completion(&self, output: &Path, canvas: Canvas, duration_secs: f64) {
        info!(
            job_id = %self.job_id,
            source = self.source,
            output = %output.display(),
            canvas = %canvas,
            duration_secs,
            "Job completed"
        );
    }

    /// Span wrapping the whole worker task for this job.
    pub fn create_span(&self) -> Span {
        tracing::info_span!("job", job_id = %self.job_id, source = self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).to_string()
        }
    }

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Captured {
        type Writer = Captured;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn capture(f: impl FnOnce()) -> String {
        let captured = Captured::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(captured.clone())
            .with_ansi(false)
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        captured.text()
    }

    #[test]
    fn test_stage_events_carry_job_fields() {
        let job_id = JobId::new();
        let out = capture(|| {
            JobLogger::new(&job_id, "image").log_stage("motion", 15);
        });

        assert!(out.contains(&format!("job_id={}", job_id)), "{}", out);
        assert!(out.contains("source=\"image\""), "{}", out);
        assert!(out.contains("stage=motion"), "{}", out);
        assert!(out.contains("progress=15"), "{}", out);
    }

    #[test]
    fn test_completion_records_output_geometry() {
        let job_id = JobId::new();
        let out = capture(|| {
            JobLogger::new(&job_id, "video").log_completion(
                Path::new("/out/a.mp4"),
                Canvas::new(1080, 1920),
                12.5,
            );
        });

        assert!(out.contains("Job completed"), "{}", out);
        assert!(out.contains("output=/out/a.mp4"), "{}", out);
        assert!(out.contains("canvas=1080x1920"), "{}", out);
        assert!(out.contains("duration_secs=12.5"), "{}", out);
    }
}
