//! Job Lifecycle Manager.
//!
//! Owns the job table. Each accepted job runs on its own task once a slot
//! in the bounded pool frees up; only that task mutates the record after
//! creation, except for `cancel` failing a job that has not started.
//! Either way a job's inputs are removed before its terminal state is
//! published.

use chrono::Utc;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch, Mutex, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument};

use kinetic_media::compose::is_valid_color;
use kinetic_media::fs_utils::remove_if_exists;
use kinetic_media::layout::normalize_text;
use kinetic_models::{CompositionRequest, Job, JobId, JobState, SourceInput};

use crate::error::{WorkerError, WorkerResult, CANCELED_MESSAGE};
use crate::logging::JobLogger;
use crate::metrics;
use crate::pipeline::{Pipeline, StageUpdate};

/// Accepts composition requests and runs them asynchronously.
#[derive(Clone)]
pub struct JobManager {
    inner: Arc<Inner>,
}

struct Inner {
    pipeline: Pipeline,
    jobs: RwLock<HashMap<JobId, Job>>,
    cancels: Mutex<HashMap<JobId, watch::Sender<bool>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    job_semaphore: Arc<Semaphore>,
    shutting_down: AtomicBool,
}

impl JobManager {
    pub fn new(pipeline: Pipeline) -> Self {
        let permits = pipeline.config().max_concurrent_jobs.max(1);
        Self {
            inner: Arc::new(Inner {
                pipeline,
                jobs: RwLock::new(HashMap::new()),
                cancels: Mutex::new(HashMap::new()),
                tasks: Mutex::new(Vec::new()),
                job_semaphore: Arc::new(Semaphore::new(permits)),
                shutting_down: AtomicBool::new(false),
            }),
        }
    }

    /// Validate and enqueue a request, returning its id immediately.
    ///
    /// Invalid requests are rejected with [`WorkerError::InvalidInput`] and
    /// leave no job behind.
    pub async fn submit(&self, request: CompositionRequest) -> WorkerResult<JobId> {
        if self.inner.shutting_down.load(Ordering::SeqCst) {
            return Err(WorkerError::ShuttingDown);
        }

        if let Err(e) = validate_request(&request).await {
            metrics::record_job_rejected();
            debug!("Rejected composition request: {}", e);
            return Err(e);
        }

        let job = Job::new(request.clone());
        let job_id = job.id.clone();
        let source_kind = request.source.kind();

        let (cancel_tx, cancel_rx) = watch::channel(false);
        self.inner.jobs.write().await.insert(job_id.clone(), job);
        self.inner
            .cancels
            .lock()
            .await
            .insert(job_id.clone(), cancel_tx);

        metrics::record_job_submitted(source_kind);
        info!(job_id = %job_id, source = source_kind, "Job submitted");

        let handle = tokio::spawn(Inner::run_job(
            Arc::clone(&self.inner),
            job_id.clone(),
            request,
            cancel_rx,
        ));

        let mut tasks = self.inner.tasks.lock().await;
        tasks.retain(|t| !t.is_finished());
        tasks.push(handle);

        Ok(job_id)
    }

    /// Snapshot of a job.
    pub async fn get_status(&self, job_id: &JobId) -> WorkerResult<Job> {
        self.inner
            .jobs
            .read()
            .await
            .get(job_id)
            .cloned()
            .ok_or_else(|| WorkerError::JobNotFound(job_id.clone()))
    }

    /// Cancel a job.
    ///
    /// A pending job fails right away, once its inputs are removed; a
    /// processing job has its encoder killed and fails shortly after.
    /// Terminal jobs are returned as-is.
    pub async fn cancel(&self, job_id: &JobId) -> WorkerResult<Job> {
        let state = self.get_status(job_id).await?.state;
        if state.is_terminal() {
            return self.get_status(job_id).await;
        }

        if let Some(tx) = self.inner.cancels.lock().await.get(job_id) {
            tx.send_replace(true);
        }

        // A worker task never starts a job after its signal is set, so a job
        // still pending here stays pending until failed below.
        let pending = self
            .inner
            .jobs
            .read()
            .await
            .get(job_id)
            .filter(|job| job.state == JobState::Pending)
            .map(|job| job.request.clone());

        if let Some(request) = pending {
            self.inner.cleanup_inputs(&request).await;
            let mut jobs = self.inner.jobs.write().await;
            if let Some(job) = jobs.get_mut(job_id) {
                if job.state == JobState::Pending && job.fail(CANCELED_MESSAGE).is_ok() {
                    metrics::record_job_canceled();
                    info!(job_id = %job_id, "Pending job canceled");
                }
            }
        }

        self.get_status(job_id).await
    }

    /// All jobs, oldest first.
    pub async fn list(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.inner.jobs.read().await.values().cloned().collect();
        jobs.sort_by_key(|j| j.created_at);
        jobs
    }

    /// Evict terminal jobs that finished longer ago than the retention period.
    pub async fn prune(&self) -> usize {
        let retention = self.inner.pipeline.config().job_retention;
        let now = Utc::now();

        let mut jobs = self.inner.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, job| match (job.is_terminal(), job.finished_at) {
            (true, Some(finished)) => now
                .signed_duration_since(finished)
                .to_std()
                .map(|age| age < retention)
                .unwrap_or(true),
            _ => true,
        });
        let removed = before - jobs.len();
        if removed > 0 {
            debug!(removed, "Pruned terminal jobs");
        }
        removed
    }

    /// Stop accepting jobs, cancel everything in flight and wait for the
    /// worker tasks up to the configured shutdown timeout.
    pub async fn shutdown(&self) {
        self.inner.shutting_down.store(true, Ordering::SeqCst);

        let active: Vec<JobId> = self
            .inner
            .jobs
            .read()
            .await
            .values()
            .filter(|j| !j.is_terminal())
            .map(|j| j.id.clone())
            .collect();
        for job_id in &active {
            if let Err(e) = self.cancel(job_id).await {
                warn!(job_id = %job_id, "Failed to cancel job on shutdown: {}", e);
            }
        }

        let tasks: Vec<JoinHandle<()>> = self.inner.tasks.lock().await.drain(..).collect();
        let timeout = self.inner.pipeline.config().shutdown_timeout;
        info!(jobs = active.len(), "Waiting for in-flight jobs to finish");
        if tokio::time::timeout(timeout, futures_util::future::join_all(tasks))
            .await
            .is_err()
        {
            warn!("Shutdown timed out with jobs still running");
        }
        self.inner.job_semaphore.close();
    }
}

impl Inner {
    async fn run_job(
        inner: Arc<Inner>,
        job_id: JobId,
        request: CompositionRequest,
        mut cancel_rx: watch::Receiver<bool>,
    ) {
        let logger = JobLogger::new(&job_id, request.source.kind());
        let span = logger.create_span();

        async move {
            let permit = tokio::select! {
                permit = Arc::clone(&inner.job_semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => {
                        inner.cleanup_inputs(&request).await;
                        inner.finish_failed(&job_id, "Worker is shutting down").await;
                        inner.release(&job_id).await;
                        return;
                    }
                },
                _ = wait_cancelled(&mut cancel_rx) => {
                    inner.cleanup_inputs(&request).await;
                    inner.finish_failed(&job_id, CANCELED_MESSAGE).await;
                    inner.release(&job_id).await;
                    return;
                }
            };

            let started = {
                let mut jobs = inner.jobs.write().await;
                match jobs.get_mut(&job_id) {
                    Some(job) if !*cancel_rx.borrow() => job.start().is_ok(),
                    _ => false,
                }
            };
            if !started {
                // Canceled while waiting for the slot
                drop(permit);
                inner.cleanup_inputs(&request).await;
                inner.finish_failed(&job_id, CANCELED_MESSAGE).await;
                inner.release(&job_id).await;
                return;
            }

            metrics::job_started();
            let began = Instant::now();
            let (updates_tx, updates_rx) = mpsc::unbounded_channel();
            let updater = tokio::spawn(Inner::apply_updates(
                Arc::clone(&inner),
                job_id.clone(),
                updates_rx,
            ));

            let result = inner
                .pipeline
                .run(&job_id, &request, updates_tx, cancel_rx)
                .await;
            let _ = updater.await;
            drop(permit);
            metrics::job_finished();

            // Inputs go before the terminal state is published, so a poller
            // that sees the job finished also sees them gone.
            inner.cleanup_inputs(&request).await;

            let source_kind = request.source.kind();
            match result {
                Ok(output) => {
                    let mut jobs = inner.jobs.write().await;
                    if let Some(job) = jobs.get_mut(&job_id) {
                        if let Err(e) = job.complete(output.output_path.clone()) {
                            warn!("Could not complete job: {}", e);
                        }
                    }
                    drop(jobs);
                    metrics::record_job_completed(source_kind, began.elapsed().as_secs_f64());
                    logger.log_completion(
                        &output.output_path,
                        output.target_canvas,
                        output.duration_secs,
                    );
                }
                Err(e) => {
                    let message = e.job_message();
                    if e.is_canceled() {
                        metrics::record_job_canceled();
                        logger.log_warning("canceled");
                    } else {
                        metrics::record_job_failed(source_kind);
                        logger.log_error(&message);
                    }
                    inner.finish_failed(&job_id, &message).await;
                }
            }

            inner.release(&job_id).await;
        }
        .instrument(span)
        .await
    }

    async fn apply_updates(
        inner: Arc<Inner>,
        job_id: JobId,
        mut updates: mpsc::UnboundedReceiver<StageUpdate>,
    ) {
        while let Some(update) = updates.recv().await {
            let mut jobs = inner.jobs.write().await;
            if let Some(job) = jobs.get_mut(&job_id) {
                if job.current_step.as_deref() != Some(update.step) {
                    job.set_step(update.step);
                }
                job.set_progress(update.progress);
            }
        }
    }

    async fn finish_failed(&self, job_id: &JobId, message: &str) {
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.get_mut(job_id) {
            // Already terminal when a pending job was canceled directly
            let _ = job.fail(message);
        }
    }

    /// Remove the request's input files; runs on every path to a terminal state.
    async fn cleanup_inputs(&self, request: &CompositionRequest) {
        if !self.pipeline.config().cleanup_inputs {
            return;
        }
        for path in request.input_paths() {
            remove_if_exists(path).await;
        }
    }

    async fn release(&self, job_id: &JobId) {
        self.cancels.lock().await.remove(job_id);
    }
}

const COVER_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Check a request before a job is created.
async fn validate_request(request: &CompositionRequest) -> WorkerResult<()> {
    request.validate_fields()?;

    for path in request.input_paths() {
        ensure_file(path).await?;
    }

    if let Some(cover) = &request.cover_image {
        let is_image = cover
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| COVER_EXTENSIONS.iter().any(|c| c.eq_ignore_ascii_case(e)));
        if !is_image {
            return Err(WorkerError::invalid_input(format!(
                "cover image must be PNG or JPEG: {}",
                cover.display()
            )));
        }
    }

    if let Some(text) = &request.text {
        normalize_text(&text.text)
            .map_err(|_| WorkerError::invalid_input("text is empty after normalization"))?;
    }

    match &request.source {
        SourceInput::Solid { width, height, .. } if *width == 0 || *height == 0 => {
            return Err(WorkerError::invalid_input("solid source needs a non-zero size"));
        }
        SourceInput::Solid { color, .. } if !is_valid_color(color) => {
            return Err(WorkerError::invalid_input(format!("invalid colour '{}'", color)));
        }
        SourceInput::Image {
            duration_secs: Some(d),
            ..
        }
        | SourceInput::Solid {
            duration_secs: Some(d),
            ..
        } if !(d.is_finite() && *d > 0.0) => {
            return Err(WorkerError::invalid_input("duration must be positive"));
        }
        _ => {}
    }

    Ok(())
}

async fn ensure_file(path: &Path) -> WorkerResult<()> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Ok(()),
        _ => Err(WorkerError::invalid_input(format!(
            "input file not found: {}",
            path.display()
        ))),
    }
}

async fn wait_cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return std::future::pending().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kinetic_media::compose::CompositionSpec;
    use kinetic_media::{
        EncodeControl, EncodeSession, Encoder, FfmpegProgress, MediaError, MediaProbe,
        MediaResult, ProgressStream, Rasterizer,
    };
    use kinetic_models::{AudioInput, AudioRole, LayoutStyle, MediaDescriptor, TextOverlay};
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::TempDir;

    use crate::config::WorkerConfig;

    struct FakeProbe;

    #[async_trait]
    impl MediaProbe for FakeProbe {
        async fn probe(&self, path: &Path) -> MediaResult<MediaDescriptor> {
            let is_audio = path.extension().is_some_and(|e| e == "mp3");
            Ok(MediaDescriptor {
                path: path.to_path_buf(),
                width: if is_audio { 0 } else { 1080 },
                height: if is_audio { 0 } else { 1920 },
                duration_secs: if is_audio { 12.0 } else { 20.0 },
                fps: if is_audio { 0.0 } else { 30.0 },
                has_audio: is_audio,
            })
        }
    }

    struct FakeRasterizer;

    impl Rasterizer for FakeRasterizer {
        fn rasterize(&self, markup: &str, _width: u32, _height: u32) -> MediaResult<Vec<u8>> {
            assert!(markup.starts_with("<svg"));
            Ok(b"\x89PNG".to_vec())
        }
    }

    #[derive(Clone, Copy, PartialEq)]
    enum Behavior {
        Succeed,
        Fail,
        BlockUntilCanceled,
    }

    struct FakeEncoder {
        behavior: Behavior,
        graphs: std::sync::Mutex<Vec<String>>,
        covers: std::sync::Mutex<Vec<PathBuf>>,
    }

    impl FakeEncoder {
        fn new(behavior: Behavior) -> Self {
            Self {
                behavior,
                graphs: std::sync::Mutex::new(Vec::new()),
                covers: std::sync::Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Encoder for FakeEncoder {
        async fn start(
            &self,
            spec: &CompositionSpec,
            output: &Path,
            control: EncodeControl,
        ) -> MediaResult<EncodeSession> {
            self.graphs.lock().unwrap().push(spec.graph.render());

            let total_ms = (spec.duration_secs * 1000.0) as i64;
            let (tx, progress) = ProgressStream::channel(total_ms);
            let output = output.to_path_buf();
            let behavior = self.behavior;
            let mut cancel = control.cancel;

            let completion = tokio::spawn(async move {
                if behavior == Behavior::BlockUntilCanceled {
                    drop(tx);
                    if let Some(rx) = cancel.as_mut() {
                        let _ = rx.wait_for(|c| *c).await;
                    }
                    return Err(MediaError::Cancelled);
                }

                tokio::fs::write(&output, b"mp4").await?;
                let _ = tx
                    .send(FfmpegProgress {
                        out_time_ms: total_ms / 2,
                        ..Default::default()
                    })
                    .await;
                if behavior == Behavior::Fail {
                    return Err(MediaError::ffmpeg_failed(
                        "FFmpeg exited with exit status: 1",
                        Some("frame=12\nError while filtering\n".into()),
                        Some(1),
                    ));
                }
                Ok(output)
            });
            Ok(EncodeSession::new(progress, completion))
        }

        async fn attach_cover(
            &self,
            video: &Path,
            cover: &Path,
            output: &Path,
            _control: EncodeControl,
        ) -> MediaResult<PathBuf> {
            self.covers.lock().unwrap().push(cover.to_path_buf());
            let mut bytes = tokio::fs::read(video).await?;
            bytes.extend_from_slice(b"+cover");
            tokio::fs::write(output, bytes).await?;
            Ok(output.to_path_buf())
        }
    }

    struct Harness {
        manager: JobManager,
        encoder: Arc<FakeEncoder>,
        dir: TempDir,
    }

    impl Harness {
        fn new(behavior: Behavior, max_jobs: usize) -> Self {
            Self::with_config(behavior, |c| c.max_concurrent_jobs = max_jobs)
        }

        fn with_config(behavior: Behavior, adjust: impl FnOnce(&mut WorkerConfig)) -> Self {
            let dir = TempDir::new().unwrap();
            let mut config = WorkerConfig {
                work_dir: dir.path().join("work"),
                output_dir: dir.path().join("out"),
                ..Default::default()
            };
            adjust(&mut config);

            let encoder = Arc::new(FakeEncoder::new(behavior));
            let pipeline = Pipeline::new(
                config,
                Arc::new(FakeProbe),
                Arc::new(FakeRasterizer),
                encoder.clone(),
            );
            Self {
                manager: JobManager::new(pipeline),
                encoder,
                dir,
            }
        }

        fn input(&self, name: &str) -> PathBuf {
            let path = self.dir.path().join(name);
            std::fs::write(&path, b"data").unwrap();
            path
        }

        fn work_dir_entries(&self) -> usize {
            std::fs::read_dir(self.dir.path().join("work"))
                .map(|d| d.count())
                .unwrap_or(0)
        }

        fn graphs(&self) -> Vec<String> {
            self.encoder.graphs.lock().unwrap().clone()
        }

        fn covers(&self) -> Vec<PathBuf> {
            self.encoder.covers.lock().unwrap().clone()
        }
    }

    fn quote(text: &str) -> TextOverlay {
        TextOverlay {
            text: text.to_string(),
            attribution: None,
            style: LayoutStyle::Reference,
            visible_last_seconds: None,
            fade_in_secs: None,
        }
    }

    fn video_request(path: PathBuf) -> CompositionRequest {
        CompositionRequest::new(SourceInput::Video {
            path,
            loop_to_audio: false,
        })
    }

    async fn wait_for(manager: &JobManager, id: &JobId, done: impl Fn(&Job) -> bool) -> Job {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let job = manager.get_status(id).await.unwrap();
                if done(&job) {
                    return job;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("job did not reach the expected state")
    }

    async fn wait_terminal(manager: &JobManager, id: &JobId) -> Job {
        wait_for(manager, id, |j| j.is_terminal()).await
    }

    #[tokio::test]
    async fn test_missing_input_rejected_without_job() {
        let h = Harness::new(Behavior::Succeed, 2);
        let err = h
            .manager
            .submit(video_request(h.dir.path().join("missing.mp4")))
            .await
            .unwrap_err();

        assert!(matches!(err, WorkerError::InvalidInput(_)));
        assert!(h.manager.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_blank_text_rejected() {
        let h = Harness::new(Behavior::Succeed, 2);
        let request = video_request(h.input("bg.mp4")).with_text(quote("   \n "));
        let err = h.manager.submit(request).await.unwrap_err();
        assert!(matches!(err, WorkerError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_unknown_job_not_found() {
        let h = Harness::new(Behavior::Succeed, 2);
        let id = JobId::new();
        assert!(matches!(
            h.manager.get_status(&id).await,
            Err(WorkerError::JobNotFound(_))
        ));
        assert!(matches!(
            h.manager.cancel(&id).await,
            Err(WorkerError::JobNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_video_with_text_completes() {
        let h = Harness::new(Behavior::Succeed, 2);
        let source = h.input("bg.mp4");
        let request = video_request(source.clone()).with_text(quote("Stay hungry - Steve Jobs"));

        let id = h.manager.submit(request).await.unwrap();
        let job = wait_terminal(&h.manager, &id).await;

        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.progress, 100);
        let output = job.output_path.expect("completed job has an output");
        assert!(output.exists());

        let sidecar: serde_json::Value =
            serde_json::from_slice(&std::fs::read(output.with_extension("json")).unwrap()).unwrap();
        assert_eq!(sidecar["style"], "reference");
        assert_eq!(sidecar["layout"]["attribution"], "Steve Jobs");

        let graphs = h.graphs();
        assert_eq!(graphs.len(), 1);
        assert!(graphs[0].contains("[base][ovl]overlay"));

        assert_eq!(h.work_dir_entries(), 0);
        assert!(!source.exists());
    }

    #[tokio::test]
    async fn test_image_source_renders_motion_first() {
        let h = Harness::new(Behavior::Succeed, 2);
        let request = CompositionRequest::new(SourceInput::Image {
            path: h.input("still.png"),
            preset: Some("vintage".into()),
            duration_secs: Some(4.0),
        })
        .with_audio(AudioInput {
            path: h.input("music.mp3"),
            role: AudioRole::BackgroundMusic,
            volume: None,
        });

        let id = h.manager.submit(request).await.unwrap();
        let job = wait_terminal(&h.manager, &id).await;
        assert_eq!(job.state, JobState::Completed, "{:?}", job.error_message);

        let graphs = h.graphs();
        assert_eq!(graphs.len(), 2);
        assert!(graphs[0].contains("zoompan"));
        assert!(graphs[1].contains("amix") || graphs[1].contains("[aout]"));
    }

    #[tokio::test]
    async fn test_encoder_failure_fails_job() {
        let h = Harness::new(Behavior::Fail, 2);
        let source = h.input("bg.mp4");
        let id = h.manager.submit(video_request(source.clone())).await.unwrap();
        let job = wait_terminal(&h.manager, &id).await;

        assert_eq!(job.state, JobState::Failed);
        let message = job.error_message.unwrap();
        assert!(message.ends_with("Error while filtering"), "{}", message);
        assert!(job.output_path.is_none());
        assert!(!h.dir.path().join("out").join(format!("{}.mp4", id)).exists());
        assert_eq!(h.work_dir_entries(), 0);
        assert!(!source.exists());
    }

    #[tokio::test]
    async fn test_cancel_processing_job() {
        let h = Harness::new(Behavior::BlockUntilCanceled, 2);
        let id = h.manager.submit(video_request(h.input("bg.mp4"))).await.unwrap();
        wait_for(&h.manager, &id, |j| j.current_step.as_deref() == Some("encoding")).await;

        h.manager.cancel(&id).await.unwrap();
        let job = wait_terminal(&h.manager, &id).await;

        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.error_message.as_deref(), Some(CANCELED_MESSAGE));
        assert_eq!(h.work_dir_entries(), 0);
    }

    #[tokio::test]
    async fn test_bounded_pool_keeps_extra_jobs_pending() {
        let h = Harness::new(Behavior::BlockUntilCanceled, 1);
        let first = h.manager.submit(video_request(h.input("a.mp4"))).await.unwrap();
        wait_for(&h.manager, &first, |j| j.state == JobState::Processing).await;

        let second_input = h.input("b.mp4");
        let second = h.manager.submit(video_request(second_input.clone())).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(
            h.manager.get_status(&second).await.unwrap().state,
            JobState::Pending
        );

        let canceled = h.manager.cancel(&second).await.unwrap();
        assert_eq!(canceled.state, JobState::Failed);
        assert_eq!(canceled.error_message.as_deref(), Some(CANCELED_MESSAGE));
        assert!(canceled.started_at.is_none());
        // Inputs are gone by the time the failure is visible
        assert!(!second_input.exists());

        h.manager.cancel(&first).await.unwrap();
        let first_job = wait_terminal(&h.manager, &first).await;
        assert_eq!(first_job.error_message.as_deref(), Some(CANCELED_MESSAGE));
    }

    #[tokio::test]
    async fn test_cover_image_is_embedded() {
        let h = Harness::with_config(Behavior::Succeed, |c| c.generate_thumbnail = true);
        let source = h.input("bg.mp4");
        let cover = h.input("cover.png");
        let request = video_request(source).with_cover_image(cover.clone());

        let id = h.manager.submit(request).await.unwrap();
        let job = wait_terminal(&h.manager, &id).await;
        assert_eq!(job.state, JobState::Completed, "{:?}", job.error_message);

        assert_eq!(h.covers(), vec![cover.clone()]);
        let output = job.output_path.unwrap();
        assert_eq!(std::fs::read(&output).unwrap(), b"mp4+cover");
        // The frame grab only runs when no cover is given
        assert!(!output.with_extension("jpg").exists());
        assert!(!cover.exists());
        assert_eq!(h.work_dir_entries(), 0);
    }

    #[tokio::test]
    async fn test_cover_image_validated() {
        let h = Harness::new(Behavior::Succeed, 2);

        let missing = video_request(h.input("a.mp4")).with_cover_image(h.dir.path().join("none.png"));
        let err = h.manager.submit(missing).await.unwrap_err();
        assert!(matches!(err, WorkerError::InvalidInput(_)));

        let not_image = video_request(h.input("b.mp4")).with_cover_image(h.input("cover.txt"));
        let err = h.manager.submit(not_image).await.unwrap_err();
        assert!(matches!(err, WorkerError::InvalidInput(_)));

        assert!(h.manager.list().await.is_empty());
        assert!(h.covers().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_solid_color_rejected() {
        let h = Harness::new(Behavior::Succeed, 2);
        let request = CompositionRequest::new(SourceInput::Solid {
            color: "red:s=1x1,drawtext=text=x".into(),
            width: 1080,
            height: 1920,
            duration_secs: Some(2.0),
        });

        let err = h.manager.submit(request).await.unwrap_err();
        assert!(matches!(err, WorkerError::InvalidInput(ref m) if m.contains("colour")), "{}", err);
        assert!(h.manager.list().await.is_empty());
        assert!(h.graphs().is_empty());
    }

    #[tokio::test]
    async fn test_upscale_renders_uhd_canvas() {
        let h = Harness::new(Behavior::Succeed, 2);
        let request = video_request(h.input("bg.mp4")).with_upscale(true);

        let id = h.manager.submit(request).await.unwrap();
        let job = wait_terminal(&h.manager, &id).await;
        assert_eq!(job.state, JobState::Completed, "{:?}", job.error_message);

        let sidecar: serde_json::Value = serde_json::from_slice(
            &std::fs::read(job.output_path.unwrap().with_extension("json")).unwrap(),
        )
        .unwrap();
        assert_eq!(sidecar["source_canvas"]["width"], 1080);
        assert_eq!(sidecar["target_canvas"]["width"], 2160);
        assert_eq!(sidecar["target_canvas"]["height"], 3840);
        assert!(h.graphs()[0].contains("s=2160x3840"));
    }

    #[tokio::test]
    async fn test_cancel_terminal_job_is_noop() {
        let h = Harness::new(Behavior::Succeed, 2);
        let id = h.manager.submit(video_request(h.input("bg.mp4"))).await.unwrap();
        wait_terminal(&h.manager, &id).await;

        let job = h.manager.cancel(&id).await.unwrap();
        assert_eq!(job.state, JobState::Completed);
        assert!(job.error_message.is_none());
    }

    #[tokio::test]
    async fn test_prune_evicts_terminal_jobs() {
        let h = Harness::with_config(Behavior::Succeed, |c| c.job_retention = Duration::ZERO);
        let id = h.manager.submit(video_request(h.input("bg.mp4"))).await.unwrap();
        wait_terminal(&h.manager, &id).await;
        tokio::time::sleep(Duration::from_millis(5)).await;

        assert_eq!(h.manager.prune().await, 1);
        assert!(matches!(
            h.manager.get_status(&id).await,
            Err(WorkerError::JobNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_inputs_kept_when_cleanup_disabled() {
        let h = Harness::with_config(Behavior::Succeed, |c| c.cleanup_inputs = false);
        let source = h.input("bg.mp4");
        let id = h.manager.submit(video_request(source.clone())).await.unwrap();
        wait_terminal(&h.manager, &id).await;
        assert!(source.exists());
    }

    #[tokio::test]
    async fn test_shutdown_cancels_and_rejects() {
        let h = Harness::new(Behavior::BlockUntilCanceled, 1);
        let id = h.manager.submit(video_request(h.input("bg.mp4"))).await.unwrap();
        wait_for(&h.manager, &id, |j| j.state == JobState::Processing).await;

        h.manager.shutdown().await;

        let job = h.manager.get_status(&id).await.unwrap();
        assert_eq!(job.error_message.as_deref(), Some(CANCELED_MESSAGE));
        let err = h
            .manager
            .submit(video_request(h.input("next.mp4")))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::ShuttingDown));
    }
}
