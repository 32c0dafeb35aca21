//! Axum API server binary.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use kinetic_api::{create_router, metrics, ApiConfig, AppState};
use kinetic_media::command::{check_ffmpeg, check_ffprobe};
use kinetic_media::{FfmpegEncoder, FfprobeProbe, SvgRasterizer};
use kinetic_worker::{JobManager, Pipeline, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("kinetic=info".parse()?);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting kinetic-api");

    let config = ApiConfig::from_env();
    let worker_config = WorkerConfig::from_env();
    info!(
        "API config: host={}, port={}, max_jobs={}, output_dir={}",
        config.host,
        config.port,
        worker_config.max_concurrent_jobs,
        worker_config.output_dir.display()
    );

    if let Err(e) = check_ffmpeg().and_then(|_| check_ffprobe()) {
        warn!("{}; jobs will fail until it is installed", e);
    }

    tokio::fs::create_dir_all(&worker_config.output_dir)
        .await
        .with_context(|| format!("creating {}", worker_config.output_dir.display()))?;

    let font_dirs: Vec<&Path> = worker_config.font_dirs.iter().map(|p| p.as_path()).collect();
    let rasterizer = SvgRasterizer::with_font_dirs(&font_dirs);
    info!(faces = rasterizer.font_count(), "Fonts loaded");

    let pipeline = Pipeline::new(
        worker_config.clone(),
        Arc::new(FfprobeProbe),
        Arc::new(rasterizer),
        Arc::new(FfmpegEncoder),
    );
    let manager = JobManager::new(pipeline);

    let metrics_handle = if config.metrics_enabled {
        info!("Prometheus metrics enabled at /metrics");
        Some(metrics::init_metrics().context("installing Prometheus recorder")?)
    } else {
        None
    };

    if !config.prune_interval.is_zero() {
        let manager = manager.clone();
        let period = config.prune_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                manager.prune().await;
            }
        });
    }

    let state = AppState::new(config.clone(), manager.clone());
    let app = create_router(state, metrics_handle);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("invalid bind address")?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    manager.shutdown().await;
    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for CTRL+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}
