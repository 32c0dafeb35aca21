//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum pipelines running at once; further jobs wait in `pending`
    pub max_concurrent_jobs: usize,
    /// Work directory for per-job intermediates
    pub work_dir: PathBuf,
    /// Directory receiving finished outputs
    pub output_dir: PathBuf,
    /// Per-encode timeout; zero disables it
    pub encode_timeout: Duration,
    /// Output frame rate
    pub frame_rate: u32,
    /// Write `<output>.json` next to each output
    pub write_sidecar: bool,
    /// Write `<output>.jpg` next to each output
    pub generate_thumbnail: bool,
    /// Remove the request's input files once the job is terminal
    pub cleanup_inputs: bool,
    /// Terminal jobs older than this are evicted by `prune`
    pub job_retention: Duration,
    /// How long `shutdown` waits for running jobs
    pub shutdown_timeout: Duration,
    /// Extra font directories for the rasterizer
    pub font_dirs: Vec<PathBuf>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            work_dir: PathBuf::from("/tmp/kinetic"),
            output_dir: PathBuf::from("./outputs"),
            encode_timeout: Duration::from_secs(1800), // 30 minutes
            frame_rate: 30,
            write_sidecar: true,
            generate_thumbnail: false,
            cleanup_inputs: true,
            job_retention: Duration::from_secs(24 * 3600),
            shutdown_timeout: Duration::from_secs(30),
            font_dirs: Vec::new(),
        }
    }
}

impl WorkerConfig {
    /// Create config from `KINETIC_*` environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_concurrent_jobs: env_parse("KINETIC_MAX_JOBS")
                .unwrap_or(defaults.max_concurrent_jobs)
                .max(1),
            work_dir: std::env::var("KINETIC_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            output_dir: std::env::var("KINETIC_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            encode_timeout: env_parse("KINETIC_ENCODE_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.encode_timeout),
            frame_rate: env_parse("KINETIC_FRAME_RATE")
                .unwrap_or(defaults.frame_rate)
                .max(1),
            write_sidecar: env_bool("KINETIC_WRITE_SIDECAR").unwrap_or(defaults.write_sidecar),
            generate_thumbnail: env_bool("KINETIC_THUMBNAILS")
                .unwrap_or(defaults.generate_thumbnail),
            cleanup_inputs: env_bool("KINETIC_CLEANUP_INPUTS").unwrap_or(defaults.cleanup_inputs),
            job_retention: env_parse("KINETIC_JOB_RETENTION_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.job_retention),
            shutdown_timeout: env_parse("KINETIC_SHUTDOWN_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.shutdown_timeout),
            font_dirs: std::env::var("KINETIC_FONT_DIRS")
                .map(|v| {
                    v.split(':')
                        .filter(|s| !s.is_empty())
                        .map(PathBuf::from)
                        .collect()
                })
                .unwrap_or_default(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key).ok().and_then(|s| parse_bool(&s))
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.max_concurrent_jobs, 2);
        assert_eq!(config.encode_timeout, Duration::from_secs(1800));
        assert_eq!(config.frame_rate, 30);
        assert!(config.write_sidecar);
        assert!(!config.generate_thumbnail);
        assert!(config.cleanup_inputs);
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool(" off "), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
