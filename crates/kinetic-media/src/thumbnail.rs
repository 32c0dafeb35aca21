//! Cover art and thumbnails for finished outputs.

use std::path::Path;

use kinetic_models::encoding::{THUMBNAIL_SCALE_WIDTH, THUMBNAIL_TIMESTAMP};

use crate::command::{FfmpegCommand, FfmpegInput, FfmpegRunner};
use crate::error::MediaResult;

/// Command grabbing one scaled JPEG frame one second into `video_path`.
pub fn thumbnail_command(video_path: impl AsRef<Path>, output_path: impl AsRef<Path>) -> FfmpegCommand {
    FfmpegCommand::new(output_path)
        .input(FfmpegInput::file(video_path).seek(THUMBNAIL_TIMESTAMP))
        .single_frame()
        .video_filter(format!("scale={}:-2", THUMBNAIL_SCALE_WIDTH))
}

/// Command copying the streams of `video_path` and attaching `cover_path`
/// as a PNG cover (`attached_pic`) stream. Nothing is re-encoded except the
/// cover itself.
pub fn attach_cover_command(
    video_path: impl AsRef<Path>,
    cover_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
) -> FfmpegCommand {
    FfmpegCommand::new(output_path)
        .input(FfmpegInput::file(video_path))
        .input(FfmpegInput::file(cover_path))
        .map("0")
        .map("1")
        .output_args(["-c", "copy", "-c:v:1", "png", "-disposition:v:1", "attached_pic"])
}

/// Generate a thumbnail from a video file.
pub async fn generate_thumbnail(
    video_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
) -> MediaResult<()> {
    let cmd = thumbnail_command(video_path, output_path);
    FfmpegRunner::new().run(&cmd).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thumbnail_command() {
        let args = thumbnail_command("/out/a.mp4", "/out/a.jpg").build_args().join(" ");
        assert!(args.contains("-ss 00:00:01 -i /out/a.mp4"));
        assert!(args.contains("-frames:v 1"));
        assert!(args.contains("-vf scale=480:-2"));
        assert!(args.ends_with("/out/a.jpg"));
    }

    #[test]
    fn test_attach_cover_command() {
        let args = attach_cover_command("/work/composed.mp4", "/in/cover.png", "/work/cover.mp4")
            .build_args()
            .join(" ");
        assert!(args.contains("-i /work/composed.mp4 -i /in/cover.png"));
        assert!(args.contains("-map 0 -map 1"));
        assert!(args.contains("-c copy -c:v:1 png -disposition:v:1 attached_pic"));
        assert!(!args.contains("-filter_complex"));
        assert!(args.ends_with("/work/cover.mp4"));
    }
}
