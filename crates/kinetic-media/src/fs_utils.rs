//! Filesystem helpers for publishing outputs and purging intermediates.

use std::io::ErrorKind;
use std::path::Path;
use tokio::fs;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

/// EXDEV on Linux and macOS.
const CROSS_DEVICE_ERRNO: i32 = 18;

/// Move a file from `src` to `dst`, creating parent directories.
///
/// Tries a rename first. Across filesystems it copies to a sibling
/// temporary file, renames that into place and then removes `src`, so a
/// partially written `dst` is never visible.
pub async fn move_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> MediaResult<()> {
    let src = src.as_ref();
    let dst = dst.as_ref();

    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).await?;
    }

    match fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(e) if is_cross_device_error(&e) => {
            debug!(
                src = %src.display(),
                dst = %dst.display(),
                "Cross-device rename, copying instead"
            );
            copy_and_delete(src, dst).await
        }
        Err(e) => Err(MediaError::from(e)),
    }
}

fn is_cross_device_error(e: &std::io::Error) -> bool {
    e.raw_os_error() == Some(CROSS_DEVICE_ERRNO)
}

async fn copy_and_delete(src: &Path, dst: &Path) -> MediaResult<()> {
    let staged = dst.with_extension("partial");

    if let Err(e) = fs::copy(src, &staged).await {
        remove_if_exists(&staged).await;
        return Err(e.into());
    }

    if let Err(e) = fs::rename(&staged, dst).await {
        remove_if_exists(&staged).await;
        return Err(e.into());
    }

    if let Err(e) = fs::remove_file(src).await {
        warn!(path = %src.display(), "Failed to remove source after copy: {}", e);
    }

    Ok(())
}

/// Remove a file, ignoring a missing one. Returns whether a file was removed.
pub async fn remove_if_exists(path: impl AsRef<Path>) -> bool {
    let path = path.as_ref();
    match fs::remove_file(path).await {
        Ok(()) => true,
        Err(e) if e.kind() == ErrorKind::NotFound => false,
        Err(e) => {
            warn!(path = %path.display(), "Failed to remove file: {}", e);
            false
        }
    }
}
