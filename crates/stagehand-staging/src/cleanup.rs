//! Working directory removal with bounded retry.

use std::io;
use std::path::Path;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error};

/// Pause between removal attempts.
pub const REMOVE_RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// Total time spent retrying before giving up.
pub const REMOVE_TIMEOUT: Duration = Duration::from_secs(5);

/// Recursively delete `target`, retrying for up to [`REMOVE_TIMEOUT`].
///
/// Files held open by a dying child can make the first attempts fail on
/// some platforms. Never returns an error: exhaustion is logged and
/// `false` returned. A missing directory counts as removed.
pub async fn remove_files(target: &Path) -> bool {
    remove_files_with(target, REMOVE_RETRY_INTERVAL, REMOVE_TIMEOUT).await
}

pub async fn remove_files_with(target: &Path, interval: Duration, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;

    let last_error = loop {
        match remove_once(target).await {
            Ok(()) => {
                debug!("Removed {}", target.display());
                return true;
            }
            Err(e) => {
                if Instant::now() + interval >= deadline {
                    break e;
                }
                tokio::time::sleep(interval).await;
            }
        }
    };

    error!(
        "Unable to delete the directory {}: {}",
        target.display(),
        last_error
    );
    false
}

async fn remove_once(target: &Path) -> io::Result<()> {
    match tokio::fs::remove_dir_all(target).await {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
