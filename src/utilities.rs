use std::path::Path;
use std::time::Duration;

use anyhow::{ensure, Context, Result};
use log::{debug, warn};
use tokio::process::Command;

/// Run ffmpeg to completion, failing on a non-zero exit or when `limit` elapses.
/// The child is killed if the limit is hit.
pub async fn run_ffmpeg(args: &[&str], limit: Duration) -> Result<()> {
    let mut command = Command::new("ffmpeg");
    command.args(args).kill_on_drop(true);

    let output = tokio::time::timeout(limit, command.output())
        .await
        .with_context(|| format!("ffmpeg timed out after {:?}", limit))?
        .context("failed to start ffmpeg")?;

    debug!("ffmpeg stdout: {}", String::from_utf8_lossy(&output.stdout));
    debug!("ffmpeg stderr: {}", String::from_utf8_lossy(&output.stderr));

    ensure!(output.status.success(), "ffmpeg exited with {}", output.status);
    Ok(())
}

/// Best-effort delete of a stage artifact.
pub async fn remove_artifact(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Deleted {}", path.display()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => warn!("Could not delete {}: {}", path.display(), err),
    }
}
