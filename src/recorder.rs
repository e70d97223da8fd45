use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::process::{Child, Command};

/// How long an interrupted recorder gets to flush its output.
const EXIT_GRACE: Duration = Duration::from_secs(5);

/// Captures a short clip of a live stream to disk.
#[async_trait]
pub trait Recorder: Send + Sync {
    /// Record `id` into `output`. Only failing to start counts as an error;
    /// the recording is always cut off after the clip length.
    async fn record(&self, id: &str, output: &Path) -> Result<()>;
}

/// Records through the `livestreamer` CLI.
pub struct Livestreamer {
    token: Option<String>,
    quality: String,
    clip_length: Duration,
}

impl Livestreamer {
    pub fn new(token: Option<String>, quality: String, clip_length: Duration) -> Self {
        Livestreamer {
            token,
            quality,
            clip_length,
        }
    }

    fn args(&self, id: &str, output: &Path) -> Vec<String> {
        let mut args = vec!["--yes-run-as-root".to_string(), "-Q".into(), "-f".into()];
        if let Some(token) = &self.token {
            args.push("--twitch-oauth-token".into());
            args.push(token.clone());
        }
        args.push(format!("twitch.tv/{}", id));
        args.push(self.quality.clone());
        args.push("-o".into());
        args.push(output.to_string_lossy().into_owned());
        args
    }
}

#[async_trait]
impl Recorder for Livestreamer {
    async fn record(&self, id: &str, output: &Path) -> Result<()> {
        info!("Recording clip of stream: {}", id);
        let child = Command::new("livestreamer")
            .args(self.args(id, output))
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to start livestreamer for {}", id))?;

        stop_after(child, self.clip_length).await;
        info!("Recorded stream: {}", id);
        Ok(())
    }
}

/// Let `child` run for `length`, then interrupt it so it can finish writing
/// its output, and reap it.
async fn stop_after(mut child: Child, length: Duration) {
    tokio::time::sleep(length).await;

    if let Some(pid) = child.id() {
        let pid = pid.to_string();
        let interrupted = Command::new("kill")
            .args(["-s", "INT", pid.as_str()])
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false);
        if !interrupted {
            warn!("Could not interrupt recorder {}, killing it", pid);
            let _ = child.start_kill();
        }
    }

    let status = match tokio::time::timeout(EXIT_GRACE, child.wait()).await {
        Ok(status) => status,
        Err(_) => {
            warn!("Recorder ignored interrupt, killing it");
            let _ = child.start_kill();
            child.wait().await
        }
    };
    match status {
        Ok(status) => debug!("Recorder exited with {}", status),
        Err(err) => warn!("Failed to reap recorder: {}", err),
    }
}
