use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{ensure, Context, Result};
use async_trait::async_trait;
use log::info;

use crate::utilities::run_ffmpeg;

/// Pulls a single still out of a recorded clip.
#[async_trait]
pub trait FrameExtractor: Send + Sync {
    async fn extract(&self, clip: &Path, frame: &Path) -> Result<()>;
}

/// Cuts the region holding the metric out of a frame.
#[async_trait]
pub trait Cropper: Send + Sync {
    async fn crop(&self, frame: &Path, output: &Path) -> Result<()>;
}

/// Extracts the frame at time zero with ffmpeg.
pub struct FfmpegFrames {
    limit: Duration,
}

impl FfmpegFrames {
    pub fn new(limit: Duration) -> Self {
        FfmpegFrames { limit }
    }
}

#[async_trait]
impl FrameExtractor for FfmpegFrames {
    async fn extract(&self, clip: &Path, frame: &Path) -> Result<()> {
        let clip_arg = clip.to_string_lossy().into_owned();
        let frame_arg = frame.to_string_lossy().into_owned();
        run_ffmpeg(
            &[
                "-y",
                "-ss",
                "0",
                "-i",
                clip_arg.as_str(),
                "-frames:v",
                "1",
                frame_arg.as_str(),
            ],
            self.limit,
        )
        .await?;

        ensure!(
            tokio::fs::try_exists(frame).await.unwrap_or(false),
            "ffmpeg did not produce {}",
            frame.display()
        );
        info!("Took screenshot {}", frame.display());
        Ok(())
    }
}

/// Pixel rectangle in frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Where the in-game "alive" counter sits on a 720p frame.
pub const ALIVE_COUNTER: Region = Region {
    x: 1190,
    y: 20,
    width: 22,
    height: 22,
};

/// Crops and grayscales frames with the `image` crate.
pub struct ImageCropper {
    region: Region,
}

impl ImageCropper {
    pub fn new(region: Region) -> Self {
        ImageCropper { region }
    }
}

#[async_trait]
impl Cropper for ImageCropper {
    async fn crop(&self, frame: &Path, output: &Path) -> Result<()> {
        let region = self.region;
        let frame: PathBuf = frame.to_path_buf();
        let output: PathBuf = output.to_path_buf();

        // Decoding and encoding are CPU bound.
        tokio::task::spawn_blocking(move || crop_to_gray(&frame, &output, region))
            .await
            .context("crop task panicked")??;
        Ok(())
    }
}

fn crop_to_gray(frame: &Path, output: &Path, region: Region) -> Result<()> {
    let img = image::open(frame).with_context(|| format!("cannot open {}", frame.display()))?;
    ensure!(
        region.x + region.width <= img.width() && region.y + region.height <= img.height(),
        "crop region {:?} outside {}x{} frame",
        region,
        img.width(),
        img.height()
    );
    img.crop_imm(region.x, region.y, region.width, region.height)
        .grayscale()
        .save(output)
        .with_context(|| format!("cannot write {}", output.display()))?;
    info!("Cropped screenshot {}", output.display());
    Ok(())
}
