use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{info, warn};

use crate::artifacts::ArtifactPaths;
use crate::capture::{Cropper, FrameExtractor};
use crate::recognize::{Input, Recognizer};
use crate::recorder::Recorder;
use crate::state::RankedEntry;
use crate::utilities::remove_artifact;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Record,
    Capture,
    Crop,
    Recognize,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Record => "record",
            Stage::Capture => "capture",
            Stage::Crop => "crop",
            Stage::Recognize => "recognize",
        };
        f.write_str(name)
    }
}

/// Why one candidate produced nothing this cycle.
#[derive(Debug, thiserror::Error)]
#[error("{stage} failed for {id}: {cause}")]
pub struct StageFailure {
    pub id: String,
    pub stage: Stage,
    pub cause: String,
}

impl StageFailure {
    fn new(id: &str, stage: Stage, cause: impl fmt::Display) -> Self {
        StageFailure {
            id: id.to_string(),
            stage,
            cause: cause.to_string(),
        }
    }
}

/// The collaborators every candidate's pipeline runs through. Shared by all
/// pipelines of every cycle.
#[derive(Clone)]
pub struct Stages {
    pub recorder: Arc<dyn Recorder>,
    pub frames: Arc<dyn FrameExtractor>,
    pub cropper: Arc<dyn Cropper>,
    pub recognizer: Arc<dyn Recognizer>,
    pub artifacts_root: PathBuf,
}

/// Record, capture, optionally crop, then recognize one candidate.
///
/// Each stage runs once; the first failure ends the pipeline and removes
/// whatever artifact the failed stage was working from.
pub async fn run(stages: &Stages, id: &str, cycle: u64) -> Result<RankedEntry, StageFailure> {
    let paths = ArtifactPaths::for_candidate(&stages.artifacts_root, id, cycle);

    stages
        .recorder
        .record(id, &paths.clip)
        .await
        .map_err(|e| StageFailure::new(id, Stage::Record, format!("{:#}", e)))?;

    if !exists(&paths.clip).await {
        return Err(StageFailure::new(id, Stage::Capture, "missing input"));
    }
    if let Err(err) = stages.frames.extract(&paths.clip, &paths.frame).await {
        remove_artifact(&paths.clip).await;
        return Err(StageFailure::new(id, Stage::Capture, format!("{:#}", err)));
    }

    let image = match stages.recognizer.input() {
        Input::Frame => &paths.frame,
        Input::Crop => {
            if !exists(&paths.frame).await {
                return Err(StageFailure::new(id, Stage::Crop, "missing input"));
            }
            if let Err(err) = stages.cropper.crop(&paths.frame, &paths.crop).await {
                remove_artifact(&paths.frame).await;
                return Err(StageFailure::new(id, Stage::Crop, format!("{:#}", err)));
            }
            &paths.crop
        }
    };

    if !exists(image).await {
        return Err(StageFailure::new(id, Stage::Recognize, "missing input"));
    }
    let metric = stages
        .recognizer
        .recognize(image)
        .await
        .map_err(|e| StageFailure::new(id, Stage::Recognize, format!("{:#}", e)))?;

    info!("{} = {} alive.", id, metric);
    Ok(RankedEntry::new(id, metric))
}

/// Run the pipeline and log a failure instead of returning it.
pub async fn run_logged(stages: &Stages, id: &str, cycle: u64) -> Option<RankedEntry> {
    match run(stages, id, cycle).await {
        Ok(entry) => Some(entry),
        Err(failure) => {
            warn!("{}", failure);
            None
        }
    }
}

async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

#[cfg(test)]
pub(crate) mod fakes {
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use anyhow::{bail, Result};
    use async_trait::async_trait;

    use crate::capture::{Cropper, FrameExtractor};
    use crate::recognize::{Input, Recognizer};
    use crate::recorder::Recorder;

    /// Writes a clip unless told to leave it out.
    pub struct FakeRecorder {
        pub write_clip: bool,
        pub fail: bool,
    }

    impl Default for FakeRecorder {
        fn default() -> Self {
            FakeRecorder {
                write_clip: true,
                fail: false,
            }
        }
    }

    #[async_trait]
    impl Recorder for FakeRecorder {
        async fn record(&self, id: &str, output: &Path) -> Result<()> {
            if self.fail {
                bail!("cannot start recorder for {}", id);
            }
            if self.write_clip {
                tokio::fs::write(output, id.as_bytes()).await?;
            }
            Ok(())
        }
    }

    /// Copies the clip's contents into the frame.
    #[derive(Default)]
    pub struct FakeFrames {
        pub fail: bool,
    }

    #[async_trait]
    impl FrameExtractor for FakeFrames {
        async fn extract(&self, clip: &Path, frame: &Path) -> Result<()> {
            if self.fail {
                bail!("ffmpeg exited with 1");
            }
            tokio::fs::copy(clip, frame).await?;
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct FakeCropper {
        pub fail: bool,
    }

    #[async_trait]
    impl Cropper for FakeCropper {
        async fn crop(&self, frame: &Path, output: &Path) -> Result<()> {
            if self.fail {
                bail!("bad image");
            }
            tokio::fs::copy(frame, output).await?;
            Ok(())
        }
    }

    /// Looks up the metric by the stream id stored in the image file.
    pub struct FakeRecognizer {
        pub input: Input,
        pub metrics: Vec<(&'static str, u32)>,
        pub calls: AtomicUsize,
        pub fail: bool,
    }

    impl FakeRecognizer {
        pub fn new(metrics: Vec<(&'static str, u32)>) -> Self {
            FakeRecognizer {
                input: Input::Frame,
                metrics,
                calls: AtomicUsize::new(0),
                fail: false,
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Recognizer for FakeRecognizer {
        fn input(&self) -> Input {
            self.input
        }

        async fn recognize(&self, image: &Path) -> Result<u32> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                bail!("upload failed");
            }
            let id = tokio::fs::read_to_string(image).await?;
            Ok(self
                .metrics
                .iter()
                .find(|(name, _)| *name == id)
                .map_or(100, |(_, metric)| *metric))
        }
    }
}
