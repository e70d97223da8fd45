mod api;
mod artifacts;
mod capture;
mod config;
mod cycle;
mod pipeline;
mod recognize;
mod recorder;
mod scheduler;
mod state;
mod twitch;
mod utilities;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};

use crate::capture::{FfmpegFrames, ImageCropper, ALIVE_COUNTER};
use crate::config::{Backend, Config};
use crate::cycle::Orchestrator;
use crate::pipeline::Stages;
use crate::recorder::Livestreamer;
use crate::state::PublishedState;
use crate::twitch::TwitchDirectory;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("rotisserie=info"))
        .init();

    let config = Config::parse();

    artifacts::ensure_dirs(&config.streams_dir)?;

    match config.backend() {
        Backend::Watson { .. } => info!("Recognizing full frames with Watson"),
        Backend::OcrService { ref host, port } => {
            info!("Recognizing cropped frames with OCR service at {}:{}", host, port)
        }
        Backend::None => warn!("No recognition backend configured; no stream will be ranked"),
    }

    let stages = Stages {
        recorder: Arc::new(Livestreamer::new(
            config.token.clone(),
            config.quality.clone(),
            config.clip_length(),
        )),
        frames: Arc::new(FfmpegFrames::new(config.extract_timeout())),
        cropper: Arc::new(ImageCropper::new(ALIVE_COUNTER)),
        recognizer: Arc::from(recognize::from_config(&config)?),
        artifacts_root: config.streams_dir.clone(),
    };

    let state = Arc::new(PublishedState::new());
    let orchestrator = Orchestrator {
        source: Arc::new(TwitchDirectory::new(&config)?),
        stages,
        state: state.clone(),
        grace: config.grace(),
    };

    // Cycles and the sweeper live for the whole process; the server decides when we exit.
    let _cycles = scheduler::spawn_cycles(orchestrator, config.period());
    let _sweeper = scheduler::spawn_sweeper(
        config.streams_dir.clone(),
        config.period(),
        config.artifact_max_age(),
    );

    info!("Listening on port {}", config.port);
    api::run_api_server(state, config.public_dir.clone(), config.port)
        .await
        .context("API server failed")?;
    Ok(())
}
