use std::path::PathBuf;
use std::time::Duration;

use log::{debug, info};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;

use crate::artifacts;
use crate::cycle::Orchestrator;

/// Start a cycle now and then every `period`, without waiting for earlier
/// cycles to finish.
pub fn spawn_cycles(orchestrator: Orchestrator, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticks = IntervalStream::new(interval(period));
        let mut cycle = 0u64;
        while ticks.next().await.is_some() {
            cycle += 1;
            debug!("Starting cycle {}", cycle);
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                let ranking = orchestrator.run_cycle(cycle).await;
                debug!("Cycle {} ranked {} streams", cycle, ranking.len());
            });
        }
    })
}

/// Periodically delete artifacts older than `max_age` under `root`.
pub fn spawn_sweeper(root: PathBuf, period: Duration, max_age: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut ticks = IntervalStream::new(ticker);
        info!("Sweeping artifacts older than {:?} every {:?}", max_age, period);
        while ticks.next().await.is_some() {
            artifacts::sweep(&root, max_age).await;
        }
    })
}
