use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::task::JoinSet;
use tokio::time::{timeout_at, Instant};

use crate::pipeline::{self, Stages};
use crate::state::{rank, PublishedState, Ranking};
use crate::twitch::CandidateSource;

/// Everything one cycle needs; cheap to clone into each scheduled run.
#[derive(Clone)]
pub struct Orchestrator {
    pub source: Arc<dyn CandidateSource>,
    pub stages: Stages,
    pub state: Arc<PublishedState>,
    /// Listening window for pipeline results, measured from cycle start.
    pub grace: Duration,
}

impl Orchestrator {
    /// Resolve candidates, run every pipeline concurrently until the grace
    /// period ends, then rank and publish whatever succeeded.
    ///
    /// Pipelines still running at the deadline are aborted and their results
    /// never counted. An empty ranking leaves the published state alone.
    pub async fn run_cycle(&self, cycle: u64) -> Ranking {
        let deadline = Instant::now() + self.grace;

        let candidates = match timeout_at(deadline, self.source.list()).await {
            Ok(candidates) => candidates,
            Err(_) => {
                warn!("Candidate lookup outlasted the cycle deadline");
                Vec::new()
            }
        };
        info!("Cycle {}: evaluating {} streams", cycle, candidates.len());

        let mut pipelines = JoinSet::new();
        for (index, id) in candidates.into_iter().enumerate() {
            let stages = self.stages.clone();
            pipelines.spawn(async move {
                let entry = pipeline::run_logged(&stages, &id, cycle).await;
                (index, entry)
            });
        }

        let mut finished = Vec::new();
        loop {
            match timeout_at(deadline, pipelines.join_next()).await {
                Ok(Some(Ok((index, Some(entry))))) => finished.push((index, entry)),
                Ok(Some(Ok((_, None)))) => {}
                Ok(Some(Err(err))) => warn!("Pipeline task ended abnormally: {}", err),
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        "Cycle deadline reached with {} pipelines still running",
                        pipelines.len()
                    );
                    pipelines.abort_all();
                    break;
                }
            }
        }

        // Completion order is arbitrary; ties rank in candidate order.
        finished.sort_by_key(|(index, _)| *index);
        let ranking = rank(finished.into_iter().map(|(_, entry)| entry).collect());

        if self.state.publish(ranking.clone()) {
            debug!("Ranking: {:?}", ranking);
            info!("Lowest stream: {}", ranking[0].id);
        } else {
            info!("Empty ranking, not switching");
        }
        ranking
    }
}
