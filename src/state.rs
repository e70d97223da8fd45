use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const PLAYER_URL: &str = "https://player.twitch.tv/?channel=";

/// One stream's result for a cycle.
///
/// Serialized with the field names the landing page reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedEntry {
    #[serde(rename = "stream_name")]
    pub id: String,
    #[serde(rename = "alive")]
    pub metric: u32,
    #[serde(rename = "stream_url")]
    pub url: String,
    #[serde(rename = "updated")]
    pub observed_at: DateTime<Utc>,
}

impl RankedEntry {
    pub fn new(id: &str, metric: u32) -> Self {
        RankedEntry {
            id: id.to_string(),
            metric,
            url: format!("{}{}", PLAYER_URL, id),
            observed_at: Utc::now(),
        }
    }

    /// Shown until the first cycle publishes something.
    pub fn placeholder() -> Self {
        RankedEntry {
            id: "foo".to_string(),
            metric: 100,
            url: "https://example.com".to_string(),
            observed_at: Utc::now(),
        }
    }
}

/// Entries ordered ascending by metric.
pub type Ranking = Vec<RankedEntry>;

/// Sort entries by metric, keeping the incoming order for ties.
pub fn rank(mut entries: Vec<RankedEntry>) -> Ranking {
    entries.sort_by_key(|e| e.metric);
    entries
}

#[derive(Debug, Clone)]
struct Snapshot {
    leader: RankedEntry,
    all: Ranking,
}

/// The latest published ranking.
///
/// Each publish swaps in a whole new snapshot, so a reader holds either the
/// old cycle or the new one, never a mix of both.
#[derive(Debug)]
pub struct PublishedState {
    current: RwLock<Arc<Snapshot>>,
}

impl Default for PublishedState {
    fn default() -> Self {
        Self::new()
    }
}

impl PublishedState {
    pub fn new() -> Self {
        let leader = RankedEntry::placeholder();
        PublishedState {
            current: RwLock::new(Arc::new(Snapshot {
                all: vec![leader.clone()],
                leader,
            })),
        }
    }

    /// Replace the snapshot with `ranking`. An empty ranking is ignored and
    /// `false` is returned.
    pub fn publish(&self, ranking: Ranking) -> bool {
        let Some(leader) = ranking.first().cloned() else {
            return false;
        };
        let next = Arc::new(Snapshot {
            leader,
            all: ranking,
        });
        // The lock only guards the pointer swap; a poisoned lock still holds a
        // complete snapshot.
        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        *current = next;
        true
    }

    pub fn leader(&self) -> RankedEntry {
        self.snapshot().leader.clone()
    }

    pub fn all(&self) -> Ranking {
        self.snapshot().all.clone()
    }

    fn snapshot(&self) -> Arc<Snapshot> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_with_placeholder() {
        let state = PublishedState::new();
        assert_eq!(state.leader().id, "foo");
        assert_eq!(state.leader().metric, 100);
        assert_eq!(state.all().len(), 1);
    }

    #[test]
    fn rank_is_ascending_and_stable() {
        let ranking = rank(vec![
            RankedEntry::new("a", 40),
            RankedEntry::new("b", 7),
            RankedEntry::new("c", 40),
            RankedEntry::new("d", 100),
            RankedEntry::new("e", 7),
        ]);
        let ids: Vec<&str> = ranking.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["b", "e", "a", "c", "d"]);
        assert!(ranking.windows(2).all(|w| w[0].metric <= w[1].metric));
    }

    #[test]
    fn publish_replaces_whole_snapshot() {
        let state = PublishedState::new();
        assert!(state.publish(rank(vec![
            RankedEntry::new("alice", 12),
            RankedEntry::new("bob", 3),
        ])));
        assert_eq!(state.leader().id, "bob");
        assert_eq!(state.all().len(), 2);
        assert_eq!(state.leader().url, "https://player.twitch.tv/?channel=bob");
    }

    #[test]
    fn empty_publish_keeps_previous() {
        let state = PublishedState::new();
        state.publish(vec![RankedEntry::new("alice", 12)]);
        let before = state.all();

        assert!(!state.publish(Vec::new()));
        assert_eq!(state.all(), before);
        assert_eq!(state.leader().id, "alice");
    }

    #[test]
    fn serializes_with_page_field_names() {
        let value = serde_json::to_value(RankedEntry::new("alice", 9)).unwrap();
        assert_eq!(value["stream_name"], "alice");
        assert_eq!(value["alive"], 9);
        assert_eq!(value["stream_url"], "https://player.twitch.tv/?channel=alice");
        assert!(value["updated"].is_string());
    }
}
