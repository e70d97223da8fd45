use anyhow::{ensure, Context, Result};
use async_trait::async_trait;
use log::{debug, error, info};
use reqwest::Client;
use serde::Deserialize;

use crate::config::Config;

/// Produces this cycle's candidate stream ids.
#[async_trait]
pub trait CandidateSource: Send + Sync {
    /// Never fails: lookup problems are logged and give an empty list.
    async fn list(&self) -> Vec<String>;
}

#[derive(Debug, Deserialize)]
struct StreamsResponse {
    streams: Vec<Stream>,
}

#[derive(Debug, Deserialize)]
struct Stream {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    name: String,
    #[serde(default)]
    mature: Option<bool>,
}

/// Looks up live streams for one game through the Twitch directory API.
pub struct TwitchDirectory {
    client: Client,
    url: String,
    client_id: Option<String>,
    game: String,
    language: String,
    limit: u32,
    allow: Option<Vec<String>>,
    deny: Option<Vec<String>>,
}

impl TwitchDirectory {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .context("failed to build directory HTTP client")?;

        Ok(TwitchDirectory {
            client,
            url: config.directory_url.clone(),
            client_id: config.client_id.clone(),
            game: config.game.clone(),
            language: config.language.clone(),
            limit: config.limit,
            allow: config.allow_list(),
            deny: config.deny_list(),
        })
    }

    async fn fetch(&self) -> Result<StreamsResponse> {
        let limit = self.limit.to_string();
        let mut request = self.client.get(&self.url).query(&[
            ("game", self.game.as_str()),
            ("language", self.language.as_str()),
            ("stream_type", "live"),
            ("limit", limit.as_str()),
        ]);
        if let Some(id) = &self.client_id {
            request = request.header("Client-ID", id);
        }

        let response = request.send().await?;
        let status = response.status();
        debug!("Directory lookup status: {}", status);
        ensure!(status.is_success(), "directory returned {}", status);

        let body = response.text().await?;
        serde_json::from_str(&body).context("malformed directory response")
    }
}

#[async_trait]
impl CandidateSource for TwitchDirectory {
    async fn list(&self) -> Vec<String> {
        match self.fetch().await {
            Ok(response) => {
                let ids = filter_candidates(response, self.allow.as_deref(), self.deny.as_deref());
                info!("Candidates this cycle: {:?}", ids);
                ids
            }
            Err(err) => {
                error!("Stream directory lookup failed: {:#}", err);
                Vec::new()
            }
        }
    }
}

/// Restricted streams go first, then the allow-list, then the deny-list.
fn filter_candidates(
    response: StreamsResponse,
    allow: Option<&[String]>,
    deny: Option<&[String]>,
) -> Vec<String> {
    response
        .streams
        .into_iter()
        .map(|s| s.channel)
        .filter(|c| c.mature == Some(false))
        .filter(|c| allow.map_or(true, |names| names.contains(&c.name)))
        .filter(|c| deny.map_or(true, |names| !names.contains(&c.name)))
        .map(|c| c.name)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(json: &str) -> StreamsResponse {
        serde_json::from_str(json).unwrap()
    }

    fn alice_and_carol() -> StreamsResponse {
        response(
            r#"{"streams": [
                {"channel": {"name": "alice", "display_name": "Alice", "mature": false}},
                {"channel": {"name": "carol", "display_name": "Carol", "mature": false}}
            ]}"#,
        )
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn no_lists_keeps_everything() {
        assert_eq!(filter_candidates(alice_and_carol(), None, None), names(&["alice", "carol"]));
    }

    #[test]
    fn allow_list_intersects() {
        let allow = names(&["alice", "bob"]);
        assert_eq!(filter_candidates(alice_and_carol(), Some(&allow), None), names(&["alice"]));
    }

    #[test]
    fn deny_list_subtracts() {
        let deny = names(&["carol"]);
        assert_eq!(filter_candidates(alice_and_carol(), None, Some(&deny)), names(&["alice"]));
    }

    #[test]
    fn mature_and_unflagged_streams_are_dropped() {
        let parsed = response(
            r#"{"streams": [
                {"channel": {"name": "adult", "mature": true}},
                {"channel": {"name": "unknown", "mature": null}},
                {"channel": {"name": "missing"}},
                {"channel": {"name": "kid", "mature": false}}
            ]}"#,
        );
        assert_eq!(filter_candidates(parsed, None, None), names(&["kid"]));
    }

    #[tokio::test]
    async fn unreachable_directory_yields_empty_list() {
        let config = <Config as clap::Parser>::try_parse_from([
            "rotisserie",
            "--directory-url",
            "http://127.0.0.1:1/streams",
            "--request-timeout-seconds",
            "1",
        ])
        .unwrap();
        let directory = TwitchDirectory::new(&config).unwrap();
        assert!(directory.list().await.is_empty());
    }
}
