use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// Runtime settings, read from flags or the environment.
///
/// Credentials and filters are optional: leaving one out disables whatever
/// depends on it rather than refusing to start.
#[derive(Parser, Debug, Clone)]
#[command(name = "rotisserie")]
#[command(about = "Surfaces the live stream with the fewest players left alive")]
#[command(version)]
pub struct Config {
    /// Client id sent to the stream directory
    #[arg(long, env = "clientID")]
    pub client_id: Option<String>,

    /// OAuth token handed to the recorder
    #[arg(long, env = "token")]
    pub token: Option<String>,

    /// Space separated channel names to keep
    #[arg(long, env = "ROTISSERIE_WHITELIST")]
    pub whitelist: Option<String>,

    /// Space separated channel names to drop
    #[arg(long, env = "ROTISSERIE_BLACKLIST")]
    pub blacklist: Option<String>,

    #[arg(long, env = "ROTISSERIE_OCR_SERVICE_HOST")]
    pub ocr_service_host: Option<String>,

    #[arg(long, env = "ROTISSERIE_OCR_SERVICE_PORT")]
    pub ocr_service_port: Option<u16>,

    #[arg(long, env = "ROTISSERIE_WATSON_VR_API_KEY")]
    pub watson_api_key: Option<String>,

    #[arg(
        long,
        env = "ROTISSERIE_WATSON_URL",
        default_value = "https://gateway-a.watsonplatform.net/visual-recognition/api/v3/recognize_text"
    )]
    pub watson_url: String,

    #[arg(
        long,
        env = "ROTISSERIE_DIRECTORY_URL",
        default_value = "https://api.twitch.tv/kraken/streams"
    )]
    pub directory_url: String,

    #[arg(long, env = "ROTISSERIE_GAME", default_value = "PLAYERUNKNOWN'S BATTLEGROUNDS")]
    pub game: String,

    #[arg(long, env = "ROTISSERIE_LANGUAGE", default_value = "en")]
    pub language: String,

    #[arg(long, env = "ROTISSERIE_LIMIT", default_value = "20")]
    pub limit: u32,

    /// Stream quality requested from the recorder
    #[arg(long, env = "ROTISSERIE_QUALITY", default_value = "720p")]
    pub quality: String,

    /// Length of each recorded clip
    #[arg(
        long,
        env = "ROTISSERIE_CLIP_SECONDS",
        default_value = "4",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub clip_seconds: u64,

    /// How long a cycle listens for pipeline results, measured from cycle start
    #[arg(
        long,
        env = "ROTISSERIE_GRACE_SECONDS",
        default_value = "25",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub grace_seconds: u64,

    /// Time between cycle starts
    #[arg(
        long,
        env = "ROTISSERIE_PERIOD_SECONDS",
        default_value = "30",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub period_seconds: u64,

    /// Timeout applied to every outbound HTTP request
    #[arg(
        long,
        env = "ROTISSERIE_REQUEST_TIMEOUT_SECONDS",
        default_value = "10",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub request_timeout_seconds: u64,

    #[arg(
        long,
        env = "ROTISSERIE_EXTRACT_TIMEOUT_SECONDS",
        default_value = "10",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub extract_timeout_seconds: u64,

    /// Artifacts older than this are removed by the sweeper
    #[arg(long, env = "ROTISSERIE_ARTIFACT_MAX_AGE_SECONDS", default_value = "600")]
    pub artifact_max_age_seconds: u64,

    #[arg(long, env = "ROTISSERIE_STREAMS_DIR", default_value = "./streams")]
    pub streams_dir: PathBuf,

    #[arg(long, env = "ROTISSERIE_PUBLIC_DIR", default_value = "./public")]
    pub public_dir: PathBuf,

    #[arg(short, long, env = "PORT", default_value = "3000")]
    pub port: u16,
}

/// Which text recognition service a cycle talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    /// Hosted recognizer fed the full frame; the metric comes from the nearest-token heuristic.
    Watson { url: String, api_key: String },
    /// In-cluster microservice fed the cropped frame; it answers with the number directly.
    OcrService { host: String, port: u16 },
    None,
}

impl Config {
    pub fn allow_list(&self) -> Option<Vec<String>> {
        split_list(self.whitelist.as_deref())
    }

    pub fn deny_list(&self) -> Option<Vec<String>> {
        split_list(self.blacklist.as_deref())
    }

    pub fn backend(&self) -> Backend {
        if let Some(key) = self.watson_api_key.as_deref().filter(|k| !k.trim().is_empty()) {
            return Backend::Watson {
                url: self.watson_url.clone(),
                api_key: key.to_string(),
            };
        }
        match (self.ocr_service_host.as_deref(), self.ocr_service_port) {
            (Some(host), Some(port)) if !host.trim().is_empty() => Backend::OcrService {
                host: host.to_string(),
                port,
            },
            _ => Backend::None,
        }
    }

    pub fn clip_length(&self) -> Duration {
        Duration::from_secs(self.clip_seconds)
    }

    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_seconds)
    }

    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn extract_timeout(&self) -> Duration {
        Duration::from_secs(self.extract_timeout_seconds)
    }

    pub fn artifact_max_age(&self) -> Duration {
        Duration::from_secs(self.artifact_max_age_seconds)
    }
}

/// A blank list means "not configured", not "match nothing".
fn split_list(raw: Option<&str>) -> Option<Vec<String>> {
    let names: Vec<String> = raw?.split_whitespace().map(str::to_string).collect();
    if names.is_empty() {
        None
    } else {
        Some(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        let mut argv = vec!["rotisserie"];
        argv.extend_from_slice(args);
        Config::try_parse_from(argv).unwrap()
    }

    #[test]
    fn lists_split_on_whitespace() {
        let config = parse(&["--whitelist", "alice  bob", "--blacklist", "carol"]);
        assert_eq!(config.allow_list(), Some(vec!["alice".to_string(), "bob".to_string()]));
        assert_eq!(config.deny_list(), Some(vec!["carol".to_string()]));
    }

    #[test]
    fn blank_list_is_absent() {
        let config = parse(&["--whitelist", "   "]);
        assert_eq!(config.allow_list(), None);
    }

    #[test]
    fn zero_durations_are_rejected() {
        for flag in [
            "--period-seconds",
            "--grace-seconds",
            "--clip-seconds",
            "--request-timeout-seconds",
            "--extract-timeout-seconds",
        ] {
            assert!(Config::try_parse_from(["rotisserie", flag, "0"]).is_err(), "{}", flag);
        }
        assert_eq!(parse(&["--period-seconds", "1"]).period(), Duration::from_secs(1));
    }

    #[test]
    fn watson_key_wins_over_service() {
        let config = parse(&[
            "--watson-api-key",
            "k",
            "--ocr-service-host",
            "10.0.0.1",
            "--ocr-service-port",
            "3001",
        ]);
        assert!(matches!(config.backend(), Backend::Watson { api_key, .. } if api_key == "k"));
    }

    #[test]
    fn service_needs_host_and_port() {
        let config = parse(&["--ocr-service-host", "10.0.0.1"]);
        assert_eq!(config.backend(), Backend::None);

        let config = parse(&["--ocr-service-host", "10.0.0.1", "--ocr-service-port", "3001"]);
        assert_eq!(
            config.backend(),
            Backend::OcrService {
                host: "10.0.0.1".to_string(),
                port: 3001
            }
        );
    }
}
