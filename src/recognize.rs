use std::path::Path;

use anyhow::{bail, ensure, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use log::debug;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;

use crate::config::{Backend, Config};

/// Value reported when recognition cannot tell how many players are left.
pub const SENTINEL: u32 = 100;

/// Label the alive counter is printed next to.
pub const ANCHOR: &str = "alive";

/// Furthest a number may sit from the anchor, in pixels.
pub const MAX_ANCHOR_DISTANCE: f64 = 100.0;

/// Which image a recognizer wants to see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    Frame,
    Crop,
}

/// Turns an image into a players-alive estimate in `1..=100`.
#[async_trait]
pub trait Recognizer: Send + Sync {
    fn input(&self) -> Input;

    /// Errors are transport or protocol failures only; an unreadable number
    /// is reported as [`SENTINEL`].
    async fn recognize(&self, image: &Path) -> Result<u32>;
}

/// Pick the recognizer the configuration asks for.
pub fn from_config(config: &Config) -> Result<Box<dyn Recognizer>> {
    let client = Client::builder()
        .timeout(config.request_timeout())
        .build()
        .context("failed to build recognition HTTP client")?;

    Ok(match config.backend() {
        Backend::Watson { url, api_key } => Box::new(WatsonRecognizer {
            client,
            url,
            api_key,
        }),
        Backend::OcrService { host, port } => Box::new(OcrServiceRecognizer {
            client,
            url: format!("http://{}:{}/process_pubg", host, port),
        }),
        Backend::None => Box::new(Unconfigured),
    })
}

/// A recognized word and the pixel position of its top-left corner.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub text: String,
    pub x: f64,
    pub y: f64,
}

impl Token {
    pub fn new(text: &str, x: f64, y: f64) -> Self {
        Token {
            text: text.to_string(),
            x,
            y,
        }
    }

    fn distance(&self, other: &Token) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Read the alive count off a page of recognized tokens.
///
/// The count is the integer token closest to the first [`ANCHOR`] token.
/// Anything doubtful (no anchor, no integers, nearest integer further than
/// [`MAX_ANCHOR_DISTANCE`], value outside `1..=100`) gives [`SENTINEL`].
pub fn nearest_metric(tokens: &[Token]) -> u32 {
    let Some(anchor) = tokens.iter().find(|t| t.text == ANCHOR) else {
        return SENTINEL;
    };

    let mut nearest: Option<(i64, f64)> = None;
    for token in tokens {
        let Some(value) = integer(&token.text) else {
            continue;
        };
        let distance = token.distance(anchor);
        // Strict comparison keeps the first of equally distant tokens.
        if nearest.map_or(true, |(_, best)| distance < best) {
            nearest = Some((value, distance));
        }
    }

    match nearest {
        Some((value, distance)) if distance <= MAX_ANCHOR_DISTANCE => normalize(value),
        _ => SENTINEL,
    }
}

/// Parse an integer token. Values too large for `i64` saturate so they still
/// take part in the nearest-token search and then fail the range check.
fn integer(text: &str) -> Option<i64> {
    let text = text.trim();
    let digits = text.strip_prefix(['-', '+']).unwrap_or(text);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(text.parse().unwrap_or(if text.starts_with('-') {
        i64::MIN
    } else {
        i64::MAX
    }))
}

/// Clamp a reported count into the valid range, falling back to [`SENTINEL`].
pub fn normalize(value: i64) -> u32 {
    if (1..=i64::from(SENTINEL)).contains(&value) {
        value as u32
    } else {
        SENTINEL
    }
}

async fn image_part(path: &Path) -> Result<Part> {
    let data = Bytes::from(
        tokio::fs::read(path)
            .await
            .with_context(|| format!("cannot read {}", path.display()))?,
    );
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image.png".to_string());
    Ok(Part::stream(data).file_name(name).mime_str("image/png")?)
}

async fn post(client: &Client, url: &str, query: &[(&str, &str)], form: Form) -> Result<String> {
    let response = client.post(url).query(query).multipart(form).send().await?;
    let status = response.status();
    ensure!(status.is_success(), "recognizer returned {}", status);
    Ok(response.text().await?)
}

/// Hosted visual recognition: full frame in, positioned words out.
pub struct WatsonRecognizer {
    client: Client,
    url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct WatsonResponse {
    #[serde(default)]
    images: Vec<WatsonImage>,
}

#[derive(Debug, Deserialize)]
struct WatsonImage {
    #[serde(default)]
    words: Vec<WatsonWord>,
}

#[derive(Debug, Deserialize)]
struct WatsonWord {
    word: String,
    location: WatsonLocation,
}

#[derive(Debug, Deserialize)]
struct WatsonLocation {
    left: f64,
    top: f64,
}

fn watson_tokens(body: &str) -> Result<Vec<Token>> {
    let parsed: WatsonResponse =
        serde_json::from_str(body).context("malformed recognition response")?;
    Ok(parsed
        .images
        .into_iter()
        .next()
        .map(|image| {
            image
                .words
                .into_iter()
                .map(|w| Token::new(&w.word, w.location.left, w.location.top))
                .collect()
        })
        .unwrap_or_default())
}

#[async_trait]
impl Recognizer for WatsonRecognizer {
    fn input(&self) -> Input {
        Input::Frame
    }

    async fn recognize(&self, image: &Path) -> Result<u32> {
        let form = Form::new().part("images_file", image_part(image).await?);
        let body = post(
            &self.client,
            &self.url,
            &[("api_key", self.api_key.as_str()), ("version", "2016-05-20")],
            form,
        )
        .await?;
        let tokens = watson_tokens(&body)?;
        debug!("Recognized {} tokens in {}", tokens.len(), image.display());
        Ok(nearest_metric(&tokens))
    }
}

/// In-cluster OCR service that reads the cropped counter directly.
pub struct OcrServiceRecognizer {
    client: Client,
    url: String,
}

#[derive(Debug, Deserialize)]
struct ServiceResponse {
    #[serde(default)]
    number: Option<serde_json::Value>,
}

fn service_metric(body: &str) -> Result<u32> {
    let parsed: ServiceResponse =
        serde_json::from_str(body).context("malformed recognition response")?;
    let value = match parsed.number {
        Some(serde_json::Value::Number(n)) => n.as_i64(),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    };
    Ok(value.map_or(SENTINEL, normalize))
}

#[async_trait]
impl Recognizer for OcrServiceRecognizer {
    fn input(&self) -> Input {
        Input::Crop
    }

    async fn recognize(&self, image: &Path) -> Result<u32> {
        let form = Form::new().part("image", image_part(image).await?);
        let body = post(&self.client, &self.url, &[], form).await?;
        service_metric(&body)
    }
}

/// Stand-in when neither backend is configured.
struct Unconfigured;

#[async_trait]
impl Recognizer for Unconfigured {
    fn input(&self) -> Input {
        Input::Frame
    }

    async fn recognize(&self, _image: &Path) -> Result<u32> {
        bail!("no recognition backend configured")
    }
}
