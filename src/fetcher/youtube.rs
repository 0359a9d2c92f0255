use async_trait::async_trait;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::StatusCode;
use serde_json::Value;
use std::sync::OnceLock;
use std::time::Duration;

use super::{captions, FetchError, FetchOutcome, TranscriptFetcher};
use crate::config::FetchConfig;
use crate::resolver::VideoId;
use crate::transcript::Transcript;

const DEFAULT_BASE_URL: &str = "https://www.youtube.com";
const INNERTUBE_CLIENT_NAME: &str = "ANDROID";
const INNERTUBE_CLIENT_VERSION: &str = "20.10.38";

/// Caption track advertised by the player response
#[derive(Debug, Clone, PartialEq)]
struct CaptionTrack {
    language_code: String,
    base_url: String,
    is_generated: bool,
}

/// Transcript fetcher backed by the YouTube watch page, innertube player API
/// and timed-text endpoint
pub struct YoutubeFetcher {
    client: reqwest::Client,
    base_url: String,
    languages: Vec<String>,
}

impl YoutubeFetcher {
    pub fn new(config: &FetchConfig) -> crate::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US"));
        headers.insert(USER_AGENT, HeaderValue::from_str(&config.user_agent)?);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config
                .base_url
                .as_deref()
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            languages: config.languages.clone(),
        })
    }

    /// Get the watch page HTML
    async fn fetch_watch_page(&self, id: &VideoId) -> Result<String, FetchError> {
        let url = format!("{}/watch?v={}", self.base_url, urlencoding::encode(id.as_str()));
        tracing::debug!("Fetching watch page: {}", url);

        let response = self.client.get(&url).send().await?;
        check_status(response.status(), id)?;
        let html = response.text().await?;

        if html.contains("class=\"g-recaptcha\"") {
            return Err(FetchError::RateLimited(format!(
                "provider served a captcha page for {}",
                id
            )));
        }

        Ok(html)
    }

    /// Query the innertube player endpoint for playability and caption tracks
    async fn fetch_player_response(&self, id: &VideoId, api_key: &str) -> Result<Value, FetchError> {
        let url = format!(
            "{}/youtubei/v1/player?key={}",
            self.base_url,
            urlencoding::encode(api_key)
        );
        let body = serde_json::json!({
            "context": {
                "client": {
                    "clientName": INNERTUBE_CLIENT_NAME,
                    "clientVersion": INNERTUBE_CLIENT_VERSION
                }
            },
            "videoId": id.as_str()
        });

        let response = self.client.post(&url).json(&body).send().await?;
        check_status(response.status(), id)?;

        response
            .json::<Value>()
            .await
            .map_err(|e| FetchError::Provider(format!("unparsable player response: {}", e)))
    }

    /// Download and parse one caption track
    async fn fetch_track(&self, id: &VideoId, track: &CaptionTrack) -> FetchOutcome {
        if track.base_url.contains("&exp=xpe") {
            return Err(FetchError::VideoUnavailable(
                id.to_string(),
                "caption track requires a proof-of-origin token".to_string(),
            ));
        }

        tracing::debug!(
            "Fetching {} caption track ({}) for {}",
            track.language_code,
            if track.is_generated { "generated" } else { "manual" },
            id
        );

        let response = self.client.get(&track.base_url).send().await?;
        check_status(response.status(), id)?;
        let xml = response.text().await?;

        let entries = captions::parse_timed_text(&xml)?;
        if entries.is_empty() {
            return Err(FetchError::TranscriptsDisabled(id.to_string()));
        }

        Ok(Transcript::new(id.clone(), entries)
            .with_language(track.language_code.clone(), track.is_generated))
    }
}

#[async_trait]
impl TranscriptFetcher for YoutubeFetcher {
    async fn fetch(&self, id: &VideoId) -> FetchOutcome {
        let html = self.fetch_watch_page(id).await?;
        let api_key = extract_api_key(&html)?;
        let player = self.fetch_player_response(id, &api_key).await?;

        check_playability(id, &player)?;
        let tracks = caption_tracks(id, &player)?;
        let track = select_track(id, &tracks, &self.languages)?;

        self.fetch_track(id, track).await
    }

    fn provider_name(&self) -> &'static str {
        "YouTube"
    }
}

fn check_status(status: StatusCode, id: &VideoId) -> Result<(), FetchError> {
    if status.is_success() {
        return Ok(());
    }
    match status {
        StatusCode::TOO_MANY_REQUESTS => Err(FetchError::RateLimited(format!(
            "HTTP 429 while fetching {}",
            id
        ))),
        StatusCode::NOT_FOUND | StatusCode::GONE => Err(FetchError::VideoUnavailable(
            id.to_string(),
            format!("HTTP {}", status.as_u16()),
        )),
        _ => Err(FetchError::Provider(format!(
            "HTTP {}: {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("Unknown error")
        ))),
    }
}

fn extract_api_key(html: &str) -> Result<String, FetchError> {
    static API_KEY: OnceLock<Regex> = OnceLock::new();
    let re = API_KEY.get_or_init(|| {
        Regex::new(r#""INNERTUBE_API_KEY":\s*"([a-zA-Z0-9_-]+)""#).expect("valid api key regex")
    });

    re.captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| FetchError::Provider("watch page has no innertube api key".to_string()))
}

fn check_playability(id: &VideoId, player: &Value) -> Result<(), FetchError> {
    let Some(playability) = player.get("playabilityStatus") else {
        return Ok(());
    };

    let status = playability.get("status").and_then(Value::as_str).unwrap_or("");
    if status == "OK" {
        return Ok(());
    }
    let reason = playability
        .get("reason")
        .and_then(Value::as_str)
        .unwrap_or("video is not playable")
        .to_string();

    if status == "LOGIN_REQUIRED" && reason.contains("not a bot") {
        return Err(FetchError::RateLimited(format!(
            "provider requested bot verification for {}",
            id
        )));
    }

    tracing::debug!("Video {} not playable: {} ({})", id, status, reason);
    Err(FetchError::VideoUnavailable(id.to_string(), reason))
}

fn caption_tracks(id: &VideoId, player: &Value) -> Result<Vec<CaptionTrack>, FetchError> {
    let tracks = player
        .pointer("/captions/playerCaptionsTracklistRenderer/captionTracks")
        .and_then(Value::as_array)
        .ok_or_else(|| FetchError::TranscriptsDisabled(id.to_string()))?;

    let tracks: Vec<CaptionTrack> = tracks
        .iter()
        .filter_map(|track| {
            let language_code = track.get("languageCode")?.as_str()?.to_string();
            let base_url = track.get("baseUrl")?.as_str()?.replace("&fmt=srv3", "");
            let is_generated = track.get("kind").and_then(Value::as_str) == Some("asr");
            Some(CaptionTrack {
                language_code,
                base_url,
                is_generated,
            })
        })
        .collect();

    if tracks.is_empty() {
        return Err(FetchError::TranscriptsDisabled(id.to_string()));
    }
    Ok(tracks)
}

/// Pick a track following the language preference, manual before generated
fn select_track<'a>(
    id: &VideoId,
    tracks: &'a [CaptionTrack],
    languages: &[String],
) -> Result<&'a CaptionTrack, FetchError> {
    if languages.is_empty() {
        return tracks
            .iter()
            .find(|t| !t.is_generated)
            .or_else(|| tracks.first())
            .ok_or_else(|| FetchError::TranscriptsDisabled(id.to_string()));
    }

    for lang in languages {
        let matching = |t: &&CaptionTrack| t.language_code.eq_ignore_ascii_case(lang);
        if let Some(track) = tracks
            .iter()
            .filter(matching)
            .find(|t| !t.is_generated)
            .or_else(|| tracks.iter().find(matching))
        {
            return Ok(track);
        }
    }

    Err(FetchError::NoTranscriptFound(
        id.to_string(),
        languages.join(", "),
    ))
}
