use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::resolver::VideoId;

/// One timed caption unit as delivered by the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    /// Caption text
    pub text: String,

    /// Offset from the start of the video
    #[serde(with = "seconds")]
    pub start: Duration,

    /// How long the caption is shown
    #[serde(with = "seconds")]
    pub duration: Duration,
}

impl TranscriptEntry {
    pub fn new(text: impl Into<String>, start: Duration, duration: Duration) -> Self {
        Self {
            text: text.into(),
            start,
            duration,
        }
    }
}

/// Assembled transcript for one video.
///
/// `entries` and `text` are only set by [`Transcript::new`], so `text` always
/// matches the entries it was flattened from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "TranscriptRecord")]
pub struct Transcript {
    /// Identifier the transcript belongs to
    pub video_id: VideoId,

    /// Language code of the caption track, if known
    pub language_code: Option<String>,

    /// Whether the track was produced by speech recognition
    pub is_generated: bool,

    /// Entries in provider order
    entries: Vec<TranscriptEntry>,

    /// Entry texts joined by a single space
    text: String,

    /// When the transcript was retrieved
    pub fetched_at: chrono::DateTime<chrono::Utc>,
}

impl Transcript {
    /// Assemble a transcript, deriving the flattened text from `entries`
    pub fn new(video_id: VideoId, entries: Vec<TranscriptEntry>) -> Self {
        let text = flatten(&entries);
        Self {
            video_id,
            language_code: None,
            is_generated: false,
            entries,
            text,
            fetched_at: chrono::Utc::now(),
        }
    }

    pub fn with_language(mut self, language_code: impl Into<String>, is_generated: bool) -> Self {
        self.language_code = Some(language_code.into());
        self.is_generated = is_generated;
        self
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    /// Entry texts joined by a single space
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total covered time, measured to the end of the last entry
    pub fn duration(&self) -> Duration {
        self.entries
            .iter()
            .map(|e| e.start + e.duration)
            .max()
            .unwrap_or_default()
    }
}

/// Serialized form; `text` is ignored on input and rebuilt from the entries
#[derive(Deserialize)]
struct TranscriptRecord {
    video_id: VideoId,
    #[serde(default)]
    language_code: Option<String>,
    #[serde(default)]
    is_generated: bool,
    entries: Vec<TranscriptEntry>,
    fetched_at: chrono::DateTime<chrono::Utc>,
}

impl From<TranscriptRecord> for Transcript {
    fn from(record: TranscriptRecord) -> Self {
        let mut transcript = Transcript::new(record.video_id, record.entries);
        transcript.language_code = record.language_code;
        transcript.is_generated = record.is_generated;
        transcript.fetched_at = record.fetched_at;
        transcript
    }
}

/// Join entry texts with one space, in order, without a trailing separator
pub fn flatten(entries: &[TranscriptEntry]) -> String {
    entries
        .iter()
        .map(|e| e.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

mod seconds {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs)
            .map_err(|_| serde::de::Error::custom(format!("invalid duration: {}", secs)))
    }
}
