use serde::{Deserialize, Serialize};
use std::fmt;

use crate::TranscriptError;

/// Length of a provider video identifier
pub const VIDEO_ID_LEN: usize = 11;

/// Canonical video identifier, always 11 characters of `[0-9A-Za-z_-]`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VideoId(String);

impl VideoId {
    /// Accept a bare identifier after checking its shape
    pub fn parse(raw: &str) -> Result<Self, TranscriptError> {
        let raw = raw.trim();
        if raw.len() == VIDEO_ID_LEN && raw.bytes().all(is_id_byte) {
            Ok(Self(raw.to_string()))
        } else {
            Err(TranscriptError::InvalidUrl(format!(
                "'{}' is not an {}-character video identifier",
                raw, VIDEO_ID_LEN
            )))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for VideoId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for VideoId {
    type Error = TranscriptError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<VideoId> for String {
    fn from(id: VideoId) -> Self {
        id.0
    }
}

fn is_id_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'-'
}

/// Read an identifier token starting at `rest`.
///
/// The token must be exactly 11 id characters; the character after it (if any)
/// must not be an id character, otherwise the candidate is longer than an id.
fn token_at(rest: &str) -> Option<&str> {
    let bytes = rest.as_bytes();
    if bytes.len() < VIDEO_ID_LEN || !bytes[..VIDEO_ID_LEN].iter().all(|b| is_id_byte(*b)) {
        return None;
    }
    match bytes.get(VIDEO_ID_LEN) {
        Some(b) if is_id_byte(*b) => None,
        _ => Some(&rest[..VIDEO_ID_LEN]),
    }
}

/// Path part of a URL without query, starting at its first `/`; empty when the
/// URL has no path after the host
fn strip_authority(url: &str) -> &str {
    let rest = match url.find("://") {
        Some(scheme_end) => &url[scheme_end + 3..],
        None => url,
    };
    rest.find('/').map_or("", |slash| &rest[slash..])
}

/// Resolve a video URL to its canonical identifier.
///
/// Supported shapes:
/// - `https://www.youtube.com/watch?v=<id>&t=30`
/// - `https://youtu.be/<id>`
/// - `https://www.youtube.com/embed/<id>`
/// - `https://www.youtube.com/v/<id>`
///
/// A `v=` query marker takes precedence over the path. Otherwise the token must
/// sit right after the final path separator, ignoring any query or fragment.
/// The host is never taken as an identifier.
pub fn resolve(url: &str) -> Result<VideoId, TranscriptError> {
    let input = url.trim();
    if input.is_empty() {
        return Err(TranscriptError::InvalidUrl("empty URL".to_string()));
    }

    for (pos, _) in input.match_indices("v=") {
        let at_param_start = pos == 0
            || matches!(input.as_bytes()[pos - 1], b'?' | b'&' | b'#' | b';');
        if !at_param_start {
            continue;
        }
        if let Some(token) = token_at(&input[pos + 2..]) {
            tracing::debug!("Resolved '{}' via query marker", input);
            return Ok(VideoId(token.to_string()));
        }
    }

    let path_end = input.find(&['?', '#'][..]).unwrap_or(input.len());
    let path = strip_authority(&input[..path_end]).trim_end_matches('/');
    if let Some(sep) = path.rfind('/') {
        if let Some(token) = token_at(&path[sep + 1..]) {
            tracing::debug!("Resolved '{}' via path segment", input);
            return Ok(VideoId(token.to_string()));
        }
    }

    Err(TranscriptError::InvalidUrl(format!(
        "no video identifier found in '{}'",
        input
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(url: &str) -> String {
        resolve(url).unwrap().to_string()
    }

    #[test]
    fn test_resolve_watch_url_with_noise() {
        assert_eq!(
            id("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=5s"),
            "dQw4w9WgXcQ"
        );
        assert_eq!(id("https://www.youtube.com/watch?v=abcdefghijk"), "abcdefghijk");
        assert_eq!(
            id("https://www.youtube.com/watch?v=abcdefghijk&t=30"),
            "abcdefghijk"
        );
        assert_eq!(
            id("https://m.youtube.com/watch?feature=share&v=abcdefghijk#t=1m"),
            "abcdefghijk"
        );
    }

    #[test]
    fn test_resolve_path_forms() {
        assert_eq!(id("https://youtu.be/abcdefghijk"), "abcdefghijk");
        assert_eq!(id("https://youtu.be/abcdefghijk?si=xyz&t=12"), "abcdefghijk");
        assert_eq!(id("https://www.youtube.com/embed/a_b-c1D2e3F"), "a_b-c1D2e3F");
        assert_eq!(id("https://www.youtube.com/v/abcdefghijk?version=3"), "abcdefghijk");
        assert_eq!(id("https://www.youtube.com/shorts/abcdefghijk/"), "abcdefghijk");
        assert_eq!(id("  https://youtu.be/abcdefghijk  "), "abcdefghijk");
        assert_eq!(id("youtu.be/abcdefghijk"), "abcdefghijk");
    }

    #[test]
    fn test_resolve_invalid_inputs() {
        for input in [
            "",
            "   ",
            "not a url",
            "https://youtu.be/short",
            "https://www.youtube.com/watch?v=abc",
            "https://youtu.be/abcdefghijkl",
            "https://www.youtube.com/watch",
            "https://example.com/?dev=abcdefghijk",
            "abcdefghijk",
            "https://abcdefghijk",
            "https://abcdefghijk/",
            "abcdefghijk/",
            "https://abcdefghijk?v=1",
        ] {
            let err = resolve(input).unwrap_err();
            assert!(
                matches!(err, TranscriptError::InvalidUrl(_)),
                "expected InvalidUrl for {:?}",
                input
            );
        }
    }

    #[test]
    fn test_query_marker_wins_over_path() {
        assert_eq!(
            id("https://www.youtube.com/embed/zzzzzzzzzzz?v=abcdefghijk"),
            "abcdefghijk"
        );
    }

    #[test]
    fn test_video_id_parse() {
        assert!(VideoId::parse("dQw4w9WgXcQ").is_ok());
        assert!(VideoId::parse("dQw4w9WgXc").is_err());
        assert!(VideoId::parse("dQw4w9WgXc!").is_err());
    }
}
