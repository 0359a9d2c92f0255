//! Timed-text caption XML parsing.
//!
//! The provider serves captions as
//! `<transcript><text start="0.0" dur="1.5">Hello &amp;amp; welcome</text>...</transcript>`.
//! Cue text is entity-escaped once by XML and frequently a second time by the
//! provider, so it is unescaped twice. Inline markup such as `<font>` is dropped.

use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;

use super::FetchError;
use crate::transcript::TranscriptEntry;

fn cue_regex() -> &'static Regex {
    static CUE: OnceLock<Regex> = OnceLock::new();
    CUE.get_or_init(|| {
        Regex::new(r#"(?s)<text\b([^>]*?)(?:/>|>(.*?)</text>)"#).expect("valid cue regex")
    })
}

fn attr_regex() -> &'static Regex {
    static ATTR: OnceLock<Regex> = OnceLock::new();
    ATTR.get_or_init(|| {
        Regex::new(r#"(\w+)\s*=\s*"([^"]*)""#).expect("valid attribute regex")
    })
}

fn tag_regex() -> &'static Regex {
    static TAG: OnceLock<Regex> = OnceLock::new();
    TAG.get_or_init(|| Regex::new(r"<[^>]*>").expect("valid tag regex"))
}

/// Parse caption XML into entries, keeping provider order and dropping empty cues
pub fn parse_timed_text(xml: &str) -> Result<Vec<TranscriptEntry>, FetchError> {
    if !xml.contains("<transcript") && !xml.contains("<text") {
        return Err(FetchError::Provider(
            "caption response is not timed-text XML".to_string(),
        ));
    }

    let mut entries = Vec::new();
    for cue in cue_regex().captures_iter(xml) {
        let attrs = cue.get(1).map(|m| m.as_str()).unwrap_or("");
        let body = cue.get(2).map(|m| m.as_str()).unwrap_or("");

        let mut start = None;
        let mut dur = None;
        for attr in attr_regex().captures_iter(attrs) {
            match &attr[1] {
                "start" => start = Some(parse_seconds(&attr[2])?),
                "dur" => dur = Some(parse_seconds(&attr[2])?),
                _ => {}
            }
        }

        let start = start.ok_or_else(|| {
            FetchError::Provider("caption cue is missing its start attribute".to_string())
        })?;

        let text = unescape(&unescape(body));
        let text = tag_regex().replace_all(&text, "");
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if text.is_empty() {
            continue;
        }

        entries.push(TranscriptEntry::new(text, start, dur.unwrap_or_default()));
    }

    Ok(entries)
}

fn parse_seconds(raw: &str) -> Result<Duration, FetchError> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .and_then(|s| Duration::try_from_secs_f64(s).ok())
        .ok_or_else(|| FetchError::Provider(format!("invalid caption timestamp '{}'", raw)))
}

/// Decode named and numeric character references
pub fn unescape(input: &str) -> String {
    if !input.contains('&') {
        return input.to_string();
    }

    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        match tail.find(';').filter(|end| *end <= 10) {
            Some(end) => match decode_entity(&tail[1..end]) {
                Some(c) => {
                    out.push(c);
                    rest = &tail[end + 1..];
                }
                None => {
                    out.push('&');
                    rest = &tail[1..];
                }
            },
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => {
            let code = if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok()?
            } else {
                name.strip_prefix('#')?.parse::<u32>().ok()?
            };
            char::from_u32(code)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timed_text() {
        let xml = r##"<?xml version="1.0" encoding="utf-8" ?><transcript>
<text start="0.5" dur="1.54">Hey there</text>
<text start="2.04" dur="3">how&amp;#39;s it   going</text>
<text start="5.1" dur="0.2">   </text>
<text start="6" dur="1"><font color="#CCCCCC">Tom &amp;amp; Jerry</font></text>
</transcript>"##;

        let entries = parse_timed_text(xml).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].text, "Hey there");
        assert_eq!(entries[0].start, Duration::from_secs_f64(0.5));
        assert_eq!(entries[0].duration, Duration::from_secs_f64(1.54));
        assert_eq!(entries[1].text, "how's it going");
        assert_eq!(entries[2].text, "Tom & Jerry");
    }

    #[test]
    fn test_self_closing_cue_is_skipped() {
        let xml = r#"<transcript><text start="1" dur="1"/><text start="2" dur="1">ok</text></transcript>"#;
        let entries = parse_timed_text(xml).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].text, "ok");
    }

    #[test]
    fn test_rejects_bad_timestamps() {
        for start in ["1e30", "-1", "NaN", "inf", "soon"] {
            let xml = format!(r#"<transcript><text start="{}" dur="1">hi</text></transcript>"#, start);
            let err = parse_timed_text(&xml).unwrap_err();
            assert!(
                matches!(&err, FetchError::Provider(reason) if reason.contains("invalid caption timestamp")),
                "unexpected result for start={}: {:?}",
                start,
                err
            );
        }

        let xml = r#"<transcript><text start="1" dur="1e300">hi</text></transcript>"#;
        assert!(parse_timed_text(xml).is_err());
    }

    #[test]
    fn test_rejects_non_caption_payload() {
        let err = parse_timed_text("<html><body>nope</body></html>").unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape("a &lt;b&gt; &#65;&#x42; &unknown; & c"), "a <b> AB &unknown; & c");
        assert_eq!(unescape("plain"), "plain");
    }
}
