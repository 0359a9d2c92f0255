use anyhow::Result;
use std::path::Path;

use crate::cli::OutputFormat;
use crate::pipeline::Digest;
use crate::transcript::Transcript;
use crate::utils::format_timestamp;

/// Render a transcript in the requested format
pub fn format_transcript(
    transcript: &Transcript,
    format: &OutputFormat,
    include_timestamps: bool,
) -> Result<String> {
    match format {
        OutputFormat::Text if include_timestamps => Ok(transcript
            .entries()
            .iter()
            .map(|e| format!("[{}] {}", format_timestamp(e.start), e.text))
            .collect::<Vec<_>>()
            .join("\n")),
        OutputFormat::Text => Ok(transcript.text().to_string()),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(transcript)?),
    }
}

/// Render a summary together with the transcript it came from
pub fn format_digest(digest: &Digest, format: &OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(digest.summary.clone()),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(&serde_json::json!({
            "video_id": digest.transcript.video_id,
            "language_code": digest.transcript.language_code,
            "summary": digest.summary,
            "transcript_chars": digest.transcript.text().chars().count(),
        }))?),
    }
}

/// Save rendered output to file
pub fn save_to_file(content: &str, path: &Path) -> Result<()> {
    fs_err::write(path, content)?;
    Ok(())
}

/// Print rendered output to console
pub fn print_to_console(content: &str) {
    println!("{}", content);
}
