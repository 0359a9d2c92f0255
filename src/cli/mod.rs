use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "transcriptor",
    about = "Transcript Digest - Fetch and summarize YouTube video transcripts",
    version,
    long_about = "Resolves YouTube URLs to video identifiers, retrieves their caption transcripts with retry and backoff for transient provider failures, and optionally condenses them through a summarization endpoint."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file (defaults to ./config.yaml or the user config directory)
    #[arg(short, long, global = true, value_name = "FILE", env = "TRANSCRIPTOR_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the transcript of a video
    Transcript {
        /// Video URL (watch, youtu.be, embed or /v/ links)
        #[arg(value_name = "URL")]
        url: String,

        /// Output file path (prints to console if not specified)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Prefix each caption with its start time
        #[arg(long)]
        timestamps: bool,

        /// Skip the politeness delay before contacting the provider
        #[arg(long)]
        no_throttle: bool,
    },

    /// Fetch a transcript and print a summary of it
    Summarize {
        /// Video URL (watch, youtu.be, embed or /v/ links)
        #[arg(value_name = "URL")]
        url: String,

        /// Output file path (prints to console if not specified)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Maximum summary length per chunk
        #[arg(long, value_name = "N")]
        max_length: Option<u32>,

        /// Minimum summary length per chunk
        #[arg(long, value_name = "N")]
        min_length: Option<u32>,

        /// Characters per chunk sent to the model (300-1024)
        #[arg(long, value_name = "N", value_parser = clap::value_parser!(u16).range(300..=1024))]
        chunk_chars: Option<u16>,

        /// Skip the politeness delay before contacting the provider
        #[arg(long)]
        no_throttle: bool,
    },

    /// Print the video identifier a URL resolves to
    Resolve {
        #[arg(value_name = "URL")]
        url: String,
    },

    /// Show or initialise the configuration file
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,
    },
}

#[derive(ValueEnum, Clone, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// Plain text
    Text,
    /// JSON with caption timings
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}
