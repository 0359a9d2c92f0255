use anyhow::Result;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use transcript_digest::cli::{Cli, Commands};
use transcript_digest::config::Config;
use transcript_digest::pipeline::TranscriptPipeline;
use transcript_digest::{output, resolver, utils, TranscriptError};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "transcript_digest=debug,transcriptor=debug"
    } else if cli.quiet {
        "transcript_digest=warn"
    } else {
        "transcript_digest=info"
    };

    // Logs go to stderr so stdout carries only command output
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(err) = run(cli).await {
        eprintln!("{} {:#}", console::style("error:").red().bold(), err);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Resolve { url } => {
            let id = resolver::resolve(&url)?;
            println!("{}", id);
        }
        Commands::Transcript {
            url,
            output,
            format,
            timestamps,
            no_throttle,
        } => {
            let config = Config::load(cli.config.as_deref()).await?;
            let pipeline = build_pipeline(&config, no_throttle)?;

            tracing::info!("Fetching transcript for URL: {}", url);
            let transcript = with_spinner(
                cli.quiet,
                "Fetching transcript...",
                &pipeline,
                pipeline.get_transcript(&url),
            )
            .await?;

            tracing::info!(
                "Transcript for {} covers {} in {} captions",
                transcript.video_id,
                utils::format_duration(transcript.duration()),
                transcript.entries().len()
            );

            let content = output::format_transcript(&transcript, &format, timestamps)?;
            emit(&content, output.as_deref())?;
        }
        Commands::Summarize {
            url,
            output,
            format,
            max_length,
            min_length,
            chunk_chars,
            no_throttle,
        } => {
            let config = Config::load(cli.config.as_deref()).await?;
            let pipeline = build_pipeline(&config, no_throttle)?;

            let mut options = config.summary_options();
            if let Some(max_length) = max_length {
                options.max_length = max_length;
            }
            if let Some(min_length) = min_length {
                options.min_length = min_length;
            }
            if let Some(chunk_chars) = chunk_chars {
                options.chunk_chars = chunk_chars as usize;
            }
            if options.min_length > options.max_length {
                anyhow::bail!(
                    "--min-length ({}) must not exceed --max-length ({})",
                    options.min_length,
                    options.max_length
                );
            }

            tracing::info!("Summarizing transcript for URL: {}", url);
            let digest = with_spinner(
                cli.quiet,
                "Fetching and summarizing transcript...",
                &pipeline,
                pipeline.summarize(&url, Some(&options)),
            )
            .await?;

            let content = output::format_digest(&digest, &format)?;
            emit(&content, output.as_deref())?;
        }
        Commands::Config { show } => {
            let config = Config::load(cli.config.as_deref()).await?;
            if show {
                config.display();
            } else {
                let path = match cli.config {
                    Some(path) => path,
                    None => Config::config_path()?,
                };
                println!("Configuration file: {}", path.display());
                println!("Edit it to change provider, retry, cache and summary settings.");
            }
        }
    }

    Ok(())
}

fn build_pipeline(config: &Config, no_throttle: bool) -> Result<TranscriptPipeline> {
    let pipeline = TranscriptPipeline::from_config(config)?;
    Ok(if no_throttle {
        pipeline.with_politeness_delay(None)
    } else {
        pipeline
    })
}

/// Drive `task` behind a spinner; Ctrl-C stops retries and reports cancellation
async fn with_spinner<T>(
    quiet: bool,
    message: &'static str,
    pipeline: &TranscriptPipeline,
    task: impl Future<Output = Result<T, TranscriptError>>,
) -> Result<T> {
    let progress = if quiet {
        ProgressBar::hidden()
    } else {
        let progress = ProgressBar::new_spinner();
        progress.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
        progress.enable_steady_tick(Duration::from_millis(100));
        progress
    };
    progress.set_message(message);

    let result = tokio::select! {
        result = task => result,
        _ = tokio::signal::ctrl_c() => {
            pipeline.shutdown();
            Err(TranscriptError::Cancelled("interrupted".to_string()))
        }
    };

    progress.finish_and_clear();
    Ok(result?)
}

fn emit(content: &str, path: Option<&Path>) -> Result<()> {
    match path {
        Some(path) => {
            output::save_to_file(content, path)?;
            println!("Output saved to: {}", path.display());
        }
        None => output::print_to_console(content),
    }
    Ok(())
}
