use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::retry::{Backoff, RetryPolicy};
use crate::summarize::SummaryOptions;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Upstream transcript provider settings
    pub fetch: FetchConfig,

    /// Retry/backoff for transient upstream failures
    pub retry: RetryConfig,

    /// In-memory transcript cache
    pub cache: CacheConfig,

    /// Summarization endpoint settings
    pub summary: SummaryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Provider base URL (defaults to https://www.youtube.com)
    pub base_url: Option<String>,

    /// Caption languages in order of preference
    pub languages: Vec<String>,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    /// User agent sent to the provider
    pub user_agent: String,

    /// Pause before the first upstream attempt, 0 disables it
    pub politeness_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first one
    pub max_attempts: u32,

    /// Delay before the second attempt
    pub base_delay_ms: u64,

    /// How the delay grows between attempts
    pub backoff: Backoff,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of transcripts kept, least recently used evicted first
    pub capacity: usize,

    /// Optional time-to-live for cached transcripts
    pub ttl_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryConfig {
    /// Inference endpoint for the summarization model
    pub endpoint: String,

    /// Environment variable holding the endpoint's bearer token
    pub api_token_env: String,

    /// Maximum summary length per chunk (model tokens)
    pub max_length: u32,

    /// Minimum summary length per chunk (model tokens)
    pub min_length: u32,

    /// Maximum characters sent to the model per chunk
    pub chunk_chars: usize,

    /// Text prepended to every chunk
    pub prompt_prefix: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            languages: vec!["en".to_string()],
            timeout_secs: 30,
            user_agent: format!("transcript-digest/{}", env!("CARGO_PKG_VERSION")),
            politeness_delay_ms: 1500,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 2000,
            backoff: Backoff::Exponential,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 256,
            ttl_secs: None,
        }
    }
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api-inference.huggingface.co/models/t5-small".to_string(),
            api_token_env: "HF_API_TOKEN".to_string(),
            max_length: 150,
            min_length: 30,
            chunk_chars: 400,
            prompt_prefix: "summarize: ".to_string(),
            timeout_secs: 120,
        }
    }
}

impl Config {
    /// Load configuration from `path` (or the default location), creating it if missing
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        if config_path.exists() {
            let content = fs_err::read_to_string(&config_path)
                .context("Failed to read config file")?;

            let config: Config = serde_yaml::from_str(&content)
                .context("Failed to parse config file")?;

            config.validate()?;
            tracing::debug!("Loaded configuration from {}", config_path.display());
            Ok(config)
        } else {
            let config = Self::default();
            config.save(&config_path).await?;
            tracing::info!("Wrote default configuration to {}", config_path.display());
            Ok(config)
        }
    }

    /// Save configuration to file
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs_err::create_dir_all(parent)?;
            }
        }

        let content = serde_yaml::to_string(self)
            .context("Failed to serialize config")?;

        fs_err::write(path, content)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Get configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?;

        Ok(config_dir.join("transcript-digest").join("config.yaml"))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            anyhow::bail!("retry.max_attempts must be at least 1");
        }

        if self.fetch.timeout_secs == 0 {
            anyhow::bail!("fetch.timeout_secs must be greater than 0");
        }

        if let Some(base_url) = &self.fetch.base_url {
            url::Url::parse(base_url)
                .with_context(|| format!("fetch.base_url is not a valid URL: {}", base_url))?;
        }

        if !(300..=1024).contains(&self.summary.chunk_chars) {
            anyhow::bail!(
                "summary.chunk_chars must be between 300 and 1024, got {}",
                self.summary.chunk_chars
            );
        }

        if self.summary.min_length > self.summary.max_length {
            anyhow::bail!(
                "summary.min_length ({}) exceeds summary.max_length ({})",
                self.summary.min_length,
                self.summary.max_length
            );
        }

        Ok(())
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        println!(
            "  Provider: {}",
            self.fetch.base_url.as_deref().unwrap_or("https://www.youtube.com")
        );
        println!("  Languages: {}", self.fetch.languages.join(", "));
        println!("  Politeness Delay: {}ms", self.fetch.politeness_delay_ms);
        println!(
            "  Retry: {} attempts, {:?} backoff from {}ms",
            self.retry.max_attempts, self.retry.backoff, self.retry.base_delay_ms
        );
        match self.cache.ttl_secs {
            Some(ttl) => println!("  Cache: {} entries, ttl {}s", self.cache.capacity, ttl),
            None => println!("  Cache: {} entries, no ttl", self.cache.capacity),
        }
        println!("  Summary Endpoint: {}", self.summary.endpoint);
        println!("  Summary Chunk: {} chars", self.summary.chunk_chars);
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_attempts,
            Duration::from_millis(self.retry.base_delay_ms),
            self.retry.backoff,
        )
    }

    pub fn politeness_delay(&self) -> Option<Duration> {
        match self.fetch.politeness_delay_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    pub fn cache_ttl(&self) -> Option<Duration> {
        self.cache.ttl_secs.map(Duration::from_secs)
    }

    pub fn summary_options(&self) -> SummaryOptions {
        SummaryOptions {
            max_length: self.summary.max_length,
            min_length: self.summary.min_length,
            chunk_chars: self.summary.chunk_chars,
            prompt_prefix: self.summary.prompt_prefix.clone(),
        }
    }
}
