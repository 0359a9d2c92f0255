use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{SummaryOptions, Summarizer};
use crate::config::SummaryConfig;
use crate::Result;

#[derive(Debug, Serialize)]
struct InferenceRequest<'a> {
    inputs: &'a str,
    parameters: InferenceParameters,
    options: InferenceOptions,
}

#[derive(Debug, Serialize)]
struct InferenceParameters {
    max_length: u32,
    min_length: u32,
}

#[derive(Debug, Serialize)]
struct InferenceOptions {
    wait_for_model: bool,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InferenceResponse {
    Summaries(Vec<SummaryText>),
    Error { error: String },
}

#[derive(Debug, Deserialize)]
struct SummaryText {
    summary_text: String,
}

/// Summarizer backed by a hosted inference endpoint (t5-small by default)
pub struct HuggingFaceSummarizer {
    client: reqwest::Client,
    endpoint: String,
    api_token: Option<String>,
}

impl HuggingFaceSummarizer {
    pub fn new(config: &SummaryConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build summarization HTTP client")?;

        let api_token = std::env::var(&config.api_token_env)
            .ok()
            .filter(|t| !t.trim().is_empty());
        if api_token.is_none() {
            tracing::debug!(
                "{} is not set, calling summarization endpoint anonymously",
                config.api_token_env
            );
        }

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_token,
        })
    }
}

#[async_trait]
impl Summarizer for HuggingFaceSummarizer {
    async fn summarize_chunk(&self, input: &str, options: &SummaryOptions) -> Result<String> {
        let request = InferenceRequest {
            inputs: input,
            parameters: InferenceParameters {
                max_length: options.max_length,
                min_length: options.min_length,
            },
            options: InferenceOptions {
                wait_for_model: true,
            },
        };

        let mut builder = self.client.post(&self.endpoint).json(&request);
        if let Some(token) = &self.api_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder
            .send()
            .await
            .context("Failed to reach summarization endpoint")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read summarization response")?;

        if !status.is_success() {
            anyhow::bail!("Summarization endpoint returned HTTP {}: {}", status, body.trim());
        }

        match serde_json::from_str::<InferenceResponse>(&body)
            .context("Failed to parse summarization response")?
        {
            InferenceResponse::Summaries(summaries) => summaries
                .into_iter()
                .next()
                .map(|s| s.summary_text)
                .context("Summarization response contained no summary"),
            InferenceResponse::Error { error } => {
                anyhow::bail!("Summarization endpoint error: {}", error)
            }
        }
    }
}
