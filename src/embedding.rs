//! OpenAI embeddings adapter.
//!
//! Thin client for `POST /v1/embeddings`. The credential is checked at
//! construction, before any network call; provider errors propagate as
//! [`Error::Upstream`] and are never retried here; retry policy belongs to
//! the caller.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::{Dependency, Error, Result};

/// Texts are sent in batches of this size per API call.
const BATCH_SIZE: usize = 64;

/// Process-wide embedding client, constructed once at startup.
#[derive(Debug)]
pub struct EmbeddingClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    timeout: Duration,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
}

#[derive(Deserialize)]
struct EmbedData {
    embedding: Vec<f32>,
}

impl EmbeddingClient {
    /// Fails with a configuration error if no credential is set. Callers that
    /// want the degraded no-embeddings path check [`EmbeddingConfig::is_enabled`]
    /// before constructing.
    pub fn new(http: reqwest::Client, config: &EmbeddingConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| Error::invalid("OPENAI_API_KEY not set"))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    /// Embed a batch of texts, one vector per input in input order.
    /// Empty input returns empty output without a network call.
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/v1/embeddings", self.base_url);
        let mut all = Vec::with_capacity(texts.len());

        for batch in texts.chunks(BATCH_SIZE) {
            let resp = self
                .http
                .post(&url)
                .timeout(self.timeout)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&EmbedRequest {
                    model: &self.model,
                    input: batch,
                })
                .send()
                .await
                .map_err(|e| Error::upstream(Dependency::EmbeddingProvider, e))?;

            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(Error::upstream(
                    Dependency::EmbeddingProvider,
                    format!("HTTP {status}: {body}"),
                ));
            }

            let body: EmbedResponse = resp
                .json()
                .await
                .map_err(|e| Error::upstream(Dependency::EmbeddingProvider, e))?;

            all.extend(body.data.into_iter().map(|d| d.embedding));
        }

        if all.len() != texts.len() {
            return Err(Error::upstream(
                Dependency::EmbeddingProvider,
                format!("expected {} embeddings, got {}", texts.len(), all.len()),
            ));
        }

        Ok(all)
    }

    /// Embed a single query text.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed(std::slice::from_ref(&text.to_string())).await?;
        vectors.pop().ok_or_else(|| {
            Error::upstream(Dependency::EmbeddingProvider, "empty embedding response")
        })
    }
}
