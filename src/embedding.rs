use anyhow::{Context, Result, anyhow};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::common::truncate_for_log;

/// Client for an OpenAI-compatible `/embeddings` endpoint.
#[derive(Clone)]
pub struct EmbeddingClient {
    http: Client,
    api_base_url: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    #[serde(default)]
    data: Vec<EmbeddingRow>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingRow {
    embedding: Vec<f32>,
}

impl EmbeddingClient {
    pub fn new(
        http: Client,
        api_base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            http,
            api_base_url: api_base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    /// Embed one query string. A provider failure is a single error for the
    /// whole request; there are no retries here.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/embeddings", self.api_base_url.trim_end_matches('/'));
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&json!({ "input": text, "model": self.model }))
            .send()
            .await
            .with_context(|| format!("Embedding request failed for {url}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!(
                "Embedding API status {}. Body: {}",
                status,
                truncate_for_log(&body)
            ));
        }

        let body: EmbeddingsResponse = response
            .json()
            .await
            .context("Invalid embedding API JSON")?;
        let row = body
            .data
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Embedding API returned no vectors"))?;
        Ok(row.embedding)
    }
}
