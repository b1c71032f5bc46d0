use std::collections::HashMap;

use anyhow::{Context, Result, anyhow};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::common::truncate_for_log;

/// Client for a Pinecone-style vector index HTTP API.
#[derive(Clone)]
pub struct SearchClient {
    http: Client,
    index_host: String,
    api_key: String,
}

/// One scored match from the index. Metadata values are normalized to
/// strings at this boundary so the pipeline never handles raw JSON.
#[derive(Debug, Clone)]
pub struct SearchMatch {
    pub score: f32,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct IndexStats {
    pub total_vector_count: u64,
    pub dimension: u64,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<RawMatch>,
}

#[derive(Debug, Deserialize)]
struct RawMatch {
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: Option<HashMap<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct StatsResponse {
    #[serde(alias = "totalVectorCount", default)]
    total_vector_count: u64,
    #[serde(default)]
    dimension: u64,
}

impl SearchClient {
    pub fn new(http: Client, index_host: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http,
            index_host: index_host.into(),
            api_key: api_key.into(),
        }
    }

    /// Similarity search over the index. `specialty` becomes an equality
    /// filter on the passage metadata when present.
    pub async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        specialty: Option<&str>,
    ) -> Result<Vec<SearchMatch>> {
        let url = format!("{}/query", self.index_host.trim_end_matches('/'));
        let mut body = json!({
            "vector": vector,
            "topK": top_k,
            "includeMetadata": true,
        });
        if let Some(specialty) = specialty {
            body["filter"] = json!({ "specialty": { "$eq": specialty } });
        }

        let response = self
            .http
            .post(&url)
            .header("Api-Key", &self.api_key)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Search request failed for {url}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!(
                "Search API status {}. Body: {}",
                status,
                truncate_for_log(&body)
            ));
        }

        let body: QueryResponse = response.json().await.context("Invalid search API JSON")?;
        Ok(body
            .matches
            .into_iter()
            .map(|m| SearchMatch {
                score: m.score,
                metadata: normalize_metadata(m.metadata),
            })
            .collect())
    }

    /// Index stats for the health endpoint.
    pub async fn stats(&self) -> Result<IndexStats> {
        let url = format!(
            "{}/describe_index_stats",
            self.index_host.trim_end_matches('/')
        );
        let response = self
            .http
            .post(&url)
            .header("Api-Key", &self.api_key)
            .json(&json!({}))
            .send()
            .await
            .with_context(|| format!("Stats request failed for {url}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!(
                "Stats API status {}. Body: {}",
                status,
                truncate_for_log(&body)
            ));
        }

        let body: StatsResponse = response.json().await.context("Invalid stats API JSON")?;
        Ok(IndexStats {
            total_vector_count: body.total_vector_count,
            dimension: body.dimension,
        })
    }
}

fn normalize_metadata(metadata: Option<HashMap<String, Value>>) -> HashMap<String, String> {
    let Some(metadata) = metadata else {
        return HashMap::new();
    };
    metadata
        .into_iter()
        .map(|(k, v)| (k, value_to_string(&v)))
        .collect()
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        _ => value.to_string(),
    }
}
