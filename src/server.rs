use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};

use crate::common::truncate_for_log;
use crate::embedding::EmbeddingClient;
use crate::pipeline::{self, CodeBuckets, Passage, RankedCode};
use crate::search::{SearchClient, SearchMatch};
use crate::terminology::Terminology;

/// Raw search fan-out cap. We over-fetch relative to `top_k` because the
/// exclusion filter and dedup shrink the candidate pool downstream.
const MAX_SEARCH_FAN_OUT: usize = 100;

const BACKEND_TAG: &str = "codes_backend_v2";

#[derive(Clone)]
pub struct AppState {
    pub embedding: EmbeddingClient,
    pub search: SearchClient,
    pub terminology: Arc<Terminology>,
}

pub async fn run(host: &str, port: u16, state: AppState) -> anyhow::Result<()> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(health))
        .route("/api/retrieve", post(api_retrieve))
        .route("/api/debug/search", post(api_debug_search))
        .layer(cors)
        .with_state(state);

    let addr: SocketAddr = format!("{host}:{port}").parse().context("parse host:port")?;

    tracing::info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn default_specialty() -> String {
    "general".to_string()
}

fn default_region() -> String {
    "US".to_string()
}

fn default_top_k() -> usize {
    20
}

#[derive(Debug, Deserialize)]
pub struct RetrieveRequest {
    #[serde(default)]
    pub query: String,
    #[serde(default = "default_specialty")]
    pub specialty: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub exclusion_terms: Vec<String>,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

#[derive(Debug, Serialize)]
struct RetrieveResponse {
    icd10: Vec<RankedCode>,
    cpt: Vec<RankedCode>,
    hcpcs: Vec<RankedCode>,
    metadata: RetrieveMetadata,
}

#[derive(Debug, Serialize)]
struct RetrieveMetadata {
    query: String,
    specialty: String,
    region: String,
    total_results: usize,
    filtered_results: usize,
    source: &'static str,
}

async fn health(State(st): State<AppState>) -> impl IntoResponse {
    match st.search.stats().await {
        Ok(stats) => Json(json!({
            "status": "healthy",
            "total_vectors": stats.total_vector_count,
            "dimension": stats.dimension,
            "terminology_loaded": st.terminology.len(),
        }))
        .into_response(),
        Err(err) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "unhealthy", "error": err.to_string() })),
        )
            .into_response(),
    }
}

async fn api_retrieve(
    State(st): State<AppState>,
    Json(req): Json<RetrieveRequest>,
) -> impl IntoResponse {
    let query = req.query.trim().to_string();
    if query.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Query is required" })),
        )
            .into_response();
    }

    match retrieve(&st, &query, &req).await {
        Ok(resp) => Json(resp).into_response(),
        Err(err) => {
            tracing::error!("retrieve failed: {err:#}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": err.to_string() })),
            )
                .into_response()
        }
    }
}

async fn retrieve(
    st: &AppState,
    query: &str,
    req: &RetrieveRequest,
) -> anyhow::Result<RetrieveResponse> {
    let vector = st
        .embedding
        .embed(query)
        .await
        .context("generate query embedding")?;

    let matches = st
        .search
        .query(
            &vector,
            search_fan_out(req.top_k),
            specialty_filter(&req.specialty),
        )
        .await
        .context("similarity search")?;

    let total_results = matches.len();
    let passages = passages_from_matches(matches);
    let buckets = pipeline::consolidate(&passages, &req.exclusion_terms, &st.terminology);
    let filtered_results = buckets.total_codes();

    let CodeBuckets { icd10, cpt, hcpcs } = buckets;
    Ok(RetrieveResponse {
        icd10,
        cpt,
        hcpcs,
        metadata: RetrieveMetadata {
            query: query.to_string(),
            specialty: req.specialty.clone(),
            region: req.region.clone(),
            total_results,
            filtered_results,
            source: BACKEND_TAG,
        },
    })
}

fn search_fan_out(top_k: usize) -> usize {
    top_k.saturating_mul(3).clamp(1, MAX_SEARCH_FAN_OUT)
}

/// "general" means no filter; anything else becomes an equality filter on
/// the `specialty` metadata field.
fn specialty_filter(specialty: &str) -> Option<&str> {
    let s = specialty.trim();
    if s.is_empty() || s == "general" { None } else { Some(s) }
}

fn passages_from_matches(matches: Vec<SearchMatch>) -> Vec<Passage> {
    matches
        .into_iter()
        .map(|m| {
            let text = m.metadata.get("text").cloned().unwrap_or_default();
            Passage {
                text,
                score: m.score,
                metadata: m.metadata,
            }
        })
        .collect()
}

#[derive(Debug, Deserialize)]
pub struct DebugSearchRequest {
    #[serde(default)]
    pub query: String,
    #[serde(default = "default_specialty")]
    pub specialty: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

#[derive(Debug, Serialize)]
struct DebugMatch {
    score: f32,
    text: String,
    metadata_keys: Vec<String>,
}

/// Raw view of what the index returns for a query, before the pipeline
/// touches it. Useful for diagnosing index content and metadata keying.
async fn api_debug_search(
    State(st): State<AppState>,
    Json(req): Json<DebugSearchRequest>,
) -> impl IntoResponse {
    let query = req.query.trim().to_string();
    if query.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Query is required" })),
        )
            .into_response();
    }

    match debug_search(&st, &query, &req).await {
        Ok(matches) => Json(matches).into_response(),
        Err(err) => {
            tracing::error!("debug search failed: {err:#}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": err.to_string() })),
            )
                .into_response()
        }
    }
}

async fn debug_search(
    st: &AppState,
    query: &str,
    req: &DebugSearchRequest,
) -> anyhow::Result<Vec<DebugMatch>> {
    let vector = st
        .embedding
        .embed(query)
        .await
        .context("generate query embedding")?;
    let matches = st
        .search
        .query(
            &vector,
            search_fan_out(req.top_k),
            specialty_filter(&req.specialty),
        )
        .await
        .context("similarity search")?;

    Ok(matches
        .into_iter()
        .map(|m| {
            let text = m.metadata.get("text").cloned().unwrap_or_default();
            let mut metadata_keys: Vec<String> = m.metadata.keys().cloned().collect();
            metadata_keys.sort();
            DebugMatch {
                score: m.score,
                text: truncate_for_log(&text),
                metadata_keys,
            }
        })
        .collect())
}
