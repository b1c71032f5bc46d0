mod cli;
mod common;
mod embedding;
mod extract;
mod pipeline;
mod search;
mod server;
mod terminology;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = cli::Args::parse();

    let embedding_api_key =
        std::env::var("OPENAI_API_KEY").context("OPENAI_API_KEY must be set")?;
    let search_api_key =
        std::env::var("PINECONE_API_KEY").context("PINECONE_API_KEY must be set")?;
    let index_host = match args.index_host.clone() {
        Some(host) => host,
        None => std::env::var("INDEX_HOST")
            .context("Pass --index-host or set the INDEX_HOST environment variable")?,
    };

    let terminology = terminology::Terminology::load(&args.terminology_file)?;
    tracing::info!("Loaded {} terminology entries", terminology.len());

    let http = reqwest::Client::new();
    let state = server::AppState {
        embedding: embedding::EmbeddingClient::new(
            http.clone(),
            args.embedding_api_base_url.clone(),
            embedding_api_key,
            args.embedding_model.clone(),
        ),
        search: search::SearchClient::new(http, index_host, search_api_key),
        terminology: Arc::new(terminology),
    };

    server::run(&args.host, args.port, state)
        .await
        .context("serve failed")
}
