use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "codes-backend")]
#[command(about = "Clinical code retrieval backend (query embedding + vector search + terminology)")]
pub struct Args {
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, default_value_t = 5000)]
    pub port: u16,

    /// Terminology dictionary JSON (flat code map or entry list). A missing
    /// file starts the server with an empty table.
    #[arg(long, default_value = "terminology_lookup.json")]
    pub terminology_file: std::path::PathBuf,

    /// OpenAI-compatible embeddings API base URL.
    #[arg(long, default_value = "https://api.openai.com/v1")]
    pub embedding_api_base_url: String,

    /// Embedding model requested per query.
    #[arg(long, default_value = "text-embedding-3-small")]
    pub embedding_model: String,

    /// Vector index host, e.g. https://<index>-<project>.svc.<env>.pinecone.io.
    /// Falls back to the INDEX_HOST environment variable.
    #[arg(long)]
    pub index_host: Option<String>,
}
