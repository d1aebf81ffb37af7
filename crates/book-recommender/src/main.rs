mod config;
mod error;
mod extract;
mod model;
mod pipeline;
mod prompts;
mod server;
mod session;

use std::sync::Arc;

use rmcp::{ServiceExt, transport::stdio};
use tracing::info;
use tracing_subscriber::EnvFilter;

use rec_common::llm::LlmClient;
use rec_common::store::RecordStore;

use config::Config;
use pipeline::Pipeline;
use server::RecommenderServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing to stderr (stdout is reserved for MCP JSON-RPC)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    info!("starting book-recommender MCP server");

    let config = Config::from_env()?;
    info!(
        llm_base_url = %config.llm.base_url,
        llm_model = %config.llm.model,
        api_keys = config.llm.api_keys.len(),
        store_base_url = %config.store.base_url,
        store_table = %config.store.table,
        "configuration loaded"
    );
    if config.llm.api_keys.is_empty() {
        info!("no LLM API keys configured, sending unauthenticated requests");
    }

    let llm = Arc::new(LlmClient::new(config.llm.clone())?);
    let store = Arc::new(RecordStore::new(config.store.clone())?);

    let pipeline = Arc::new(Pipeline::new(
        Arc::clone(&llm) as Arc<dyn pipeline::TextUnderstanding>,
        Arc::clone(&store) as Arc<dyn pipeline::CandidateSource>,
    ));

    let server = RecommenderServer::new(pipeline, store);

    info!("MCP server ready, serving on stdio");
    let service = server.serve(stdio()).await.inspect_err(|e| {
        tracing::error!(error = %e, "MCP server error");
    })?;

    service.waiting().await?;
    info!("MCP server shut down");
    Ok(())
}
