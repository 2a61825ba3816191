use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use profrag::embedder::openai::OpenAiEmbedder;
use profrag::index::memory::InMemoryIndex;
use profrag::index::qdrant::{PayloadKeys, QdrantIndex};
use profrag::llm::{AnthropicProvider, OpenAiProvider};
use profrag::server::{router, AppState, RateLimiter};
use profrag::{
    Embedder, IndexBackend, LlmProvider, LlmVendor, Orchestrator, PipelineClients, ServerCli,
    VectorIndex,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("profrag=info")),
        )
        .init();

    let cli = ServerCli::parse();
    let clients = PipelineClients {
        embedder: build_embedder(&cli)?,
        index: build_index(&cli)?,
        rewrite_llm: build_llm(&cli, &cli.rewrite_model)?,
        answer_llm: build_llm(&cli, &cli.answer_model)?,
    };
    let orchestrator = Arc::new(Orchestrator::new(
        clients,
        cli.pipeline_settings(),
        cli.generation_settings(),
    ));
    let state = AppState::new(orchestrator, cli.request_timeout())
        .with_rate_limiter(RateLimiter::new(
            cli.max_requests_per_minute,
            cli.rate_limit_burst,
        ))
        .expose_rewritten_query(!cli.hide_rewritten_query);
    let app = router(state);

    let addr = cli.bind_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(
        %addr,
        backend = ?cli.index_backend,
        provider = ?cli.llm_provider,
        "profrag-server listening"
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server shutdown")?;
    Ok(())
}

fn build_embedder(cli: &ServerCli) -> Result<Arc<dyn Embedder>> {
    let key = cli
        .openai_api_key
        .clone()
        .ok_or_else(|| anyhow!("OPENAI_API_KEY must be set for query embeddings"))?;
    let embedder = OpenAiEmbedder::new(
        key,
        cli.openai_base_url.clone(),
        cli.embedding_model.clone(),
        cli.embedding_dimensions,
        cli.http_timeout(),
        cli.max_attempts,
    )?;
    Ok(Arc::new(embedder))
}

fn build_index(cli: &ServerCli) -> Result<Arc<dyn VectorIndex>> {
    match cli.index_backend {
        IndexBackend::Qdrant => {
            let index = QdrantIndex::new(
                cli.qdrant_url.clone(),
                cli.qdrant_collection.clone(),
                cli.qdrant_api_key.clone(),
                cli.qdrant_vector_name.clone(),
                cli.http_timeout(),
                cli.max_attempts,
            )?
            .with_payload_keys(PayloadKeys {
                kind: cli.qdrant_kind_key.clone(),
                doc_id: cli.qdrant_doc_id_key.clone(),
            })?;
            Ok(Arc::new(index))
        }
        IndexBackend::Memory => {
            let path = cli
                .index_file
                .as_ref()
                .ok_or_else(|| anyhow!("--index-file is required with --index-backend memory"))?;
            let index = InMemoryIndex::from_jsonl(path)?;
            tracing::info!(entries = index.len(), path = ?path, "loaded in-memory index");
            Ok(Arc::new(index))
        }
    }
}

fn build_llm(cli: &ServerCli, model: &str) -> Result<Arc<dyn LlmProvider>> {
    match cli.llm_provider {
        LlmVendor::Openai => {
            let key = cli
                .openai_api_key
                .clone()
                .ok_or_else(|| anyhow!("OPENAI_API_KEY must be set for the OpenAI provider"))?;
            let provider = OpenAiProvider::new(
                key,
                cli.openai_base_url.clone(),
                model.to_string(),
                cli.http_timeout(),
            )?;
            Ok(Arc::new(provider))
        }
        LlmVendor::Anthropic => {
            let key = cli.anthropic_api_key.clone().ok_or_else(|| {
                anyhow!("ANTHROPIC_API_KEY must be set for the Anthropic provider")
            })?;
            let provider = AnthropicProvider::new(
                key,
                cli.anthropic_base_url.clone(),
                model.to_string(),
                cli.http_timeout(),
            )?;
            Ok(Arc::new(provider))
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
