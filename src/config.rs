//! Pipeline tuning knobs and the server's command-line configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};

/// Immutable limits that shape retrieval and selection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineSettings {
    history_turns: usize,
    routing_top_k: usize,
    chunk_top_k: usize,
    broaden_below: usize,
    max_passages: usize,
    snippet_chars: usize,
}

impl PipelineSettings {
    /// Builds settings, clamping every size to at least one.
    ///
    /// `broaden_below` may be zero, which disables the broadening fallback.
    pub fn new(
        history_turns: usize,
        routing_top_k: usize,
        chunk_top_k: usize,
        broaden_below: usize,
        max_passages: usize,
        snippet_chars: usize,
    ) -> Self {
        Self {
            history_turns: history_turns.max(1),
            routing_top_k: routing_top_k.max(1),
            chunk_top_k: chunk_top_k.max(1),
            broaden_below,
            max_passages: max_passages.max(1),
            snippet_chars: snippet_chars.max(1),
        }
    }

    /// Number of trailing turns shown to the query rewriter.
    pub fn history_turns(&self) -> usize {
        self.history_turns
    }

    /// Summaries requested during document routing.
    pub fn routing_top_k(&self) -> usize {
        self.routing_top_k
    }

    /// Chunks requested during scoped and broadened retrieval.
    pub fn chunk_top_k(&self) -> usize {
        self.chunk_top_k
    }

    /// Scoped retrieval returning fewer chunks than this triggers broadening.
    pub fn broaden_below(&self) -> usize {
        self.broaden_below
    }

    /// Upper bound on passages handed to the answer model.
    pub fn max_passages(&self) -> usize {
        self.max_passages
    }

    /// Hard cap on client-facing snippet length, ellipsis included.
    pub fn snippet_chars(&self) -> usize {
        self.snippet_chars
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::new(12, 3, 12, 3, 8, 220)
    }
}

/// Sampling parameters for the two model calls.
#[derive(Clone, Debug, PartialEq)]
pub struct GenerationSettings {
    /// Temperature for the query rewrite.
    pub rewrite_temperature: f32,
    /// Completion cap for the query rewrite.
    pub rewrite_max_tokens: usize,
    /// Temperature for the grounded answer.
    pub answer_temperature: f32,
    /// Completion cap for the grounded answer.
    pub answer_max_tokens: usize,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            rewrite_temperature: 0.0,
            rewrite_max_tokens: 128,
            answer_temperature: 0.2,
            answer_max_tokens: 700,
        }
    }
}

/// Vector index implementation backing retrieval.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum IndexBackend {
    /// Qdrant collection over its REST API.
    Qdrant,
    /// JSONL snapshot loaded into memory.
    Memory,
}

/// Language model vendor used for rewriting and answering.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum LlmVendor {
    /// OpenAI-compatible chat completions.
    Openai,
    /// Anthropic messages API.
    Anthropic,
}

/// Command-line interface of the answer server.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "profrag-server",
    about = "HTTP API answering questions about professor profiles from a vector index"
)]
pub struct ServerCli {
    /// Address to bind the HTTP server to (host:port).
    #[arg(long, env = "PROFRAG_BIND", default_value = "127.0.0.1:8080")]
    pub bind: String,

    /// Vector index backend.
    #[arg(long, env = "PROFRAG_INDEX_BACKEND", value_enum, default_value = "qdrant")]
    pub index_backend: IndexBackend,

    /// Qdrant base URL.
    #[arg(long, env = "PROFRAG_QDRANT_URL", default_value = "http://127.0.0.1:6333")]
    pub qdrant_url: String,

    /// Qdrant collection holding summaries and chunks.
    #[arg(long, env = "PROFRAG_QDRANT_COLLECTION", default_value = "professor_profiles")]
    pub qdrant_collection: String,

    /// Optional Qdrant API key.
    #[arg(long, env = "QDRANT_API_KEY")]
    pub qdrant_api_key: Option<String>,

    /// Named vector inside the collection, if the collection uses named vectors.
    #[arg(long, env = "PROFRAG_QDRANT_VECTOR")]
    pub qdrant_vector_name: Option<String>,

    /// Payload key holding the entry kind in the Qdrant collection.
    #[arg(long, env = "PROFRAG_QDRANT_KIND_KEY", default_value = "kind")]
    pub qdrant_kind_key: String,

    /// Payload key holding the profile document id in the Qdrant collection.
    #[arg(long, env = "PROFRAG_QDRANT_DOC_ID_KEY", default_value = "doc_id")]
    pub qdrant_doc_id_key: String,

    /// JSONL snapshot used by the memory backend.
    #[arg(long, env = "PROFRAG_INDEX_FILE")]
    pub index_file: Option<PathBuf>,

    /// OpenAI API key used for embeddings (and answers with the openai provider).
    #[arg(long, env = "OPENAI_API_KEY")]
    pub openai_api_key: Option<String>,

    /// Base URL for OpenAI-compatible endpoints.
    #[arg(long, env = "PROFRAG_OPENAI_BASE", default_value = "https://api.openai.com/v1")]
    pub openai_base_url: String,

    /// Embedding model identifier.
    #[arg(long, env = "PROFRAG_EMBEDDING_MODEL", default_value = "text-embedding-3-small")]
    pub embedding_model: String,

    /// Expected embedding dimension; also sent as a dimension override.
    #[arg(long, env = "PROFRAG_EMBEDDING_DIMENSIONS")]
    pub embedding_dimensions: Option<usize>,

    /// LLM provider for rewriting and answering.
    #[arg(long, env = "PROFRAG_LLM_PROVIDER", value_enum, default_value = "openai")]
    pub llm_provider: LlmVendor,

    /// Anthropic API key (required with --llm-provider anthropic).
    #[arg(long, env = "ANTHROPIC_API_KEY")]
    pub anthropic_api_key: Option<String>,

    /// Base URL for the Anthropic messages API.
    #[arg(long, env = "PROFRAG_ANTHROPIC_BASE", default_value = "https://api.anthropic.com/v1")]
    pub anthropic_base_url: String,

    /// Model used to rewrite conversational questions.
    #[arg(long, env = "PROFRAG_REWRITE_MODEL", default_value = "gpt-4o-mini")]
    pub rewrite_model: String,

    /// Model used to write grounded answers.
    #[arg(long, env = "PROFRAG_ANSWER_MODEL", default_value = "gpt-4o-mini")]
    pub answer_model: String,

    /// Sampling temperature for the answer model.
    #[arg(long, default_value_t = 0.2)]
    pub answer_temperature: f32,

    /// Maximum tokens to request for an answer.
    #[arg(long, default_value_t = 700)]
    pub answer_max_tokens: usize,

    /// Seconds before any single outbound HTTP call times out.
    #[arg(long, env = "PROFRAG_HTTP_TIMEOUT_SECS", default_value_t = 30)]
    pub http_timeout_secs: u64,

    /// Seconds before a whole request is abandoned.
    #[arg(long, env = "PROFRAG_REQUEST_TIMEOUT_SECS", default_value_t = 60)]
    pub request_timeout_secs: u64,

    /// Attempts per embedding/index call (1 disables retries).
    #[arg(long, env = "PROFRAG_MAX_ATTEMPTS", default_value_t = 1)]
    pub max_attempts: usize,

    /// Conversation turns shown to the query rewriter.
    #[arg(long, default_value_t = 12)]
    pub history_turns: usize,

    /// Profile summaries fetched when routing to documents.
    #[arg(long, default_value_t = 3)]
    pub routing_top_k: usize,

    /// Chunks fetched per retrieval pass.
    #[arg(long, default_value_t = 12)]
    pub chunk_top_k: usize,

    /// Broaden to a global search when scoped retrieval yields fewer chunks (0 disables).
    #[arg(long, default_value_t = 3)]
    pub broaden_below: usize,

    /// Maximum passages given to the answer model.
    #[arg(long, default_value_t = 8)]
    pub max_passages: usize,

    /// Maximum snippet length in client-facing matches.
    #[arg(long, default_value_t = 220)]
    pub snippet_chars: usize,

    /// Max requests per minute allowed (0 disables rate limiting).
    #[arg(long, default_value_t = 120)]
    pub max_requests_per_minute: u32,

    /// Rate-limit burst size (tokens available instantly).
    #[arg(long, default_value_t = 12)]
    pub rate_limit_burst: u32,

    /// Omit the rewritten query from responses.
    #[arg(long, env = "PROFRAG_HIDE_REWRITTEN_QUERY", default_value_t = false)]
    pub hide_rewritten_query: bool,
}

impl ServerCli {
    /// Converts the parsed flags into pipeline settings.
    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings::new(
            self.history_turns,
            self.routing_top_k,
            self.chunk_top_k,
            self.broaden_below,
            self.max_passages,
            self.snippet_chars,
        )
    }

    /// Converts the parsed flags into model sampling settings.
    pub fn generation_settings(&self) -> GenerationSettings {
        GenerationSettings {
            answer_temperature: self.answer_temperature,
            answer_max_tokens: self.answer_max_tokens.max(1),
            ..GenerationSettings::default()
        }
    }

    /// Timeout applied to each outbound HTTP call.
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs.max(1))
    }

    /// Deadline for a whole request.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// Parsed bind address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.bind
            .parse()
            .with_context(|| format!("invalid bind address {}", self.bind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_observed_pool_sizes() {
        let settings = PipelineSettings::default();
        assert_eq!(settings.history_turns(), 12);
        assert_eq!(settings.routing_top_k(), 3);
        assert_eq!(settings.chunk_top_k(), 12);
        assert_eq!(settings.broaden_below(), 3);
        assert_eq!(settings.max_passages(), 8);
        assert_eq!(settings.snippet_chars(), 220);
    }

    #[test]
    fn zero_sizes_are_clamped_except_threshold() {
        let settings = PipelineSettings::new(0, 0, 0, 0, 0, 0);
        assert_eq!(settings.routing_top_k(), 1);
        assert_eq!(settings.max_passages(), 1);
        assert_eq!(settings.broaden_below(), 0);
    }

    #[test]
    fn cli_flags_flow_into_settings() {
        let cli = ServerCli::try_parse_from([
            "profrag-server",
            "--index-backend",
            "memory",
            "--index-file",
            "profiles.jsonl",
            "--chunk-top-k",
            "20",
            "--broaden-below",
            "5",
            "--llm-provider",
            "anthropic",
        ])
        .expect("parse");
        assert_eq!(cli.index_backend, IndexBackend::Memory);
        assert_eq!(cli.llm_provider, LlmVendor::Anthropic);
        let settings = cli.pipeline_settings();
        assert_eq!(settings.chunk_top_k(), 20);
        assert_eq!(settings.broaden_below(), 5);
        assert!(cli.bind_addr().is_ok());
        assert_eq!(cli.qdrant_kind_key, "kind");
        assert_eq!(cli.qdrant_doc_id_key, "doc_id");
    }

    #[test]
    fn qdrant_payload_keys_are_configurable() {
        let cli = ServerCli::try_parse_from([
            "profrag-server",
            "--qdrant-kind-key",
            "type",
            "--qdrant-doc-id-key",
            "docId",
        ])
        .expect("parse");
        assert_eq!(cli.qdrant_kind_key, "type");
        assert_eq!(cli.qdrant_doc_id_key, "docId");
    }
}
