#![warn(missing_docs)]
//! Grounded question answering over a corpus of professor profiles.
//!
//! A request flows through [`QueryRewriter`], [`RetrievalPlanner`],
//! [`select_passages`], [`context::assemble`] and [`AnswerGenerator`], all
//! sequenced by [`Orchestrator`]. The embedding service, the vector index and
//! the language model sit behind the [`Embedder`], [`VectorIndex`] and
//! [`LlmProvider`] traits.

pub mod config;
pub mod context;
pub mod conversation;
pub mod embedder;
pub mod error;
pub mod generator;
pub mod index;
pub mod llm;
pub mod orchestrator;
pub mod planner;
mod retry;
pub mod rewriter;
pub mod selector;
pub mod server;

pub use config::{GenerationSettings, IndexBackend, LlmVendor, PipelineSettings, ServerCli};
pub use context::{AssembledContext, ClientMatch};
pub use conversation::{Conversation, ConversationTurn, Role};
pub use embedder::Embedder;
pub use error::{InputValidationError, PipelineError};
pub use generator::AnswerGenerator;
pub use index::{EntryKind, EntryMetadata, IndexHit, SearchFilter, SearchRequest, VectorIndex};
pub use llm::{LlmProvider, ProviderRequest};
pub use orchestrator::{AnswerResult, Orchestrator, PipelineClients, NO_MATCHES_ANSWER};
pub use planner::{ProfileChunk, RetrievalOutcome, RetrievalPlanner, ScoredChunk};
pub use rewriter::QueryRewriter;
pub use selector::select_passages;
