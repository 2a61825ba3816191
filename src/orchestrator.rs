//! Sequences the answer pipeline for one request.
//!
//! validate → rewrite → embed + route + retrieve (+ broaden) → select →
//! assemble → generate. Each outbound call either succeeds or fails the whole
//! request; only the rewrite step recovers locally.

use std::sync::Arc;

use serde::Serialize;

use crate::config::{GenerationSettings, PipelineSettings};
use crate::context::{assemble, ClientMatch};
use crate::conversation::{Conversation, ConversationTurn};
use crate::embedder::Embedder;
use crate::error::PipelineError;
use crate::generator::AnswerGenerator;
use crate::index::VectorIndex;
use crate::llm::LlmProvider;
use crate::planner::RetrievalPlanner;
use crate::rewriter::QueryRewriter;
use crate::selector::select_passages;

/// Answer returned when retrieval finds no usable passages.
pub const NO_MATCHES_ANSWER: &str =
    "I couldn't find any relevant information about that in the professor profiles.";

/// Successful pipeline result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerResult {
    /// Grounded answer, or [`NO_MATCHES_ANSWER`].
    pub answer: String,
    /// Sources in the order they were given to the answer model.
    pub matches: Vec<ClientMatch>,
    /// Standalone query the pipeline searched with.
    pub rewritten_query: String,
}

/// External collaborators the pipeline calls out to.
#[derive(Clone)]
pub struct PipelineClients {
    /// Query embedding service.
    pub embedder: Arc<dyn Embedder>,
    /// Read-only vector index.
    pub index: Arc<dyn VectorIndex>,
    /// Model used to rewrite conversational questions.
    pub rewrite_llm: Arc<dyn LlmProvider>,
    /// Model used to write grounded answers.
    pub answer_llm: Arc<dyn LlmProvider>,
}

/// Stateless request pipeline; safe to share across concurrent requests.
pub struct Orchestrator {
    rewriter: QueryRewriter,
    planner: RetrievalPlanner,
    generator: AnswerGenerator,
    settings: Arc<PipelineSettings>,
}

impl Orchestrator {
    /// Wires the pipeline components from clients and settings.
    pub fn new(
        clients: PipelineClients,
        settings: PipelineSettings,
        generation: GenerationSettings,
    ) -> Self {
        let settings = Arc::new(settings);
        Self {
            rewriter: QueryRewriter::new(
                clients.rewrite_llm,
                settings.history_turns(),
                generation.rewrite_temperature,
                generation.rewrite_max_tokens,
            ),
            planner: RetrievalPlanner::new(clients.embedder, clients.index, Arc::clone(&settings)),
            generator: AnswerGenerator::new(
                clients.answer_llm,
                generation.answer_temperature,
                generation.answer_max_tokens,
            ),
            settings,
        }
    }

    /// Answers the last user turn of `turns`.
    pub async fn answer(&self, turns: Vec<ConversationTurn>) -> Result<AnswerResult, PipelineError> {
        let conversation = Conversation::new(turns)?;
        self.answer_conversation(conversation).await
    }

    /// Answers an already validated conversation.
    pub async fn answer_conversation(
        &self,
        conversation: Conversation,
    ) -> Result<AnswerResult, PipelineError> {
        tracing::debug!(
            turns = conversation.turns().len(),
            question = conversation.latest_question(),
            "accepted conversation"
        );

        let query = self.rewriter.rewrite(&conversation).await;
        tracing::debug!(query = %query, "standalone query");

        let outcome = self
            .planner
            .plan(&query)
            .await
            .map_err(PipelineError::Retrieval)?;
        if outcome.candidates.is_empty() {
            tracing::info!(
                routed_docs = outcome.routed_doc_ids.len(),
                broadened = outcome.broadened,
                "no relevant passages found"
            );
            return Ok(AnswerResult {
                answer: NO_MATCHES_ANSWER.to_string(),
                matches: Vec::new(),
                rewritten_query: query,
            });
        }

        let candidate_count = outcome.candidates.len();
        let selected = select_passages(outcome.candidates, self.settings.max_passages());
        let context = assemble(&selected, self.settings.snippet_chars());
        let answer = self
            .generator
            .generate(&query, &context.prompt_block)
            .await
            .map_err(PipelineError::Generation)?;

        tracing::info!(
            routed_docs = outcome.routed_doc_ids.len(),
            candidates = candidate_count,
            selected = context.matches.len(),
            broadened = outcome.broadened,
            "answered question"
        );
        Ok(AnswerResult {
            answer,
            matches: context.matches,
            rewritten_query: query,
        })
    }
}
