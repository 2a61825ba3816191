//! Two-stage retrieval: route to profile documents, then fetch their chunks.
//!
//! Stage A searches summary entries to pick the documents a question is
//! about. Stage B searches chunk entries restricted to those documents. When
//! the scoped search comes back too sparse, the chunk search is repeated
//! without the document restriction. The query is embedded once and the
//! vector is reused by every search.

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::config::PipelineSettings;
use crate::embedder::Embedder;
use crate::index::{EntryKind, IndexHit, SearchFilter, SearchRequest, VectorIndex};

/// A retrievable passage of one professor's profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileChunk {
    /// Owning profile document.
    pub doc_id: String,
    /// Semantic subsection label, empty when unknown.
    pub section_block: String,
    /// Passage text.
    pub text: String,
    /// Page the profile came from.
    pub source_url: String,
    /// Display name of the professor.
    pub professor_name: String,
}

/// A chunk paired with its similarity to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    /// Similarity reported by the index.
    pub score: f32,
    /// The passage.
    pub chunk: ProfileChunk,
}

/// What the planner found for one query.
#[derive(Debug, Clone, Default)]
pub struct RetrievalOutcome {
    /// Distinct documents chosen by routing.
    pub routed_doc_ids: BTreeSet<String>,
    /// Usable chunks ranked by descending score.
    pub candidates: Vec<ScoredChunk>,
    /// Whether the unscoped fallback search ran.
    pub broadened: bool,
}

/// Executes routing, scoped retrieval and the broadening fallback.
pub struct RetrievalPlanner {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    settings: Arc<PipelineSettings>,
}

impl RetrievalPlanner {
    /// Creates a planner over the given collaborators.
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        settings: Arc<PipelineSettings>,
    ) -> Self {
        Self {
            embedder,
            index,
            settings,
        }
    }

    /// Embeds `query` once and runs the staged search.
    ///
    /// An empty candidate list is a valid outcome; any embedding or index
    /// failure is returned as an error.
    pub async fn plan(&self, query: &str) -> Result<RetrievalOutcome> {
        let vector = self
            .embedder
            .embed(query)
            .await
            .context("failed to embed query")?;
        tracing::debug!(dimensions = vector.len(), "embedded query");

        let routed_doc_ids = self.route(&vector).await?;
        let mut candidates = self.retrieve_chunks(&vector, &routed_doc_ids).await?;
        let mut broadened = false;
        if !routed_doc_ids.is_empty() && candidates.len() < self.settings.broaden_below() {
            tracing::debug!(
                scoped = candidates.len(),
                threshold = self.settings.broaden_below(),
                "scoped retrieval too sparse; broadening"
            );
            candidates = self.retrieve_chunks(&vector, &BTreeSet::new()).await?;
            broadened = true;
        }
        tracing::debug!(
            routed_docs = routed_doc_ids.len(),
            chunks = candidates.len(),
            broadened,
            "retrieval finished"
        );
        Ok(RetrievalOutcome {
            routed_doc_ids,
            candidates,
            broadened,
        })
    }

    async fn route(&self, vector: &[f32]) -> Result<BTreeSet<String>> {
        let request = SearchRequest {
            vector,
            top_k: self.settings.routing_top_k(),
            filter: SearchFilter::kind(EntryKind::Summary),
        };
        let hits = self
            .index
            .search(&request)
            .await
            .context("summary routing search failed")?;
        let doc_ids: BTreeSet<String> = hits
            .into_iter()
            .filter_map(|hit| hit.metadata.doc_id)
            .map(|doc_id| doc_id.trim().to_string())
            .filter(|doc_id| !doc_id.is_empty())
            .collect();
        tracing::debug!(routed = ?doc_ids, "routed to documents");
        Ok(doc_ids)
    }

    async fn retrieve_chunks(
        &self,
        vector: &[f32],
        doc_ids: &BTreeSet<String>,
    ) -> Result<Vec<ScoredChunk>> {
        let request = SearchRequest {
            vector,
            top_k: self.settings.chunk_top_k(),
            filter: SearchFilter::kind(EntryKind::Chunk).scoped_to(doc_ids),
        };
        let hits = self
            .index
            .search(&request)
            .await
            .with_context(|| {
                if doc_ids.is_empty() {
                    "chunk search failed".to_string()
                } else {
                    format!("chunk search scoped to {} documents failed", doc_ids.len())
                }
            })?;
        Ok(hits.into_iter().filter_map(usable_chunk).collect())
    }
}

/// Blank passages carry nothing to ground an answer on.
fn usable_chunk(hit: IndexHit) -> Option<ScoredChunk> {
    let metadata = hit.metadata;
    if metadata.text.trim().is_empty() {
        tracing::debug!(id = %hit.id, "skipping chunk without text");
        return None;
    }
    Some(ScoredChunk {
        score: hit.score,
        chunk: ProfileChunk {
            doc_id: metadata.doc_id.unwrap_or_default(),
            section_block: metadata.section_block.trim().to_string(),
            text: metadata.text,
            source_url: metadata.source_url.trim().to_string(),
            professor_name: metadata.professor_name.trim().to_string(),
        },
    })
}
