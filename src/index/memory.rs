//! In-memory index loaded from a JSONL snapshot, for local runs and tests.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{EntryMetadata, IndexHit, SearchRequest, VectorIndex};

/// One stored vector with its payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Entry identifier.
    pub id: String,
    /// Stored embedding.
    pub embedding: Vec<f32>,
    /// Payload fields.
    #[serde(flatten)]
    pub metadata: EntryMetadata,
}

/// Brute-force cosine index over a fixed set of entries.
#[derive(Debug, Clone)]
pub struct InMemoryIndex {
    entries: Vec<IndexEntry>,
    dimensions: usize,
}

impl InMemoryIndex {
    /// Builds an index, requiring every embedding to share one dimension.
    pub fn new(entries: Vec<IndexEntry>) -> Result<Self> {
        let dimensions = entries.first().map(|entry| entry.embedding.len()).unwrap_or(0);
        for entry in &entries {
            anyhow::ensure!(
                entry.embedding.len() == dimensions,
                "entry {} has {} dimensions, expected {}",
                entry.id,
                entry.embedding.len(),
                dimensions
            );
        }
        Ok(Self {
            entries,
            dimensions,
        })
    }

    /// Loads one JSON entry per line; blank lines are skipped.
    pub fn from_jsonl(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("failed to open {:?}", path))?;
        let reader = BufReader::new(file);
        let mut entries = Vec::new();
        for (line_no, line) in reader.lines().enumerate() {
            let line = line.with_context(|| format!("failed to read {:?}", path))?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: IndexEntry = serde_json::from_str(&line)
                .with_context(|| format!("invalid index entry at {:?}:{}", path, line_no + 1))?;
            entries.push(entry);
        }
        Self::new(entries)
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the snapshot is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn search(&self, request: &SearchRequest<'_>) -> Result<Vec<IndexHit>> {
        if self.entries.is_empty() || request.top_k == 0 {
            return Ok(Vec::new());
        }
        anyhow::ensure!(
            request.vector.len() == self.dimensions,
            "query has {} dimensions, index expects {}",
            request.vector.len(),
            self.dimensions
        );
        let mut hits: Vec<IndexHit> = self
            .entries
            .iter()
            .filter(|entry| request.filter.matches(&entry.metadata))
            .map(|entry| IndexHit {
                id: entry.id.clone(),
                score: cosine_similarity(request.vector, &entry.embedding),
                metadata: entry.metadata.clone(),
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(request.top_k);
        Ok(hits)
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
