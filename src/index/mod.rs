//! Read-only vector index interface and its backends.
//!
//! The index stores two kinds of entries: one condensed summary per
//! professor profile, used to route a question to documents, and many
//! passage-sized chunks carrying the text shown to the answer model.

use std::collections::BTreeSet;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod memory;
pub mod qdrant;

/// Granularity of an index entry.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Condensed description of a whole profile.
    Summary,
    /// Retrievable passage of a profile.
    Chunk,
}

impl EntryKind {
    /// Payload value stored in the index.
    pub fn as_str(self) -> &'static str {
        match self {
            EntryKind::Summary => "summary",
            EntryKind::Chunk => "chunk",
        }
    }
}

/// Metadata restriction applied to a nearest-neighbour query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchFilter {
    /// Only entries of this kind match.
    pub kind: EntryKind,
    /// When set and non-empty, only entries owned by these documents match.
    pub doc_ids: Option<BTreeSet<String>>,
}

impl SearchFilter {
    /// Filter on entry kind alone.
    pub fn kind(kind: EntryKind) -> Self {
        Self {
            kind,
            doc_ids: None,
        }
    }

    /// Restricts matches to the given documents; an empty set leaves the filter unscoped.
    pub fn scoped_to(mut self, doc_ids: &BTreeSet<String>) -> Self {
        self.doc_ids = (!doc_ids.is_empty()).then(|| doc_ids.clone());
        self
    }

    /// Whether an entry with the given metadata passes this filter.
    pub fn matches(&self, metadata: &EntryMetadata) -> bool {
        if metadata.kind != Some(self.kind) {
            return false;
        }
        match (&self.doc_ids, &metadata.doc_id) {
            (Some(allowed), Some(doc_id)) => allowed.contains(doc_id),
            (Some(_), None) => false,
            (None, _) => true,
        }
    }
}

/// One nearest-neighbour query.
#[derive(Clone, Debug)]
pub struct SearchRequest<'a> {
    /// Query embedding.
    pub vector: &'a [f32],
    /// Maximum number of hits to return.
    pub top_k: usize,
    /// Metadata restriction.
    pub filter: SearchFilter,
}

/// Payload attached to every index entry.
///
/// Decoding never fails on a JSON object: snake_case keys win over their
/// camelCase aliases, and values of the wrong type read as absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawMetadata")]
pub struct EntryMetadata {
    /// Summary or chunk.
    pub kind: Option<EntryKind>,
    /// Owning profile document.
    pub doc_id: Option<String>,
    /// Semantic subsection label, empty when unknown.
    pub section_block: String,
    /// Passage (or summary) text.
    pub text: String,
    /// Page the profile was taken from.
    pub source_url: String,
    /// Display name of the professor.
    pub professor_name: String,
}

/// Wire form with every spelling kept apart, so `kind` next to an unrelated
/// `type` key is not a duplicate field.
#[derive(Deserialize)]
struct RawMetadata {
    #[serde(default)]
    kind: Option<Value>,
    #[serde(default, rename = "type")]
    type_: Option<Value>,
    #[serde(default)]
    doc_id: Option<Value>,
    #[serde(default, rename = "docId")]
    doc_id_camel: Option<Value>,
    #[serde(default)]
    section_block: Option<Value>,
    #[serde(default, rename = "sectionBlock")]
    section_block_camel: Option<Value>,
    #[serde(default)]
    text: Option<Value>,
    #[serde(default)]
    source_url: Option<Value>,
    #[serde(default, rename = "sourceUrl")]
    source_url_camel: Option<Value>,
    #[serde(default)]
    professor_name: Option<Value>,
    #[serde(default, rename = "professorName")]
    professor_name_camel: Option<Value>,
}

impl From<RawMetadata> for EntryMetadata {
    fn from(raw: RawMetadata) -> Self {
        Self {
            kind: entry_kind(raw.kind.as_ref()).or_else(|| entry_kind(raw.type_.as_ref())),
            doc_id: string_field(raw.doc_id).or_else(|| string_field(raw.doc_id_camel)),
            section_block: string_field(raw.section_block)
                .or_else(|| string_field(raw.section_block_camel))
                .unwrap_or_default(),
            text: string_field(raw.text).unwrap_or_default(),
            source_url: string_field(raw.source_url)
                .or_else(|| string_field(raw.source_url_camel))
                .unwrap_or_default(),
            professor_name: string_field(raw.professor_name)
                .or_else(|| string_field(raw.professor_name_camel))
                .unwrap_or_default(),
        }
    }
}

fn entry_kind(value: Option<&Value>) -> Option<EntryKind> {
    match value?.as_str()?.trim().to_ascii_lowercase().as_str() {
        "summary" => Some(EntryKind::Summary),
        "chunk" => Some(EntryKind::Chunk),
        _ => None,
    }
}

fn string_field(value: Option<Value>) -> Option<String> {
    match value? {
        Value::String(text) => Some(text),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Ranked search result.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHit {
    /// Entry identifier as reported by the index.
    pub id: String,
    /// Similarity score; higher is closer.
    pub score: f32,
    /// Entry payload.
    pub metadata: EntryMetadata,
}

/// Nearest-neighbour search over the externally owned index.
///
/// Implementations return hits ranked by descending score. An empty result is
/// valid; any transport or service failure is a hard error.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Runs one filtered similarity query.
    async fn search(&self, request: &SearchRequest<'_>) -> Result<Vec<IndexHit>>;
}
