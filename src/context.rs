//! Renders selected passages for the answer model and for the client.

use serde::{Deserialize, Serialize};

use crate::planner::ScoredChunk;

const RECORD_DELIMITER: &str = "\n\n---\n\n";

/// One source as shown to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientMatch {
    /// Similarity reported by the index.
    pub score: f32,
    /// Display name of the professor.
    pub professor_name: String,
    /// Page the passage came from.
    pub source_url: String,
    /// Section label, empty when unknown.
    pub section_block: String,
    /// Whitespace-collapsed, length-capped excerpt.
    pub snippet: String,
}

/// Prompt-ready context plus the matching client list, in the same order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssembledContext {
    /// Numbered records for the answer model.
    pub prompt_block: String,
    /// Sources for the client; `matches[n]` is record `[#n+1]`.
    pub matches: Vec<ClientMatch>,
}

/// Builds both renderings from the selected passages.
pub fn assemble(selected: &[ScoredChunk], snippet_chars: usize) -> AssembledContext {
    let mut records = Vec::with_capacity(selected.len());
    let mut matches = Vec::with_capacity(selected.len());
    for (idx, scored) in selected.iter().enumerate() {
        let chunk = &scored.chunk;
        records.push(render_record(idx + 1, scored));
        matches.push(ClientMatch {
            score: scored.score,
            professor_name: chunk.professor_name.clone(),
            source_url: chunk.source_url.clone(),
            section_block: chunk.section_block.clone(),
            snippet: snippet(&chunk.text, snippet_chars),
        });
    }
    AssembledContext {
        prompt_block: records.join(RECORD_DELIMITER),
        matches,
    }
}

fn render_record(number: usize, scored: &ScoredChunk) -> String {
    let chunk = &scored.chunk;
    let professor = if chunk.professor_name.is_empty() {
        "Unknown professor"
    } else {
        chunk.professor_name.as_str()
    };
    let mut record = format!("[#{number}] Professor: {professor}\n");
    if !chunk.section_block.is_empty() {
        record.push_str(&format!("Section: {}\n", chunk.section_block));
    }
    if !chunk.source_url.is_empty() {
        record.push_str(&format!("Source: {}\n", chunk.source_url));
    }
    record.push_str(chunk.text.trim());
    record
}

/// Collapses whitespace and caps the result at `max_chars` characters,
/// ending with an ellipsis when the text was cut.
pub fn snippet(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }
    let keep = max_chars.saturating_sub(1);
    let mut out: String = collapsed.chars().take(keep).collect();
    out.truncate(out.trim_end().len());
    out.push('…');
    out
}
