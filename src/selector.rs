//! Bounded, section-diverse passage selection.

use std::collections::HashSet;

use crate::planner::ScoredChunk;

/// Picks at most `limit` passages from a ranked candidate list.
///
/// The first pass walks the ranking and takes one passage per distinct,
/// non-empty section. The second pass fills the remaining slots in ranking
/// order with whatever was skipped. Output keeps acceptance order.
pub fn select_passages(candidates: Vec<ScoredChunk>, limit: usize) -> Vec<ScoredChunk> {
    if limit == 0 || candidates.is_empty() {
        return Vec::new();
    }

    let mut accepted = vec![false; candidates.len()];
    let mut order = Vec::with_capacity(limit.min(candidates.len()));
    {
        let mut seen_sections: HashSet<&str> = HashSet::new();
        for (idx, candidate) in candidates.iter().enumerate() {
            if order.len() >= limit {
                break;
            }
            let section = candidate.chunk.section_block.as_str();
            if section.is_empty() || !seen_sections.insert(section) {
                continue;
            }
            accepted[idx] = true;
            order.push(idx);
        }
    }

    for idx in 0..candidates.len() {
        if order.len() >= limit {
            break;
        }
        if !accepted[idx] {
            accepted[idx] = true;
            order.push(idx);
        }
    }

    let mut slots: Vec<Option<ScoredChunk>> = candidates.into_iter().map(Some).collect();
    order
        .into_iter()
        .filter_map(|idx| slots[idx].take())
        .collect()
}
