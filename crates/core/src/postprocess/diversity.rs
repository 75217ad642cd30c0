use super::{sort_by_score_desc, NodePostprocessor};
use crate::config::DEFAULT_MIN_TYPES;
use crate::models::{ContentType, ScoredChunk};
use std::collections::VecDeque;
use tracing::debug;

/// Interleaves text, table and image chunks when too few categories are
/// present.
///
/// The interleaved list is re-sorted by score at the end, so the round-robin
/// order only decides ties between equal scores. That final sort is kept
/// as-is; see `round_robin_only_breaks_ties` below.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentTypeDiversifier {
    pub min_types: usize,
    pub prefer_diverse: bool,
}

impl Default for ContentTypeDiversifier {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_TYPES, true)
    }
}

impl ContentTypeDiversifier {
    pub fn new(min_types: usize, prefer_diverse: bool) -> Self {
        Self {
            min_types,
            prefer_diverse,
        }
    }

    pub fn reduce(&self, chunks: Vec<ScoredChunk>) -> Vec<ScoredChunk> {
        if !self.prefer_diverse {
            return chunks;
        }

        let mut groups = group_by_type(&chunks);
        if groups.len() >= self.min_types {
            return chunks;
        }

        let total = chunks.len();
        let mut slots: Vec<Option<ScoredChunk>> = chunks.into_iter().map(Some).collect();
        let mut interleaved = Vec::with_capacity(total);

        while !groups.is_empty() {
            for (_, positions) in groups.iter_mut() {
                if let Some(chunk) = positions.pop_front().and_then(|index| slots[index].take()) {
                    interleaved.push(chunk);
                }
            }
            groups.retain(|(_, positions)| !positions.is_empty());
        }

        sort_by_score_desc(&mut interleaved);
        debug!(
            chunks = total,
            min_types = self.min_types,
            "content type diversification"
        );
        interleaved
    }
}

/// Chunk positions per content type, types in first-seen order.
fn group_by_type(chunks: &[ScoredChunk]) -> Vec<(ContentType, VecDeque<usize>)> {
    let mut groups: Vec<(ContentType, VecDeque<usize>)> = Vec::new();
    for (index, chunk) in chunks.iter().enumerate() {
        let content_type = chunk.metadata.content_type();
        match groups.iter_mut().find(|(kind, _)| *kind == content_type) {
            Some((_, positions)) => positions.push_back(index),
            None => groups.push((content_type, VecDeque::from([index]))),
        }
    }
    groups
}

impl NodePostprocessor for ContentTypeDiversifier {
    fn name(&self) -> &'static str {
        "content_type_diversifier"
    }

    fn postprocess(&self, chunks: Vec<ScoredChunk>) -> Vec<ScoredChunk> {
        self.reduce(chunks)
    }
}
