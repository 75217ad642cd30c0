use super::NodePostprocessor;
use crate::config::DEFAULT_SIMILARITY_THRESHOLD;
use crate::models::ScoredChunk;
use std::collections::HashSet;
use tracing::debug;

/// Drops chunks whose wording overlaps too much with an earlier kept chunk.
///
/// Selection is greedy in input order: the first chunk is always kept, and a
/// later one survives only if its [`token_overlap`] with every kept chunk is
/// at most `similarity_threshold`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SemanticDeduplicator {
    pub similarity_threshold: f64,
}

impl Default for SemanticDeduplicator {
    fn default() -> Self {
        Self::new(DEFAULT_SIMILARITY_THRESHOLD)
    }
}

impl SemanticDeduplicator {
    pub fn new(similarity_threshold: f64) -> Self {
        Self {
            similarity_threshold,
        }
    }

    pub fn reduce(&self, chunks: Vec<ScoredChunk>) -> Vec<ScoredChunk> {
        if chunks.len() <= 1 {
            return chunks;
        }

        let incoming = chunks.len();
        let mut kept: Vec<ScoredChunk> = Vec::with_capacity(incoming);
        let mut kept_tokens: Vec<HashSet<String>> = Vec::with_capacity(incoming);

        for candidate in chunks {
            let tokens = token_set(&candidate.text);
            let duplicate = kept_tokens
                .iter()
                .any(|existing| jaccard(&tokens, existing) > self.similarity_threshold);

            if !duplicate {
                kept_tokens.push(tokens);
                kept.push(candidate);
            }
        }

        debug!(incoming, kept = kept.len(), "semantic deduplication");
        kept
    }
}

impl NodePostprocessor for SemanticDeduplicator {
    fn name(&self) -> &'static str {
        "semantic_deduplicator"
    }

    fn postprocess(&self, chunks: Vec<ScoredChunk>) -> Vec<ScoredChunk> {
        self.reduce(chunks)
    }
}

/// Jaccard overlap of the lower-cased whitespace token sets of two texts.
/// Returns 0 when either text has no tokens.
pub fn token_overlap(left: &str, right: &str) -> f64 {
    jaccard(&token_set(left), &token_set(right))
}

fn token_set(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

fn jaccard(left: &HashSet<String>, right: &HashSet<String>) -> f64 {
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }

    let shared = left.intersection(right).count();
    let union = left.len() + right.len() - shared;
    shared as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::postprocess::fixtures::{chunk, scores};

    fn with_text(text: &str, score: f64) -> ScoredChunk {
        chunk("UBS", "NVDA", "2024-01-15", 1, score, text)
    }

    #[test]
    fn identical_texts_collapse_to_the_first() {
        let text = "Data center revenue grew 40% quarter over quarter";
        let chunks = vec![
            with_text(text, 0.9),
            with_text(text, 0.85),
            with_text(text, 0.7),
        ];

        let result = SemanticDeduplicator::new(0.8).reduce(chunks);
        assert_eq!(scores(&result), vec![0.9]);
    }

    #[test]
    fn distinct_texts_are_all_kept_in_order() {
        let chunks = vec![
            with_text("Price target raised to $650", 0.9),
            with_text("Gross margin guidance unchanged at 75%", 0.8),
            with_text("Risks include export restrictions", 0.7),
        ];

        let result = SemanticDeduplicator::default().reduce(chunks);
        assert_eq!(scores(&result), vec![0.9, 0.8, 0.7]);
    }

    #[test]
    fn threshold_comparison_is_strict() {
        // 4 shared tokens out of 5 distinct: overlap is exactly 0.8.
        let chunks = vec![
            with_text("alpha beta gamma delta", 0.9),
            with_text("alpha beta gamma delta epsilon", 0.8),
        ];

        assert_eq!(SemanticDeduplicator::new(0.8).reduce(chunks.clone()).len(), 2);
        assert_eq!(SemanticDeduplicator::new(0.79).reduce(chunks).len(), 1);
    }

    #[test]
    fn candidate_is_checked_against_every_kept_chunk() {
        let chunks = vec![
            with_text("price target raised to 650 on ai demand", 0.9),
            with_text("gross margin guidance unchanged at 75 percent", 0.8),
            with_text("gross margin guidance unchanged at 75 percent again", 0.7),
        ];

        let result = SemanticDeduplicator::new(0.8).reduce(chunks);
        assert_eq!(scores(&result), vec![0.9, 0.8]);
    }

    #[test]
    fn overlap_is_case_insensitive_and_symmetric() {
        let left = "Revenue BEAT consensus";
        let right = "revenue beat Consensus estimates";
        assert_eq!(token_overlap(left, right), 0.75);
        assert_eq!(token_overlap(left, right), token_overlap(right, left));
    }

    #[test]
    fn empty_text_never_counts_as_duplicate() {
        assert_eq!(token_overlap("", "anything"), 0.0);
        assert_eq!(token_overlap("   ", "   "), 0.0);

        let chunks = vec![with_text("", 0.9), with_text("", 0.8)];
        assert_eq!(SemanticDeduplicator::default().reduce(chunks).len(), 2);
    }

    #[test]
    fn short_inputs_are_returned_unchanged() {
        assert!(SemanticDeduplicator::default().reduce(Vec::new()).is_empty());

        let single = vec![with_text("only", 0.3)];
        assert_eq!(SemanticDeduplicator::default().reduce(single.clone()), single);
    }

    #[test]
    fn rerunning_on_output_is_a_no_op() {
        let chunks = vec![
            with_text("nvidia raises guidance on strong ai demand", 0.9),
            with_text("nvidia raises guidance on strong ai demand again", 0.85),
            with_text("apple services growth slows", 0.8),
            with_text("apple services growth slows further", 0.75),
            with_text("tesla deliveries miss", 0.7),
        ];

        for threshold in [0.3, 0.5, 0.8, 1.0] {
            let dedup = SemanticDeduplicator::new(threshold);
            let once = dedup.reduce(chunks.clone());
            assert!(once.iter().all(|chunk| chunks.contains(chunk)));
            assert_eq!(dedup.reduce(once.clone()), once);
        }
    }
}
