use super::{sort_by_score_desc, NodePostprocessor};
use crate::config::{DEFAULT_MAX_PER_DOCUMENT, DEFAULT_MAX_PER_PAGE};
use crate::models::{PageKey, ScoredChunk, SourceKey};
use std::collections::HashMap;
use tracing::debug;

/// Caps how many chunks a single page and a single report may contribute.
///
/// Chunks without source or page metadata share the empty key and are capped
/// against each other like any other page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageDeduplicator {
    pub max_per_page: usize,
    pub max_per_document: usize,
}

impl Default for PageDeduplicator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PER_PAGE, DEFAULT_MAX_PER_DOCUMENT)
    }
}

impl PageDeduplicator {
    pub fn new(max_per_page: usize, max_per_document: usize) -> Self {
        Self {
            max_per_page,
            max_per_document,
        }
    }

    pub fn reduce(&self, chunks: Vec<ScoredChunk>) -> Vec<ScoredChunk> {
        let incoming = chunks.len();

        let mut selected = best_per_page(chunks, self.max_per_page);
        sort_by_score_desc(&mut selected);

        let mut per_document = HashMap::<SourceKey, usize>::new();
        let kept: Vec<ScoredChunk> = selected
            .into_iter()
            .filter(|chunk| {
                let count = per_document
                    .entry(chunk.metadata.source_key())
                    .or_default();
                if *count < self.max_per_document {
                    *count += 1;
                    true
                } else {
                    false
                }
            })
            .collect();

        debug!(
            incoming,
            kept = kept.len(),
            documents = per_document.len(),
            "page deduplication"
        );
        kept
    }
}

/// Groups by page (first-seen page order) and keeps the top `limit` of each.
fn best_per_page(chunks: Vec<ScoredChunk>, limit: usize) -> Vec<ScoredChunk> {
    let mut slots = HashMap::<PageKey, usize>::new();
    let mut pages: Vec<Vec<ScoredChunk>> = Vec::new();

    for chunk in chunks {
        let key = chunk.metadata.page_key();
        let slot = *slots.entry(key).or_insert_with(|| {
            pages.push(Vec::new());
            pages.len() - 1
        });
        pages[slot].push(chunk);
    }

    pages
        .into_iter()
        .flat_map(|mut page| {
            sort_by_score_desc(&mut page);
            page.truncate(limit);
            page
        })
        .collect()
}

impl NodePostprocessor for PageDeduplicator {
    fn name(&self) -> &'static str {
        "page_deduplicator"
    }

    fn postprocess(&self, chunks: Vec<ScoredChunk>) -> Vec<ScoredChunk> {
        self.reduce(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkMetadata;
    use crate::postprocess::fixtures::{chunk, scores};
    use std::collections::HashMap;

    fn mixed_reports() -> Vec<ScoredChunk> {
        vec![
            chunk("UBS", "NVDA", "2024-01-15", 1, 0.95, "ubs nvda p1"),
            chunk("UBS", "NVDA", "2024-01-15", 2, 0.94, "ubs nvda p2"),
            chunk("UBS", "NVDA", "2024-01-15", 3, 0.89, "ubs nvda p3"),
            chunk("Goldman", "NVDA", "2024-01-20", 1, 0.93, "gs nvda p1"),
            chunk("Goldman", "NVDA", "2024-01-20", 2, 0.92, "gs nvda p2"),
            chunk("UBS", "AAPL", "2024-01-10", 1, 0.91, "ubs aapl p1"),
            chunk("UBS", "AAPL", "2024-01-10", 1, 0.60, "ubs aapl p1 again"),
        ]
    }

    #[test]
    fn keeps_one_chunk_per_page() {
        let chunks = vec![
            chunk("UBS", "NVDA", "2024-01-15", 5, 0.9, "First chunk page 5"),
            chunk("UBS", "NVDA", "2024-01-15", 5, 0.8, "Second chunk page 5"),
            chunk("UBS", "NVDA", "2024-01-15", 6, 0.7, "First chunk page 6"),
        ];

        let result = PageDeduplicator::new(1, 2).reduce(chunks);
        assert_eq!(scores(&result), vec![0.9, 0.7]);
    }

    #[test]
    fn caps_chunks_per_document() {
        let chunks = vec![
            chunk("UBS", "NVDA", "2024-01-15", 1, 0.95, "a"),
            chunk("UBS", "NVDA", "2024-01-15", 2, 0.90, "b"),
            chunk("UBS", "NVDA", "2024-01-15", 3, 0.85, "c"),
            chunk("UBS", "NVDA", "2024-01-15", 4, 0.80, "d"),
        ];

        let result = PageDeduplicator::default().reduce(chunks);
        assert_eq!(scores(&result), vec![0.95, 0.90]);
    }

    #[test]
    fn spreads_results_across_documents() {
        let result = PageDeduplicator::new(1, 2).reduce(mixed_reports());

        assert_eq!(result.len(), 5);
        let ubs_nvda = result
            .iter()
            .filter(|chunk| {
                chunk.metadata.broker.as_deref() == Some("UBS")
                    && chunk.metadata.ticker.as_deref() == Some("NVDA")
            })
            .count();
        assert_eq!(ubs_nvda, 2);
    }

    #[test]
    fn highest_score_on_a_page_wins_regardless_of_position() {
        let chunks = vec![
            chunk("UBS", "NVDA", "2024-01-15", 10, 0.7, "Lower score"),
            chunk("UBS", "NVDA", "2024-01-15", 10, 0.9, "Higher score"),
            chunk("UBS", "NVDA", "2024-01-15", 10, 0.8, "Medium score"),
        ];

        let result = PageDeduplicator::default().reduce(chunks);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].text, "Higher score");
    }

    #[test]
    fn custom_page_cap_keeps_top_chunks() {
        let chunks = vec![
            chunk("UBS", "NVDA", "2024-01-15", 5, 0.9, "a"),
            chunk("UBS", "NVDA", "2024-01-15", 5, 0.8, "b"),
            chunk("UBS", "NVDA", "2024-01-15", 5, 0.7, "c"),
        ];

        let result = PageDeduplicator::new(2, 10).reduce(chunks);
        assert_eq!(scores(&result), vec![0.9, 0.8]);
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert!(PageDeduplicator::default().reduce(Vec::new()).is_empty());
    }

    #[test]
    fn chunks_without_metadata_share_one_page() {
        let bare = ScoredChunk::new("No metadata", Some(0.9), ChunkMetadata::default());
        let also_bare = ScoredChunk::new("Also none", Some(0.5), ChunkMetadata::default());
        let partial = ScoredChunk::new(
            "Partial metadata",
            Some(0.8),
            ChunkMetadata {
                broker: Some("UBS".to_string()),
                ..ChunkMetadata::default()
            },
        );

        let result = PageDeduplicator::default().reduce(vec![bare, partial, also_bare]);
        assert_eq!(scores(&result), vec![0.9, 0.8]);
    }

    #[test]
    fn missing_scores_rank_as_zero() {
        let mut unscored = chunk("UBS", "NVDA", "2024-01-15", 1, 0.0, "unscored");
        unscored.score = None;
        let scored = chunk("UBS", "NVDA", "2024-01-15", 1, 0.1, "scored");

        let result = PageDeduplicator::default().reduce(vec![unscored, scored]);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].text, "scored");
    }

    #[test]
    fn negative_zero_ties_with_zero_and_missing_scores() {
        let mut unscored = chunk("UBS", "NVDA", "2024-01-15", 1, 0.0, "unscored");
        unscored.score = None;
        let chunks = vec![
            chunk("Jefferies", "AMD", "2024-02-01", 1, -0.0, "negative zero"),
            unscored,
            chunk("Citi", "TSLA", "2024-03-01", 1, 0.0, "zero"),
        ];

        let result = PageDeduplicator::default().reduce(chunks);
        let texts: Vec<&str> = result.iter().map(|chunk| chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["negative zero", "unscored", "zero"]);
    }

    #[test]
    fn equal_scores_keep_input_order() {
        let chunks = vec![
            chunk("UBS", "NVDA", "2024-01-15", 1, 0.5, "first"),
            chunk("Jefferies", "AMD", "2024-02-01", 1, 0.5, "second"),
            chunk("Citi", "TSLA", "2024-03-01", 1, 0.5, "third"),
        ];

        let result = PageDeduplicator::default().reduce(chunks);
        let texts: Vec<&str> = result.iter().map(|chunk| chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
    }

    #[test]
    fn output_honours_caps_and_is_a_sorted_subsequence() {
        let input = mixed_reports();
        for (per_page, per_document) in [(1, 1), (1, 2), (2, 2), (2, 3), (3, 10)] {
            let result = PageDeduplicator::new(per_page, per_document).reduce(input.clone());

            let mut pages = HashMap::new();
            let mut documents = HashMap::new();
            for chunk in &result {
                assert!(input.contains(chunk));
                *pages.entry(chunk.metadata.page_key()).or_insert(0usize) += 1;
                *documents.entry(chunk.metadata.source_key()).or_insert(0usize) += 1;
            }
            assert!(pages.values().all(|count| *count <= per_page));
            assert!(documents.values().all(|count| *count <= per_document));
            assert!(result
                .windows(2)
                .all(|pair| pair[0].rank_score() >= pair[1].rank_score()));
        }
    }
}
