//! Post-processing stages applied to over-fetched retrieval candidates.
//!
//! Each stage only selects and reorders chunks; none of them touches chunk
//! content and none of them can fail.

pub mod diversity;
pub mod page;
pub mod semantic;

pub use diversity::ContentTypeDiversifier;
pub use page::PageDeduplicator;
pub use semantic::{token_overlap, SemanticDeduplicator};

use crate::models::ScoredChunk;

pub trait NodePostprocessor {
    fn name(&self) -> &'static str;

    fn postprocess(&self, chunks: Vec<ScoredChunk>) -> Vec<ScoredChunk>;
}

/// Stable descending sort on [`ScoredChunk::rank_score`]; equal scores keep
/// their incoming order.
pub(crate) fn sort_by_score_desc(chunks: &mut [ScoredChunk]) {
    chunks.sort_by(|left, right| right.rank_score().total_cmp(&left.rank_score()));
}
