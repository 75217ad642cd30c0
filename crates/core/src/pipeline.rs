use crate::config::PostprocessConfig;
use crate::error::ConfigError;
use crate::models::ScoredChunk;
use crate::postprocess::{
    ContentTypeDiversifier, NodePostprocessor, PageDeduplicator, SemanticDeduplicator,
};
use tracing::info;

/// The three post-processing stages in their fixed order: page caps, then
/// near-duplicate removal, then content-type diversification.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostprocessPipeline {
    page: PageDeduplicator,
    semantic: SemanticDeduplicator,
    diversifier: ContentTypeDiversifier,
}

impl PostprocessPipeline {
    pub fn new(
        page: PageDeduplicator,
        semantic: SemanticDeduplicator,
        diversifier: ContentTypeDiversifier,
    ) -> Self {
        Self {
            page,
            semantic,
            diversifier,
        }
    }

    pub fn from_config(config: &PostprocessConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::new(
            PageDeduplicator::new(config.max_per_page, config.max_per_document),
            SemanticDeduplicator::new(config.similarity_threshold),
            ContentTypeDiversifier::new(config.min_types, config.prefer_diverse),
        ))
    }

    pub fn stages(&self) -> [&dyn NodePostprocessor; 3] {
        [&self.page, &self.semantic, &self.diversifier]
    }

    pub fn run(&self, candidates: Vec<ScoredChunk>) -> Vec<ScoredChunk> {
        let incoming = candidates.len();
        let mut counts = Vec::with_capacity(3);

        let mut chunks = candidates;
        for stage in self.stages() {
            chunks = stage.postprocess(chunks);
            counts.push((stage.name(), chunks.len()));
        }

        info!(incoming, stages = ?counts, "post-processed retrieval candidates");
        chunks
    }
}
