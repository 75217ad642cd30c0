use crate::{ScoredChunk, SearchError};
use async_trait::async_trait;

/// Source of over-fetched candidates for a query.
#[async_trait]
pub trait Retriever {
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<ScoredChunk>, SearchError>;
}

/// Answer text plus the chunks it was composed from.
#[derive(Debug, Clone)]
pub struct Synthesis {
    pub answer: String,
    pub used: Vec<ScoredChunk>,
}

#[async_trait]
pub trait Synthesizer {
    async fn synthesize(
        &self,
        query: &str,
        chunks: &[ScoredChunk],
    ) -> Result<Synthesis, SearchError>;
}

#[async_trait]
impl<T> Retriever for Box<T>
where
    T: Retriever + Send + Sync + ?Sized,
{
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<ScoredChunk>, SearchError> {
        (**self).retrieve(query, top_k).await
    }
}

#[async_trait]
impl<T> Synthesizer for Box<T>
where
    T: Synthesizer + Send + Sync + ?Sized,
{
    async fn synthesize(
        &self,
        query: &str,
        chunks: &[ScoredChunk],
    ) -> Result<Synthesis, SearchError> {
        (**self).synthesize(query, chunks).await
    }
}
