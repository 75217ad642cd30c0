use crate::embeddings::{cosine_similarity, Embedder, HashingEmbedder};
use crate::traits::Retriever;
use crate::{ScoredChunk, SearchError};
use async_trait::async_trait;
use tracing::debug;

/// Brute-force cosine retriever over a corpus held in memory.
pub struct InMemoryRetriever<E = HashingEmbedder> {
    embedder: E,
    entries: Vec<(ScoredChunk, Vec<f32>)>,
}

impl InMemoryRetriever<HashingEmbedder> {
    pub fn from_chunks(chunks: Vec<ScoredChunk>) -> Self {
        Self::with_embedder(HashingEmbedder::default(), chunks)
    }
}

impl<E: Embedder> InMemoryRetriever<E> {
    pub fn with_embedder(embedder: E, chunks: Vec<ScoredChunk>) -> Self {
        let entries = chunks
            .into_iter()
            .map(|chunk| {
                let vector = embedder.embed(&chunk.text);
                (chunk, vector)
            })
            .collect();
        Self { embedder, entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl<E> Retriever for InMemoryRetriever<E>
where
    E: Embedder + Send + Sync,
{
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<ScoredChunk>, SearchError> {
        if self.entries.is_empty() {
            return Err(SearchError::NotReady("in-memory corpus is empty".to_string()));
        }

        let query_vector = self.embedder.embed(query);
        let mut ranked: Vec<(f64, &ScoredChunk)> = self
            .entries
            .iter()
            .map(|(chunk, vector)| (cosine_similarity(&query_vector, vector), chunk))
            .collect();
        ranked.sort_by(|left, right| right.0.total_cmp(&left.0));

        let hits: Vec<ScoredChunk> = ranked
            .into_iter()
            .take(top_k)
            .map(|(score, chunk)| chunk.clone().with_score(score))
            .collect();

        debug!(corpus = self.entries.len(), hits = hits.len(), "in-memory retrieval");
        Ok(hits)
    }
}
