use crate::config::EngineConfig;
use crate::error::ConfigError;
use crate::pipeline::PostprocessPipeline;
use crate::traits::{Retriever, Synthesizer};
use crate::{Answer, SearchError};
use tracing::{info, warn};

/// Long-lived query context: built once per process and shared across queries.
///
/// Every query runs retrieve, then the post-processing pipeline, then
/// synthesis. Nothing is cached between queries.
pub struct QueryEngine<R, S>
where
    R: Retriever,
    S: Synthesizer,
{
    retriever: R,
    synthesizer: S,
    pipeline: PostprocessPipeline,
    similarity_top_k: usize,
}

impl<R, S> QueryEngine<R, S>
where
    R: Retriever + Send + Sync,
    S: Synthesizer + Send + Sync,
{
    pub fn new(retriever: R, synthesizer: S, config: &EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            retriever,
            synthesizer,
            pipeline: PostprocessPipeline::from_config(&config.postprocess)?,
            similarity_top_k: config.retrieval.similarity_top_k,
        })
    }

    pub async fn query(&self, query: &str) -> Result<Answer, SearchError> {
        if query.trim().is_empty() {
            return Err(SearchError::Request("query is empty".to_string()));
        }

        let candidates = self.retriever.retrieve(query, self.similarity_top_k).await?;
        let retrieved = candidates.len();
        let chunks = self.pipeline.run(candidates);
        let synthesis = self.synthesizer.synthesize(query, &chunks).await?;

        info!(
            retrieved,
            kept = chunks.len(),
            cited = synthesis.used.len(),
            "answered query"
        );
        Ok(Answer::new(query, synthesis.answer, synthesis.used))
    }

    /// Like [`QueryEngine::query`], but a failing retriever or synthesizer
    /// yields an explanatory answer with no sources instead of an error.
    pub async fn query_or_fallback(&self, query: &str) -> Answer {
        match self.query(query).await {
            Ok(answer) => answer,
            Err(error) => {
                warn!(%error, "query failed, returning fallback answer");
                Answer::new(query, fallback_message(&error), Vec::new())
            }
        }
    }
}

fn fallback_message(error: &SearchError) -> String {
    match error {
        SearchError::Request(details) => format!("I could not process this question: {details}."),
        SearchError::NotReady(_) => "No report content is available yet. Index some broker \
            research chunks and ask again."
            .to_string(),
        other => format!(
            "I encountered an error while answering from the report index. Error: {other}"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChunkMetadata, ContentType, ScoredChunk};
    use crate::traits::Synthesis;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeRetriever {
        hits: Vec<ScoredChunk>,
        requested_top_k: AtomicUsize,
    }

    impl FakeRetriever {
        fn new(hits: Vec<ScoredChunk>) -> Self {
            Self {
                hits,
                requested_top_k: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Retriever for FakeRetriever {
        async fn retrieve(
            &self,
            _query: &str,
            top_k: usize,
        ) -> Result<Vec<ScoredChunk>, SearchError> {
            self.requested_top_k.store(top_k, Ordering::SeqCst);
            Ok(self.hits.clone())
        }
    }

    struct FailingRetriever;

    #[async_trait]
    impl Retriever for FailingRetriever {
        async fn retrieve(
            &self,
            _query: &str,
            _top_k: usize,
        ) -> Result<Vec<ScoredChunk>, SearchError> {
            Err(SearchError::BackendResponse {
                backend: "qdrant".to_string(),
                details: "503 Service Unavailable".to_string(),
            })
        }
    }

    struct EchoSynthesizer;

    #[async_trait]
    impl Synthesizer for EchoSynthesizer {
        async fn synthesize(
            &self,
            query: &str,
            chunks: &[ScoredChunk],
        ) -> Result<Synthesis, SearchError> {
            Ok(Synthesis {
                answer: format!("{query}: {} excerpts", chunks.len()),
                used: chunks.to_vec(),
            })
        }
    }

    fn hit(broker: &str, page: u32, score: f64, text: &str) -> ScoredChunk {
        ScoredChunk {
            id: format!("{broker}-{page}-{score}"),
            text: text.to_string(),
            score: Some(score),
            metadata: ChunkMetadata {
                broker: Some(broker.to_string()),
                ticker: Some("NVDA".to_string()),
                report_date: Some("2024-01-15".to_string()),
                page_number: Some(page),
                content_type: Some(ContentType::Text),
                ..ChunkMetadata::default()
            },
        }
    }

    #[tokio::test]
    async fn engine_over_fetches_then_post_processes() {
        let retriever = FakeRetriever::new(vec![
            hit("UBS", 5, 0.9, "First chunk page 5"),
            hit("UBS", 5, 0.8, "Second chunk page 5"),
            hit("UBS", 6, 0.7, "First chunk page 6"),
            hit("UBS", 7, 0.6, "First chunk page 7"),
        ]);
        let engine =
            QueryEngine::new(retriever, EchoSynthesizer, &EngineConfig::default()).unwrap();

        let answer = engine.query("nvda outlook").await.unwrap();

        assert_eq!(engine.retriever.requested_top_k.load(Ordering::SeqCst), 15);
        assert_eq!(answer.text, "nvda outlook: 2 excerpts");
        let cited: Vec<&str> = answer
            .sources
            .iter()
            .map(|source| source.chunk_id.as_str())
            .collect();
        assert_eq!(cited, vec!["UBS-5-0.9", "UBS-6-0.7"]);
        assert_eq!(answer.sources.len(), answer.chunks.len());
    }

    #[tokio::test]
    async fn empty_query_is_rejected() {
        let engine = QueryEngine::new(
            FakeRetriever::new(Vec::new()),
            EchoSynthesizer,
            &EngineConfig::default(),
        )
        .unwrap();

        assert!(matches!(
            engine.query("   ").await,
            Err(SearchError::Request(_))
        ));
    }

    #[tokio::test]
    async fn retriever_failure_becomes_fallback_answer() {
        let engine =
            QueryEngine::new(FailingRetriever, EchoSynthesizer, &EngineConfig::default()).unwrap();

        let answer = engine.query_or_fallback("nvda outlook").await;
        assert!(answer.sources.is_empty());
        assert!(answer.text.contains("503 Service Unavailable"));
    }

    #[test]
    fn invalid_config_is_rejected_at_construction() {
        let mut config = EngineConfig::default();
        config.retrieval.similarity_top_k = 0;

        assert!(QueryEngine::new(FailingRetriever, EchoSynthesizer, &config).is_err());
    }
}
