pub mod config;
pub mod corpus;
pub mod embeddings;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod pipeline;
pub mod postprocess;
pub mod stores;
pub mod synthesizer;
pub mod traits;

pub use config::{EngineConfig, PostprocessConfig, RetrievalConfig, SynthesisConfig};
pub use corpus::{parse_chunks, read_chunks};
pub use embeddings::{cosine_similarity, Embedder, HashingEmbedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{ConfigError, CorpusError, SearchError};
pub use models::{
    Answer, ChunkMetadata, ContentType, PageKey, ScoredChunk, SourceCitation, SourceKey,
};
pub use orchestrator::QueryEngine;
pub use pipeline::PostprocessPipeline;
pub use postprocess::{
    token_overlap, ContentTypeDiversifier, NodePostprocessor, PageDeduplicator,
    SemanticDeduplicator,
};
pub use stores::{InMemoryRetriever, QdrantStore};
pub use synthesizer::{build_prompt, ExtractiveSynthesizer, OpenAiSynthesizer};
pub use traits::{Retriever, Synthesis, Synthesizer};
