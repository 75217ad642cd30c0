use crate::corpus::derive_chunk_id;
use crate::embeddings::{Embedder, HashingEmbedder};
use crate::traits::Retriever;
use crate::{ChunkMetadata, ScoredChunk, SearchError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

const BACKEND: &str = "qdrant";

pub struct QdrantStore {
    endpoint: String,
    collection: String,
    client: Client,
    embedder: HashingEmbedder,
}

impl QdrantStore {
    pub fn new(
        endpoint: impl Into<String>,
        collection: impl Into<String>,
        embedder: HashingEmbedder,
        timeout: Duration,
    ) -> Result<Self, SearchError> {
        Ok(Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            collection: collection.into(),
            client: Client::builder().timeout(timeout).build()?,
            embedder,
        })
    }

    fn collection_url(&self) -> String {
        format!("{}/collections/{}", self.endpoint, self.collection)
    }

    /// Creates the collection with cosine distance if it does not exist yet.
    pub async fn ensure_collection(&self) -> Result<(), SearchError> {
        let existing = self.client.get(self.collection_url()).send().await?;
        if collection_exists(existing.status())? {
            return Ok(());
        }

        let response = self
            .client
            .put(self.collection_url())
            .json(&json!({
                "vectors": {
                    "size": self.embedder.dimensions(),
                    "distance": "Cosine",
                }
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SearchError::BackendResponse {
                backend: BACKEND.to_string(),
                details: response.status().to_string(),
            });
        }
        Ok(())
    }

    /// Embeds and upserts chunks. Point ids derive from chunk ids, so
    /// re-indexing a corpus overwrites its points. Returns the number written.
    pub async fn index_chunks(&self, chunks: &[ScoredChunk]) -> Result<usize, SearchError> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let points = chunks
            .iter()
            .map(|chunk| {
                json!({
                    "id": point_uuid(chunk).to_string(),
                    "vector": self.embedder.embed(&chunk.text),
                    "payload": {
                        "chunk_id": chunk.id,
                        "text": chunk.text,
                        "metadata": chunk.metadata,
                    },
                })
            })
            .collect::<Vec<_>>();

        let response = self
            .client
            .put(format!("{}/points?wait=true", self.collection_url()))
            .json(&json!({ "points": points }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SearchError::BackendResponse {
                backend: BACKEND.to_string(),
                details: response.status().to_string(),
            });
        }

        debug!(collection = %self.collection, points = chunks.len(), "indexed chunks");
        Ok(chunks.len())
    }
}

#[async_trait]
impl Retriever for QdrantStore {
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<ScoredChunk>, SearchError> {
        let query_vector = self.embedder.embed(query);

        let response = self
            .client
            .post(format!("{}/points/search", self.collection_url()))
            .json(&json!({
                "vector": query_vector,
                "limit": top_k,
                "with_payload": true,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SearchError::BackendResponse {
                backend: BACKEND.to_string(),
                details: response.status().to_string(),
            });
        }

        let parsed: Value = response.json().await?;
        parse_search_hits(&parsed)
    }
}

/// `true` when the lookup found the collection, `false` on 404. Any other
/// status means the store could not answer and is reported as is.
fn collection_exists(status: StatusCode) -> Result<bool, SearchError> {
    match status {
        status if status.is_success() => Ok(true),
        StatusCode::NOT_FOUND => Ok(false),
        status => Err(SearchError::BackendResponse {
            backend: BACKEND.to_string(),
            details: format!("collection lookup returned {status}"),
        }),
    }
}

fn parse_search_hits(body: &Value) -> Result<Vec<ScoredChunk>, SearchError> {
    let hits = body
        .pointer("/result")
        .and_then(Value::as_array)
        .ok_or_else(|| SearchError::BackendResponse {
            backend: BACKEND.to_string(),
            details: "search response has no result array".to_string(),
        })?;

    Ok(hits.iter().map(hit_to_chunk).collect())
}

fn hit_to_chunk(hit: &Value) -> ScoredChunk {
    let text = hit
        .pointer("/payload/text")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let id = hit
        .pointer("/payload/chunk_id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .or_else(|| hit.pointer("/id").map(point_id))
        .unwrap_or_default();

    let metadata = hit
        .pointer("/payload/metadata")
        .map(ChunkMetadata::from_value_lenient)
        .unwrap_or_default();

    ScoredChunk {
        id,
        text,
        score: hit.pointer("/score").and_then(Value::as_f64),
        metadata,
    }
}

/// Stable point id: the first 16 bytes of the SHA-256 of the chunk id.
fn point_uuid(chunk: &ScoredChunk) -> Uuid {
    let key = if chunk.id.is_empty() {
        derive_chunk_id(chunk)
    } else {
        chunk.id.clone()
    };
    let digest = Sha256::digest(key.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes)
}

fn point_id(raw: &Value) -> String {
    match raw {
        Value::String(id) => id.clone(),
        other => other.to_string(),
    }
}
