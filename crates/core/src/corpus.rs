use crate::error::CorpusError;
use crate::ScoredChunk;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Parses chunk records from a JSON array or from JSON Lines (blank lines are
/// skipped). Records without an id get a content-derived one.
pub fn parse_chunks(raw: &str) -> Result<Vec<ScoredChunk>, CorpusError> {
    let trimmed = raw.trim_start();

    let mut chunks = if trimmed.starts_with('[') {
        serde_json::from_str::<Vec<ScoredChunk>>(trimmed).map_err(CorpusError::InvalidArray)?
    } else {
        raw.lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(index, line)| {
                serde_json::from_str::<ScoredChunk>(line).map_err(|source| {
                    CorpusError::InvalidRecord {
                        line: index + 1,
                        source,
                    }
                })
            })
            .collect::<Result<Vec<_>, _>>()?
    };

    for chunk in chunks.iter_mut().filter(|chunk| chunk.id.is_empty()) {
        chunk.id = derive_chunk_id(chunk);
    }
    Ok(chunks)
}

pub async fn read_chunks(path: &Path) -> Result<Vec<ScoredChunk>, CorpusError> {
    parse_chunks(&tokio::fs::read_to_string(path).await?)
}

pub fn derive_chunk_id(chunk: &ScoredChunk) -> String {
    let page = chunk.metadata.page_key();
    let mut hasher = Sha256::new();
    hasher.update(page.source.broker.as_bytes());
    hasher.update([0]);
    hasher.update(page.source.ticker.as_bytes());
    hasher.update([0]);
    hasher.update(page.source.report_date.as_bytes());
    hasher.update(page.page_number.to_le_bytes());
    hasher.update(chunk.metadata.content_type().as_str().as_bytes());
    hasher.update(chunk.text.as_bytes());
    format!("{:x}", hasher.finalize())
}
