use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DeserializeFromStr, DisplayFromStr, PickFirst, SerializeDisplay};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Number of characters kept in a citation preview before truncation.
pub const CITATION_PREVIEW_CHARS: usize = 200;

/// Broker shown in citations when a chunk carries none.
pub const UNKNOWN_BROKER: &str = "Unknown";

/// Origin category of a chunk. Table and image chunks carry a generated
/// summary or description as their text.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, SerializeDisplay,
    DeserializeFromStr,
)]
pub enum ContentType {
    #[default]
    Text,
    Table,
    Image,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Text => "text",
            ContentType::Table => "table",
            ContentType::Image => "image",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = Infallible;

    // Unrecognized categories fold into `text` rather than failing the record.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(match value.trim().to_ascii_lowercase().as_str() {
            "table" => ContentType::Table,
            "image" => ContentType::Image,
            _ => ContentType::Text,
        })
    }
}

/// Identity of the report a chunk came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceKey {
    pub broker: String,
    pub ticker: String,
    pub report_date: String,
}

/// Identity of a single page within a report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageKey {
    pub source: SourceKey,
    pub page_number: u32,
}

/// Retrieval metadata attached to every chunk.
///
/// Every field is optional on the wire; the accessor methods apply the
/// defaults used for grouping (empty strings, page 0, `text`). Keys other than
/// the ones named here are kept in `extra` and passed through untouched.
#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broker: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticker: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_date: Option<String>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<ContentType>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ChunkMetadata {
    pub fn source_key(&self) -> SourceKey {
        SourceKey {
            broker: self.broker.clone().unwrap_or_default(),
            ticker: self.ticker.clone().unwrap_or_default(),
            report_date: self.report_date.clone().unwrap_or_default(),
        }
    }

    pub fn page_key(&self) -> PageKey {
        PageKey {
            source: self.source_key(),
            page_number: self.page_number(),
        }
    }

    pub fn page_number(&self) -> u32 {
        self.page_number.unwrap_or(0)
    }

    pub fn content_type(&self) -> ContentType {
        self.content_type.unwrap_or_default()
    }

    /// Reads metadata from an untyped payload one key at a time.
    ///
    /// A malformed value only resets its own field to the default; the other
    /// fields survive and unknown keys go to `extra`. Anything but a JSON
    /// object yields empty metadata.
    pub fn from_value_lenient(raw: &serde_json::Value) -> Self {
        let mut metadata = Self::default();
        let Some(object) = raw.as_object() else {
            return metadata;
        };

        for (key, value) in object {
            match key.as_str() {
                "broker" => metadata.broker = lenient_string(value),
                "ticker" => metadata.ticker = lenient_string(value),
                "report_date" => metadata.report_date = lenient_string(value),
                "page_number" => metadata.page_number = lenient_page(value),
                "content_type" => {
                    metadata.content_type = value
                        .as_str()
                        .and_then(|kind| kind.parse::<ContentType>().ok())
                }
                _ => {
                    metadata.extra.insert(key.clone(), value.clone());
                }
            }
        }
        metadata
    }
}

fn lenient_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(text) => Some(text.clone()),
        serde_json::Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn lenient_page(value: &serde_json::Value) -> Option<u32> {
    match value {
        serde_json::Value::Number(number) => {
            number.as_u64().and_then(|page| u32::try_from(page).ok())
        }
        serde_json::Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

/// A retrieved unit of content together with its relevance score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    #[serde(default)]
    pub id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default)]
    pub metadata: ChunkMetadata,
}

impl ScoredChunk {
    pub fn new(text: impl Into<String>, score: Option<f64>, metadata: ChunkMetadata) -> Self {
        Self {
            id: String::new(),
            text: text.into(),
            score,
            metadata,
        }
    }

    /// Score used for ordering; a missing score ranks as zero.
    pub fn rank_score(&self) -> f64 {
        // `+ 0.0` turns -0.0 into 0.0 so both tie with a missing score.
        self.score.map_or(0.0, |score| score + 0.0)
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }
}

/// One entry of the source list shown next to an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceCitation {
    pub chunk_id: String,
    pub broker: String,
    pub ticker: String,
    pub report_date: String,
    pub page_number: Option<u32>,
    pub content_type: ContentType,
    pub score: Option<f64>,
    pub text_preview: String,
}

impl SourceCitation {
    pub fn from_chunk(chunk: &ScoredChunk) -> Self {
        let metadata = &chunk.metadata;
        Self {
            chunk_id: chunk.id.clone(),
            broker: metadata
                .broker
                .clone()
                .filter(|broker| !broker.is_empty())
                .unwrap_or_else(|| UNKNOWN_BROKER.to_string()),
            ticker: metadata.ticker.clone().unwrap_or_default(),
            report_date: metadata.report_date.clone().unwrap_or_default(),
            page_number: metadata.page_number,
            content_type: metadata.content_type(),
            score: chunk.score,
            text_preview: preview(&chunk.text, CITATION_PREVIEW_CHARS),
        }
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Final result of one query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub query: String,
    pub text: String,
    pub sources: Vec<SourceCitation>,
    pub chunks: Vec<ScoredChunk>,
    pub generated_at: DateTime<Utc>,
}

impl Answer {
    pub fn new(query: impl Into<String>, text: impl Into<String>, chunks: Vec<ScoredChunk>) -> Self {
        Self {
            query: query.into(),
            text: text.into(),
            sources: chunks.iter().map(SourceCitation::from_chunk).collect(),
            chunks,
            generated_at: Utc::now(),
        }
    }
}
