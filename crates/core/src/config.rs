use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_SIMILARITY_TOP_K: usize = 15;
pub const DEFAULT_MAX_PER_PAGE: usize = 1;
pub const DEFAULT_MAX_PER_DOCUMENT: usize = 2;
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.8;
pub const DEFAULT_MIN_TYPES: usize = 2;

/// Knobs for the three post-processing stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostprocessConfig {
    pub max_per_page: usize,
    pub max_per_document: usize,
    pub similarity_threshold: f64,
    pub min_types: usize,
    pub prefer_diverse: bool,
}

impl Default for PostprocessConfig {
    fn default() -> Self {
        Self {
            max_per_page: DEFAULT_MAX_PER_PAGE,
            max_per_document: DEFAULT_MAX_PER_DOCUMENT,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            min_types: DEFAULT_MIN_TYPES,
            prefer_diverse: true,
        }
    }
}

impl PostprocessConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_per_page == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_per_page",
                details: "must be at least 1".to_string(),
            });
        }
        if self.max_per_document == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_per_document",
                details: "must be at least 1".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(ConfigError::InvalidValue {
                field: "similarity_threshold",
                details: format!("{} is outside [0, 1]", self.similarity_threshold),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Candidates requested from the retriever before post-processing.
    pub similarity_top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            similarity_top_k: DEFAULT_SIMILARITY_TOP_K,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: usize,
    pub timeout_secs: u64,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.1,
            max_tokens: 2_048,
            timeout_secs: 60,
        }
    }
}

/// Process-wide settings for the query engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub retrieval: RetrievalConfig,
    pub postprocess: PostprocessConfig,
    pub synthesis: SynthesisConfig,
}

impl EngineConfig {
    /// Reads a JSON config file. Sections and keys left out keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retrieval.similarity_top_k == 0 {
            return Err(ConfigError::InvalidValue {
                field: "similarity_top_k",
                details: "must be at least 1".to_string(),
            });
        }
        self.postprocess.validate()
    }
}
