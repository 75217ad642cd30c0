use crate::config::SynthesisConfig;
use crate::traits::{Synthesis, Synthesizer};
use crate::{ScoredChunk, SearchError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::time::Duration;

const SYSTEM_PROMPT: &str = "You answer questions about broker research reports using only the \
numbered context excerpts. Cite excerpts as [n]. If the context does not contain the answer, say so.";

/// Renders the numbered context block shared by all synthesizers.
pub fn render_context(chunks: &[ScoredChunk]) -> String {
    let mut context = String::new();
    for (position, chunk) in chunks.iter().enumerate() {
        let source = chunk.metadata.source_key();
        let _ = writeln!(
            context,
            "[{}] {} {} {} p.{} ({})",
            position + 1,
            source.broker,
            source.ticker,
            source.report_date,
            chunk.metadata.page_number(),
            chunk.metadata.content_type(),
        );
        let _ = writeln!(context, "{}\n", chunk.text.trim());
    }
    context
}

pub fn build_prompt(query: &str, chunks: &[ScoredChunk]) -> String {
    format!(
        "Context excerpts:\n\n{}Question: {}\nAnswer:",
        render_context(chunks),
        query.trim()
    )
}

/// Chat-completions synthesizer for OpenAI and API-compatible servers.
pub struct OpenAiSynthesizer {
    api_key: String,
    config: SynthesisConfig,
    client: Client,
}

impl OpenAiSynthesizer {
    pub fn new(api_key: impl Into<String>, config: SynthesisConfig) -> Result<Self, SearchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            api_key: api_key.into(),
            config,
            client,
        })
    }
}

#[async_trait]
impl Synthesizer for OpenAiSynthesizer {
    async fn synthesize(
        &self,
        query: &str,
        chunks: &[ScoredChunk],
    ) -> Result<Synthesis, SearchError> {
        let prompt = build_prompt(query, chunks);
        let body = ChatRequest {
            model: &self.config.model,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
        };

        let response = self
            .client
            .post(format!(
                "{}/chat/completions",
                self.config.base_url.trim_end_matches('/')
            ))
            .bearer_auth(self.api_key.trim())
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(SearchError::BackendResponse {
                backend: "openai".to_string(),
                details: format!("{status}: {text}"),
            });
        }

        let parsed: ChatResponse = response.json().await?;
        let answer = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| SearchError::BackendResponse {
                backend: "openai".to_string(),
                details: "completion has no choices".to_string(),
            })?;

        Ok(Synthesis {
            answer: answer.trim().to_string(),
            used: chunks.to_vec(),
        })
    }
}

/// Offline synthesizer that quotes the best excerpts instead of calling a model.
#[derive(Debug, Clone, Copy)]
pub struct ExtractiveSynthesizer {
    pub max_excerpts: usize,
}

impl Default for ExtractiveSynthesizer {
    fn default() -> Self {
        Self { max_excerpts: 3 }
    }
}

#[async_trait]
impl Synthesizer for ExtractiveSynthesizer {
    async fn synthesize(
        &self,
        query: &str,
        chunks: &[ScoredChunk],
    ) -> Result<Synthesis, SearchError> {
        let used: Vec<ScoredChunk> = chunks.iter().take(self.max_excerpts).cloned().collect();

        if used.is_empty() {
            return Ok(Synthesis {
                answer: format!("No report excerpts matched \"{}\".", query.trim()),
                used,
            });
        }

        let mut answer = format!("Most relevant excerpts for \"{}\":\n", query.trim());
        for (position, chunk) in used.iter().enumerate() {
            let _ = write!(answer, "\n[{}] {}", position + 1, chunk.text.trim());
        }

        Ok(Synthesis { answer, used })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: usize,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: String,
}
