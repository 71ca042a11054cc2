//! Summarizer Client (C3, §4.3): polymorphic over LLM providers, exposing
//! `Summarize` and `Keywords`.
//!
//! Grounded in the teacher's `src/agents/traits.rs` (`LlmProvider` trait,
//! `Message`/`LlmConfig`, the markdown-code-fence-stripping JSON parse
//! helper) and `src/agents/paper_analyzer.rs` (the provider-generic struct
//! pattern). The teacher's `AnalysisAgent` trait (full structured paper
//! analysis: methodology, datasets, translation, ...) is narrowed to this
//! system's two operations, since the Markdown template and prompt
//! specifics are explicitly out of scope (§1 non-goals).

pub mod providers;

use crate::error::{RefNetError, RefNetResult};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Role of a message in a conversation, grounded in the teacher's
/// `MessageRole`/`Message` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// One LLM backend. `complete` is the only required method; `complete_json`
/// reuses the teacher's code-fence-stripping parse helper.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;
    fn default_model(&self) -> &str;
    async fn complete(&self, messages: Vec<Message>, config: &LlmConfig) -> RefNetResult<String>;

    async fn complete_json<T: DeserializeOwned + Send>(
        &self,
        messages: Vec<Message>,
        config: &LlmConfig,
    ) -> RefNetResult<T> {
        let response = self.complete(messages, config).await?;
        parse_json_response(&response)
    }
}

/// Strips ```json ... ``` / ``` ... ``` code fences before parsing, the
/// teacher's `parse_json_response` helper verbatim.
pub fn parse_json_response<T: DeserializeOwned>(response: &str) -> RefNetResult<T> {
    let json_str = if response.contains("```json") {
        response
            .split("```json")
            .nth(1)
            .and_then(|s| s.split("```").next())
            .map(|s| s.trim())
            .unwrap_or(response)
    } else if response.contains("```") {
        response
            .split("```")
            .nth(1)
            .map(|s| s.trim())
            .unwrap_or(response)
    } else {
        response.trim()
    };

    serde_json::from_str(json_str).map_err(|e| {
        RefNetError::Permanent(format!(
            "failed to parse JSON response: {e}. Response: {}",
            &response[..response.len().min(500)]
        ))
    })
}

/// Byte budgets per §4.7 ("cap input ~8k chars for OpenAI-style, ~100k for
/// Anthropic-style").
pub fn truncate_for_provider(text: &str, provider: &str) -> String {
    let budget = match provider {
        "anthropic" => 100_000,
        _ => 8_000,
    };
    match text.char_indices().nth(budget) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct KeywordsResponse {
    keywords: Vec<String>,
}

/// `SummarizerClient`: the C3 contract — `Summarize` and `Keywords`.
pub struct SummarizerClient<P: LlmProvider> {
    provider: P,
    model: Option<String>,
    temperature: f32,
    max_tokens: u32,
}

impl<P: LlmProvider> SummarizerClient<P> {
    pub fn new(provider: P, model: Option<String>, temperature: f32, max_tokens: u32) -> Self {
        Self {
            provider,
            model,
            temperature,
            max_tokens,
        }
    }

    fn config(&self) -> LlmConfig {
        LlmConfig {
            model: self.model_name(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }

    /// The model id actually used for calls — the configured override, or
    /// the provider's default. Recorded into `Paper::summary_model` (§3).
    pub fn model_name(&self) -> String {
        self.model
            .clone()
            .unwrap_or_else(|| self.provider.default_model().to_string())
    }

    /// `Summarize(text, maxTokens) -> string` (§4.3).
    pub async fn summarize(&self, text: &str) -> RefNetResult<String> {
        let truncated = truncate_for_provider(text, self.provider.name());
        let messages = vec![
            Message::system(
                "You are an expert research assistant. Produce a concise, \
                 accurate abstractive summary of the following paper text.",
            ),
            Message::user(truncated),
        ];
        self.provider.complete(messages, &self.config()).await
    }

    /// `Keywords(text, k) -> [string]` (§4.3). Post-processing: split on
    /// commas, trim, drop empties, dedupe case-insensitively, cap at `k`.
    pub async fn keywords(&self, text: &str, k: usize) -> RefNetResult<Vec<String>> {
        let truncated = truncate_for_provider(text, self.provider.name());
        let messages = vec![
            Message::system(
                "Extract the most salient technical keywords from the \
                 following paper text. Respond as JSON: {\"keywords\": [...]}",
            ),
            Message::user(truncated),
        ];
        let response: KeywordsResponse =
            self.provider.complete_json(messages, &self.config()).await?;
        Ok(post_process_keywords(response.keywords, k))
    }
}

/// Split-on-commas fallback path used when a provider returns prose rather
/// than structured JSON, plus the shared post-processing pipeline.
pub fn post_process_keywords(raw: Vec<String>, k: usize) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for item in raw {
        for piece in item.split(',') {
            let trimmed = piece.trim();
            if trimmed.is_empty() {
                continue;
            }
            let key = trimmed.to_lowercase();
            if seen.insert(key) {
                out.push(trimmed.to_string());
            }
            if out.len() >= k {
                return out;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_process_dedupes_case_insensitively() {
        let raw = vec!["Transformers".into(), "transformers".into(), "Attention".into()];
        let result = post_process_keywords(raw, 10);
        assert_eq!(result, vec!["Transformers", "Attention"]);
    }

    #[test]
    fn post_process_caps_at_k() {
        let raw = vec!["a".into(), "b".into(), "c".into()];
        let result = post_process_keywords(raw, 2);
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn post_process_splits_on_commas_and_trims() {
        let raw = vec!["alpha, beta , , gamma".into()];
        let result = post_process_keywords(raw, 10);
        assert_eq!(result, vec!["alpha", "beta", "gamma"]);
    }

    #[test]
    fn truncate_uses_provider_specific_budget() {
        let long = "x".repeat(9_000);
        assert_eq!(truncate_for_provider(&long, "openai").chars().count(), 8_000);
        assert_eq!(
            truncate_for_provider(&long, "anthropic").chars().count(),
            9_000
        );
    }

    #[test]
    fn parse_json_response_strips_code_fences() {
        let response = "```json\n{\"keywords\": [\"a\", \"b\"]}\n```";
        let parsed: KeywordsResponse = parse_json_response(response).unwrap();
        assert_eq!(parsed.keywords, vec!["a", "b"]);
    }
}
