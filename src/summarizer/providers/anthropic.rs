//! Anthropic provider using `anthropic-tools`, kept near-verbatim from the
//! teacher's `src/agents/providers/anthropic.rs`.

use crate::error::{RefNetError, RefNetResult};
use crate::summarizer::{LlmConfig, LlmProvider, Message, MessageRole};
use anthropic_tools::Messages;
use async_trait::async_trait;

const DEFAULT_ANTHROPIC_MODEL: &str = "claude-sonnet-4-20250514";

pub struct AnthropicProvider {
    default_model: String,
}

impl AnthropicProvider {
    pub fn new(_api_key: impl Into<String>) -> Self {
        Self {
            default_model: DEFAULT_ANTHROPIC_MODEL.to_string(),
        }
    }

    pub fn with_model(model: impl Into<String>) -> Self {
        Self {
            default_model: model.into(),
        }
    }

    pub fn from_env() -> RefNetResult<Self> {
        std::env::var("ANTHROPIC_API_KEY").map_err(|_| {
            RefNetError::Config("ANTHROPIC_API_KEY environment variable not set".into())
        })?;
        let model =
            std::env::var("ANTHROPIC_MODEL").unwrap_or_else(|_| DEFAULT_ANTHROPIC_MODEL.to_string());
        Ok(Self { default_model: model })
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    async fn complete(&self, messages: Vec<Message>, config: &LlmConfig) -> RefNetResult<String> {
        let model = if config.model.is_empty() {
            self.default_model().to_string()
        } else {
            config.model.clone()
        };

        let mut client = Messages::new();
        client
            .model(model.as_str())
            .max_tokens(config.max_tokens as usize)
            .temperature(config.temperature);

        for msg in messages {
            match msg.role {
                MessageRole::System => {
                    client.system(&msg.content);
                }
                MessageRole::User => {
                    client.user(&msg.content);
                }
                MessageRole::Assistant => {
                    client.assistant(&msg.content);
                }
            }
        }

        let response = client
            .post()
            .await
            .map_err(|e| RefNetError::Transient(format!("Anthropic API error: {e}")))?;

        let text = response.get_text();
        if text.is_empty() {
            Err(RefNetError::Permanent("no text response from Anthropic".into()))
        } else {
            Ok(text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_name_and_model_override() {
        let provider = AnthropicProvider::new("test-key");
        assert_eq!(provider.name(), "anthropic");
        assert!(provider.default_model().contains("claude"));

        let provider = AnthropicProvider::with_model("claude-3-opus-20240229");
        assert_eq!(provider.default_model(), "claude-3-opus-20240229");
    }
}
