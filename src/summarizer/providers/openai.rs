//! OpenAI provider using `openai-tools`, kept near-verbatim from the
//! teacher's `src/agents/providers/openai.rs`; only the error type and the
//! config shape (no `top_p`/`stop_sequences`, RefNet doesn't need them)
//! changed.

use crate::error::{RefNetError, RefNetResult};
use crate::summarizer::{LlmConfig, LlmProvider, Message, MessageRole};
use async_trait::async_trait;
use openai_tools::chat::request::ChatCompletion;
use openai_tools::common::message::Message as OpenAiMessage;
use openai_tools::common::role::Role as OpenAiRole;

/// API key is read from `OPENAI_API_KEY` by the underlying `openai-tools`
/// crate; the constructor parameter exists only for API symmetry with
/// [`super::AnthropicProvider`].
pub struct OpenAiProvider;

impl OpenAiProvider {
    pub fn new(_api_key: impl Into<String>) -> Self {
        Self
    }

    pub fn from_env() -> RefNetResult<Self> {
        std::env::var("OPENAI_API_KEY")
            .map_err(|_| RefNetError::Config("OPENAI_API_KEY environment variable not set".into()))?;
        Ok(Self)
    }

    fn convert_message(msg: Message) -> OpenAiMessage {
        let role = match msg.role {
            MessageRole::System => OpenAiRole::System,
            MessageRole::User => OpenAiRole::User,
            MessageRole::Assistant => OpenAiRole::Assistant,
        };
        OpenAiMessage::from_string(role, msg.content)
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn default_model(&self) -> &str {
        "gpt-4o"
    }

    async fn complete(&self, messages: Vec<Message>, config: &LlmConfig) -> RefNetResult<String> {
        let model = if config.model.is_empty() {
            self.default_model().to_string()
        } else {
            config.model.clone()
        };

        let openai_messages: Vec<OpenAiMessage> =
            messages.into_iter().map(Self::convert_message).collect();

        let mut chat = ChatCompletion::new();
        chat.model_id(&model)
            .messages(openai_messages)
            .temperature(config.temperature)
            .max_completion_tokens(config.max_tokens as u64);

        let response = chat
            .chat()
            .await
            .map_err(|e| RefNetError::Transient(format!("OpenAI API error: {e}")))?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .and_then(|c| c.text)
            .ok_or_else(|| RefNetError::Permanent("no response from OpenAI".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_name_and_default_model() {
        let provider = OpenAiProvider::new("test-key");
        assert_eq!(provider.name(), "openai");
        assert_eq!(provider.default_model(), "gpt-4o");
    }
}
