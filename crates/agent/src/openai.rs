//! OpenAI-compatible streaming provider (works with OpenAI, together.ai,
//! local Ollama, and other compatible endpoints).

use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
};
use async_trait::async_trait;
use futures_util::StreamExt;
use proto::LlmError;
use tracing::debug;

use crate::llm::{ChatMessage, ChatRequest, LlmProvider, TextStream};

/// OpenAI-compatible provider speaking the streaming ChatCompletions API.
pub struct OpenAiProvider {
    client: Client<OpenAIConfig>,
}

impl OpenAiProvider {
    /// Creates a provider using the default API base URL.
    pub fn new(api_key: impl Into<String>) -> Self {
        let config = OpenAIConfig::new().with_api_key(api_key);
        let client = Client::with_config(config);
        Self { client }
    }

    /// Creates a provider with a custom API base URL.
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        let config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(base_url);
        let client = Client::with_config(config);
        Self { client }
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn stream(&self, req: ChatRequest) -> Result<TextStream, LlmError> {
        let messages: Vec<ChatCompletionRequestMessage> = req
            .messages
            .iter()
            .map(convert_message)
            .collect::<Result<_, _>>()?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&req.model)
            .messages(messages)
            .stream(true)
            .build()
            .map_err(|e| LlmError::Serialization(e.to_string()))?;

        debug!(
            model = %req.model,
            messages = %req.messages.len(),
            "Opening completion stream"
        );

        let stream = self
            .client
            .chat()
            .create_stream(request)
            .await
            .map_err(|e| LlmError::Api(e.to_string()))?;

        let fragments = stream.filter_map(|item| async move {
            match item {
                Ok(response) => response
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|choice| choice.delta.content)
                    .filter(|content| !content.is_empty())
                    .map(Ok),
                Err(e) => Some(Err(LlmError::Api(e.to_string()))),
            }
        });

        Ok(Box::pin(fragments))
    }
}

/// Converts an internal chat message into OpenAI request format.
///
/// Tool results are rendered as labelled user messages: the tool-call
/// protocol lives in the text itself, so the API never sees structured
/// tool-call ids it could not match up.
fn convert_message(m: &ChatMessage) -> Result<ChatCompletionRequestMessage, LlmError> {
    match m.role {
        proto::Role::System => Ok(ChatCompletionRequestMessage::System(
            ChatCompletionRequestSystemMessageArgs::default()
                .content(m.content.clone())
                .build()
                .map_err(|e| LlmError::Serialization(e.to_string()))?,
        )),
        proto::Role::User => Ok(ChatCompletionRequestMessage::User(
            ChatCompletionRequestUserMessageArgs::default()
                .content(m.content.clone())
                .build()
                .map_err(|e| LlmError::Serialization(e.to_string()))?,
        )),
        proto::Role::Assistant => Ok(ChatCompletionRequestMessage::Assistant(
            ChatCompletionRequestAssistantMessageArgs::default()
                .content(m.content.clone())
                .build()
                .map_err(|e| LlmError::Serialization(e.to_string()))?,
        )),
        proto::Role::Tool => {
            let label = m.tool_name.as_deref().unwrap_or("unknown");
            Ok(ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessageArgs::default()
                    .content(format!("Result of tool '{label}':\n{}", m.content))
                    .build()
                    .map_err(|e| LlmError::Serialization(e.to_string()))?,
            ))
        }
    }
}
