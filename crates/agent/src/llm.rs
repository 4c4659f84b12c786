//! LLM provider abstraction.
//!
//! The model connection is an opaque streaming service: the runtime hands it
//! the accumulated chat history and consumes text fragments in generation
//! order. Tool calls travel inside the text (fenced blocks, see
//! [`crate::parser`]), so providers only deal in plain text.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use proto::LlmError;

/// Represents a message in a chat history
#[derive(Debug, Clone)]
pub struct ChatMessage {
    /// Semantic role of this message.
    pub role: proto::Role,
    /// Text content. For assistant turns this includes any tool-call blocks.
    pub content: String,
    /// Tool call id when this is a tool result.
    pub tool_call_id: Option<String>,
    /// Tool name when this is a tool result.
    pub tool_name: Option<String>,
}

impl ChatMessage {
    /// Creates a system-role message with the given content.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: proto::Role::System,
            content: content.into(),
            tool_call_id: None,
            tool_name: None,
        }
    }

    /// Creates a user-role message with the given content.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: proto::Role::User,
            content: content.into(),
            tool_call_id: None,
            tool_name: None,
        }
    }

    /// Creates an assistant-role message with the given content.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: proto::Role::Assistant,
            content: content.into(),
            tool_call_id: None,
            tool_name: None,
        }
    }

    /// Creates a tool-result message linking a call id, tool name, and output.
    pub fn tool_result(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            role: proto::Role::Tool,
            content: content.into(),
            tool_call_id: Some(tool_call_id.into()),
            tool_name: Some(tool_name.into()),
        }
    }
}

/// Request to the LLM
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Full chat history including system/user/assistant/tool messages.
    pub messages: Vec<ChatMessage>,
    /// Target model id.
    pub model: String,
}

/// Ordered stream of model output fragments. May fail mid-stream.
pub type TextStream = BoxStream<'static, Result<String, LlmError>>;

/// LLM provider trait
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Opens a streaming completion for the request. Fragments arrive in
    /// generation order; the stream ends when the model is done.
    async fn stream(&self, req: ChatRequest) -> Result<TextStream, LlmError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_set_roles_and_metadata() {
        assert_eq!(ChatMessage::system("s").role, proto::Role::System);
        assert_eq!(ChatMessage::user("u").role, proto::Role::User);
        assert_eq!(ChatMessage::assistant("a").role, proto::Role::Assistant);

        let tool = ChatMessage::tool_result("c1", "bash_exec", "ok");
        assert_eq!(tool.role, proto::Role::Tool);
        assert_eq!(tool.tool_call_id.as_deref(), Some("c1"));
        assert_eq!(tool.tool_name.as_deref(), Some("bash_exec"));
    }
}
