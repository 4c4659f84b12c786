use thiserror::Error;

/// Top-level error type
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration loading/validation error.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Gateway/session control-surface error.
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// LLM provider error.
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    /// Tool registration/dispatch error.
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    /// Internal protocol type error.
    #[error("Proto error: {0}")]
    Proto(#[from] ProtoError),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required field was not provided.
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// A field has an invalid value and reason.
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    /// Filesystem read error.
    #[error("IO error reading config: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse error.
    #[error("TOML parse error: {0}")]
    Toml(String),
}

/// Gateway / control-surface errors
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Session lookup failure.
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// A run is already active for the session.
    #[error("Run already active for session: {0}")]
    RunActive(String),

    /// No pending approval request with the given id.
    #[error("Approval request not found: {0}")]
    ApprovalNotFound(String),

    /// The event channel to the caller has been closed.
    #[error("Event channel closed")]
    ChannelClosed,
}

/// LLM provider errors
#[derive(Debug, Error)]
pub enum LlmError {
    /// Remote API failure, including mid-stream disconnects.
    #[error("{0}")]
    Api(String),

    /// Provider throttled the request.
    #[error("Rate limit exceeded")]
    RateLimit,

    /// Provider response schema/content was invalid.
    #[error("Invalid response from LLM: {0}")]
    InvalidResponse(String),

    /// No output fragment arrived within the stall timeout.
    #[error("Stream stalled: no fragment for {0}s")]
    Stalled(u64),

    /// Serialization/deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Tool registration and execution errors
#[derive(Debug, Error)]
pub enum ToolError {
    /// Requested tool is not in the registry.
    #[error("Unknown tool: {0}")]
    Unknown(String),

    /// A tool with this name is already registered.
    #[error("Duplicate tool: {0}")]
    Duplicate(String),

    /// Tool process or operation failed.
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    /// Tool exceeded allowed execution time.
    #[error("Timeout after {0}s")]
    Timeout(u64),

    /// Tool call arguments are invalid.
    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),

    /// Filesystem/process IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Internal proto errors
#[derive(Debug, Error)]
pub enum ProtoError {
    /// Invalid role string value.
    #[error("Invalid role: {0}")]
    InvalidRole(String),

    /// Invalid edit-mode string value.
    #[error("Invalid edit mode: {0}")]
    InvalidMode(String),

    /// Invalid approval decision string value.
    #[error("Invalid approval decision: {0}")]
    InvalidDecision(String),

    /// Generic serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_config_error_variant() {
        let err = ConfigError::MissingField("llm.api_key".to_string());
        assert!(err.to_string().contains("Missing required field"));
    }

    #[test]
    fn wraps_gateway_error_into_top_level_error() {
        let err: Error = GatewayError::SessionNotFound("s1".to_string()).into();
        assert!(err.to_string().contains("Gateway error"));
    }

    #[test]
    fn wraps_llm_error_into_top_level_error() {
        let err: Error = LlmError::Stalled(60).into();
        assert!(err.to_string().contains("Stream stalled"));
    }

    #[test]
    fn wraps_tool_and_proto_errors() {
        let tool_err: Error = ToolError::Unknown("frobnicate".to_string()).into();
        assert!(tool_err.to_string().contains("Tool error"));

        let proto_err: Error = ProtoError::InvalidMode("yolo".to_string()).into();
        assert!(proto_err.to_string().contains("Proto error"));
    }

    #[test]
    fn duplicate_tool_error_names_the_tool() {
        let err = ToolError::Duplicate("write_file".to_string());
        assert!(err.to_string().contains("write_file"));
    }
}
