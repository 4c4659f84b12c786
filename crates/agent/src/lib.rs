//! Agent execution core: iteration loop, edit-mode policy, approval
//! manager, tool registry, and LLM adapter interfaces.

pub mod approval;
pub mod llm;
pub mod openai;
pub mod parser;
pub mod policy;
pub mod runtime;
pub mod tool_registry;

/// Session-scoped approval state and suspend/resume primitive.
pub use approval::{ApprovalManager, ApprovalOutcome};
/// Chat request/response models and the streaming provider interface.
pub use llm::{ChatMessage, ChatRequest, LlmProvider, TextStream};
/// OpenAI-compatible streaming provider.
pub use openai::OpenAiProvider;
/// Pure edit-mode policy function.
pub use policy::{PolicyDecision, decide};
/// Main iteration engine.
pub use runtime::{AgentRuntime, RunLimits, RunOutcome};
/// Name-indexed tool registry and execution boundary.
pub use tool_registry::ToolRegistry;
