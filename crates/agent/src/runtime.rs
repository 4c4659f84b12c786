//! The agent iteration loop.
//!
//! One run drives the model/tool cycle to completion: stream a response,
//! parse tool calls out of it, gate each call through the edit-mode policy,
//! execute or suspend, feed results back, repeat. Strictly sequential: a
//! call later in a response is not even policy-checked until every earlier
//! call has fully resolved, so an allow-all decision or mode upgrade made
//! mid-batch applies to the calls after it.
//!
//! Exactly one terminal event (`Complete` or `Error`) is emitted per run.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use proto::{
    AgentEvent, AgentMessage, AgentRunResult, AgentStep, ApprovalDecision, CompletionReason,
    EditMode, Role, SessionId, ToolCall, ToolDefinition, ToolResult,
};
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::approval::{ApprovalManager, ApprovalOutcome};
use crate::llm::{ChatMessage, ChatRequest, LlmProvider};
use crate::parser;
use crate::policy::{self, PolicyDecision};
use crate::tool_registry::ToolRegistry;

/// Tool output beyond this many characters is elided in the chat context
/// sent to the model. Stored messages keep the full output.
const MAX_TOOL_RESULT_CHARS: usize = 16_000;

/// Resource guards for one run.
#[derive(Debug, Clone, Copy)]
pub struct RunLimits {
    /// Iteration cap per run.
    pub max_iterations: usize,
    /// Wall-clock cap per run, in seconds.
    pub max_run_secs: u64,
    /// Max silence between stream fragments before the run fails.
    pub stall_secs: u64,
    /// Max wait for an approval decision before it auto-resolves to stop.
    pub approval_secs: u64,
}

impl Default for RunLimits {
    fn default() -> Self {
        Self {
            max_iterations: 16,
            max_run_secs: 600,
            stall_secs: 60,
            approval_secs: 300,
        }
    }
}

/// Everything a finished run hands back to its caller.
#[derive(Debug)]
pub struct RunOutcome {
    /// Terminal summary, matching the terminal event.
    pub result: AgentRunResult,
    /// Messages produced during the run (assistant turns and tool results,
    /// with untruncated outputs), in order.
    pub messages: Vec<AgentMessage>,
}

/// Drives agent runs against a model provider and a tool registry.
///
/// The runtime is stateless across runs; session state (mode, history,
/// approvals) lives with the caller and the [`ApprovalManager`].
pub struct AgentRuntime {
    llm: Arc<dyn LlmProvider>,
    tools: Arc<ToolRegistry>,
    approvals: Arc<ApprovalManager>,
    workspace_root: PathBuf,
    model: String,
    limits: RunLimits,
}

enum StreamFailure {
    Cancelled { partial: String },
    Failed { partial: String, message: String },
}

enum Dispatch {
    Result(ToolResult),
    Aborted,
}

impl AgentRuntime {
    /// Creates a runtime with default limits.
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        tools: Arc<ToolRegistry>,
        approvals: Arc<ApprovalManager>,
        workspace_root: PathBuf,
        model: impl Into<String>,
    ) -> Self {
        Self {
            llm,
            tools,
            approvals,
            workspace_root,
            model: model.into(),
            limits: RunLimits::default(),
        }
    }

    /// Replaces the default resource guards.
    pub fn with_limits(mut self, limits: RunLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Runs the loop for one user turn.
    ///
    /// `history` is the full prior conversation including the triggering
    /// user message. `mode` is the session's edit mode at run start; an
    /// allow-all write approval upgrades it mid-run and the caller learns
    /// of that via [`AgentEvent::ModeChanged`].
    pub async fn run(
        &self,
        session_id: SessionId,
        mode: EditMode,
        history: Vec<AgentMessage>,
        events: mpsc::Sender<AgentEvent>,
        cancel: CancellationToken,
    ) -> RunOutcome {
        let mut mode = mode;
        let mut chat = vec![ChatMessage::system(build_system_prompt(
            &self.tools.definitions(),
        ))];
        chat.extend(history.iter().map(to_chat_message));

        let mut new_messages: Vec<AgentMessage> = Vec::new();
        let mut iterations = 0usize;
        let mut last_response = String::new();
        let deadline = Instant::now() + Duration::from_secs(self.limits.max_run_secs);

        info!(session = %session_id, %mode, "Run started");

        let result = loop {
            if cancel.is_cancelled() {
                break self.finish(iterations, last_response, CompletionReason::Aborted);
            }
            if iterations >= self.limits.max_iterations {
                warn!(session = %session_id, iterations, "Iteration cap reached");
                break self.finish(iterations, last_response, CompletionReason::MaxIterations);
            }
            if Instant::now() >= deadline {
                warn!(session = %session_id, "Wall-clock cap reached");
                break self.finish(iterations, last_response, CompletionReason::TimeLimit);
            }

            let text = match self.stream_response(&chat, &events, &cancel).await {
                Ok(text) => text,
                Err(StreamFailure::Cancelled { partial }) => {
                    break self.finish(iterations, partial, CompletionReason::Aborted);
                }
                Err(StreamFailure::Failed { partial, message }) => {
                    let _ = events.send(AgentEvent::Error { message }).await;
                    let result = AgentRunResult {
                        success: false,
                        iterations,
                        final_response: partial,
                        reason: CompletionReason::Error,
                    };
                    return RunOutcome {
                        result,
                        messages: new_messages,
                    };
                }
            };

            let parsed = parser::parse_response(&text);
            last_response = if parsed.thought.is_empty() {
                text
            } else {
                parsed.thought.clone()
            };

            let assistant = AgentMessage::assistant_turn(
                session_id.clone(),
                parsed.thought.clone(),
                parsed.tool_calls.clone(),
            );
            chat.push(to_chat_message(&assistant));
            new_messages.push(assistant);

            let mut results = Vec::with_capacity(parsed.tool_calls.len());
            let mut aborted = false;
            for call in &parsed.tool_calls {
                match self
                    .dispatch_call(&session_id, &mut mode, call, &events, &cancel)
                    .await
                {
                    Dispatch::Result(result) => {
                        chat.push(ChatMessage::tool_result(
                            &result.call_id,
                            &result.tool_name,
                            truncate_for_model(&result.output),
                        ));
                        new_messages.push(AgentMessage::tool_result(
                            session_id.clone(),
                            &result.call_id,
                            &result.tool_name,
                            &result.output,
                        ));
                        results.push(result);
                    }
                    Dispatch::Aborted => {
                        aborted = true;
                        break;
                    }
                }
            }
            iterations += 1;

            if aborted {
                break self.finish(iterations, last_response, CompletionReason::Aborted);
            }

            let done = parsed.completed || parsed.tool_calls.is_empty();
            let _ = events
                .send(AgentEvent::Step(AgentStep {
                    iteration: iterations - 1,
                    thought: parsed.thought,
                    tool_calls: parsed.tool_calls,
                    tool_results: results,
                    done,
                }))
                .await;

            if done {
                break self.finish(iterations, last_response, CompletionReason::Done);
            }
        };

        info!(
            session = %session_id,
            iterations = result.iterations,
            reason = ?result.reason,
            "Run finished"
        );
        let _ = events.send(AgentEvent::Complete(result.clone())).await;
        RunOutcome {
            result,
            messages: new_messages,
        }
    }

    fn finish(
        &self,
        iterations: usize,
        final_response: String,
        reason: CompletionReason,
    ) -> AgentRunResult {
        AgentRunResult {
            success: reason == CompletionReason::Done,
            iterations,
            final_response,
            reason,
        }
    }

    /// Streams one model response to completion, forwarding fragments as
    /// text-chunk events and accumulating the full text.
    async fn stream_response(
        &self,
        chat: &[ChatMessage],
        events: &mpsc::Sender<AgentEvent>,
        cancel: &CancellationToken,
    ) -> Result<String, StreamFailure> {
        let request = ChatRequest {
            messages: chat.to_vec(),
            model: self.model.clone(),
        };
        let mut stream = match self.llm.stream(request).await {
            Ok(stream) => stream,
            Err(e) => {
                return Err(StreamFailure::Failed {
                    partial: String::new(),
                    message: e.to_string(),
                });
            }
        };

        let stall = Duration::from_secs(self.limits.stall_secs);
        let mut text = String::new();
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(StreamFailure::Cancelled { partial: text });
                }
                item = timeout(stall, stream.next()) => item,
            };
            match next {
                Err(_) => {
                    return Err(StreamFailure::Failed {
                        partial: text,
                        message: proto::LlmError::Stalled(self.limits.stall_secs).to_string(),
                    });
                }
                Ok(None) => break,
                Ok(Some(Ok(fragment))) => {
                    let _ = events
                        .send(AgentEvent::TextChunk {
                            text: fragment.clone(),
                        })
                        .await;
                    text.push_str(&fragment);
                }
                Ok(Some(Err(e))) => {
                    return Err(StreamFailure::Failed {
                        partial: text,
                        message: e.to_string(),
                    });
                }
            }
        }
        Ok(text)
    }

    /// Resolves one tool call to a result: policy check, optional approval
    /// suspension, then execution. Later calls in the batch wait on this.
    async fn dispatch_call(
        &self,
        session_id: &SessionId,
        mode: &mut EditMode,
        call: &ToolCall,
        events: &mpsc::Sender<AgentEvent>,
        cancel: &CancellationToken,
    ) -> Dispatch {
        let Some(tool) = self.tools.get(&call.name) else {
            return Dispatch::Result(ToolResult::error(
                &call.id,
                &call.name,
                format!("Unknown tool '{}'", call.name),
            ));
        };
        let category = tool.category();
        let approved = self.approvals.is_approved(session_id, &call.name, category);

        match policy::decide(*mode, tool.dangerous(), approved) {
            PolicyDecision::Blocked => {
                debug!(tool = %call.name, "Call blocked by plan mode");
                Dispatch::Result(ToolResult::blocked(call))
            }
            PolicyDecision::Allowed => Dispatch::Result(self.execute(session_id, *mode, call).await),
            PolicyDecision::NeedsApproval => {
                let (request, rx) = self.approvals.request(
                    session_id.clone(),
                    &call.id,
                    &call.name,
                    category,
                    call.arguments.clone(),
                );
                let _ = events
                    .send(AgentEvent::ApprovalRequired(request.clone()))
                    .await;

                let wait = Duration::from_secs(self.limits.approval_secs);
                let outcome = tokio::select! {
                    _ = cancel.cancelled() => {
                        let _ = self.approvals.resolve(&request.id, ApprovalDecision::Stop);
                        return Dispatch::Aborted;
                    }
                    res = timeout(wait, rx) => match res {
                        Ok(Ok(outcome)) => outcome,
                        // Sender dropped without a decision; treat as stop.
                        Ok(Err(_)) => ApprovalOutcome {
                            decision: ApprovalDecision::Stop,
                            mode_transition: None,
                        },
                        Err(_) => {
                            warn!(tool = %call.name, "Approval timed out, auto-stopping");
                            // A decision may have raced the timeout.
                            self.approvals
                                .resolve(&request.id, ApprovalDecision::Stop)
                                .unwrap_or(ApprovalOutcome {
                                    decision: ApprovalDecision::Stop,
                                    mode_transition: None,
                                })
                        }
                    }
                };

                if let Some(next) = outcome.mode_transition {
                    if next != *mode {
                        *mode = next;
                        let _ = events.send(AgentEvent::ModeChanged { mode: next }).await;
                    }
                }

                match outcome.decision {
                    ApprovalDecision::AllowOnce | ApprovalDecision::AllowAll => {
                        Dispatch::Result(self.execute(session_id, *mode, call).await)
                    }
                    ApprovalDecision::Stop => Dispatch::Result(ToolResult::rejected(call)),
                }
            }
        }
    }

    async fn execute(&self, session_id: &SessionId, mode: EditMode, call: &ToolCall) -> ToolResult {
        let ctx = tools::ExecutionContext {
            session_id: session_id.clone(),
            workspace_root: self.workspace_root.clone(),
            mode,
        };
        match self.tools.execute(call, &ctx).await {
            Ok(result) => result,
            Err(e) => ToolResult::error(&call.id, &call.name, e.to_string()),
        }
    }
}

/// Renders a stored message back into model-facing chat form. Assistant
/// turns re-render their tool calls as fenced blocks so a resumed history
/// reads exactly like the original generation.
fn to_chat_message(msg: &AgentMessage) -> ChatMessage {
    match msg.role {
        Role::System => ChatMessage::system(&msg.content),
        Role::User => ChatMessage::user(&msg.content),
        Role::Tool => ChatMessage::tool_result(
            msg.tool_call_id.as_deref().unwrap_or_default(),
            msg.tool_name.as_deref().unwrap_or("unknown"),
            truncate_for_model(&msg.content),
        ),
        Role::Assistant => {
            let mut content = msg.content.clone();
            if let Some(calls) = &msg.tool_calls {
                for call in calls {
                    let body = serde_json::json!({
                        "name": call.name,
                        "arguments": call.arguments,
                    });
                    content.push_str(&format!("\n```tool\n{body}\n```"));
                }
            }
            ChatMessage::assistant(content)
        }
    }
}

fn truncate_for_model(s: &str) -> String {
    if s.chars().count() <= MAX_TOOL_RESULT_CHARS {
        return s.to_string();
    }
    let kept: String = s.chars().take(MAX_TOOL_RESULT_CHARS).collect();
    format!("{kept}\n... [output truncated]")
}

/// Builds the system prompt: role, tool catalogue, the fenced tool-call
/// protocol, and the completion markers.
fn build_system_prompt(definitions: &[ToolDefinition]) -> String {
    let mut prompt = String::from(
        "You are a coding agent working inside a user's workspace. You \
         accomplish tasks by thinking in plain text and invoking tools.\n\n\
         To invoke a tool, emit a fenced block:\n\
         ```tool\n\
         {\"name\": \"<tool>\", \"arguments\": { ... }}\n\
         ```\n\
         You may emit several blocks in one response; they run strictly in \
         order. After each response containing tool calls you receive one \
         result per call, in the same order.\n\n\
         Some tools change files, run commands, or reach the network. \
         Depending on the session's edit mode these may be blocked (describe \
         the change as a plan instead) or may require the user's approval \
         before running.\n\n\
         When the task is fully finished, write TASK_COMPLETE (or ALL_DONE) \
         in your response. A response with no tool calls also ends the \
         task.\n\nAvailable tools:\n",
    );
    for def in definitions {
        prompt.push_str(&format!(
            "\n## {} [{}]\n{}\nArguments schema: {}\n",
            def.name, def.category, def.description, def.parameters
        ));
    }
    prompt
}
