//! Per-session state and run orchestration.
//!
//! A session is the approval/mode scope: it outlives any single run and
//! carries the conversation history between runs. At most one run is
//! active per session at a time.

use std::sync::Arc;

use agent::{AgentRuntime, ApprovalManager, ApprovalOutcome};
use dashmap::DashMap;
use proto::{
    AgentEvent, AgentMessage, ApprovalDecision, EditMode, GatewayError, Role, SessionId,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

struct SessionState {
    mode: EditMode,
    history: Vec<AgentMessage>,
    /// Present while a run is active.
    cancel: Option<CancellationToken>,
    /// Bumped by `clear_session`; a run teardown only persists its messages
    /// when the session has not been cleared since the run started.
    epoch: u64,
}

/// Owns all sessions and hands each user turn to the runtime.
pub struct SessionManager {
    runtime: Arc<AgentRuntime>,
    approvals: Arc<ApprovalManager>,
    sessions: Arc<DashMap<SessionId, SessionState>>,
    default_mode: EditMode,
}

impl SessionManager {
    /// Creates a manager. New sessions start in `default_mode`.
    pub fn new(
        runtime: Arc<AgentRuntime>,
        approvals: Arc<ApprovalManager>,
        default_mode: EditMode,
    ) -> Self {
        Self {
            runtime,
            approvals,
            sessions: Arc::new(DashMap::new()),
            default_mode,
        }
    }

    fn ensure_session(&self, session_id: &SessionId) {
        self.sessions
            .entry(session_id.clone())
            .or_insert_with(|| SessionState {
                mode: self.default_mode,
                history: Vec::new(),
                cancel: None,
                epoch: 0,
            });
    }

    /// Current edit mode of a session, if it exists.
    pub fn mode(&self, session_id: &SessionId) -> Option<EditMode> {
        self.sessions.get(session_id).map(|s| s.mode)
    }

    /// Conversation history of a session, if it exists.
    pub fn history(&self, session_id: &SessionId) -> Option<Vec<AgentMessage>> {
        self.sessions.get(session_id).map(|s| s.history.clone())
    }

    /// Whether the session has an active run.
    pub fn is_running(&self, session_id: &SessionId) -> bool {
        self.sessions
            .get(session_id)
            .map(|s| s.cancel.is_some())
            .unwrap_or(false)
    }

    /// Sets the session's edit mode. Takes effect on the next run; a run
    /// already in flight keeps the mode it started with (except for the
    /// ask-to-allow upgrade, which the run reports itself).
    pub fn set_mode(&self, session_id: &SessionId, mode: EditMode) {
        self.ensure_session(session_id);
        if let Some(mut state) = self.sessions.get_mut(session_id) {
            info!(session = %session_id, %mode, "Edit mode set");
            state.mode = mode;
        }
    }

    /// Submits a user message and starts a run for it. A `mode` of `Some`
    /// switches the session's edit mode before the run starts.
    ///
    /// Returns the run's event stream. Fails if a run is already active
    /// for the session. History, mode upgrades, and run teardown are
    /// applied by the manager as the run progresses.
    pub fn submit_message(
        self: &Arc<Self>,
        session_id: SessionId,
        text: impl Into<String>,
        mode: Option<EditMode>,
    ) -> Result<mpsc::Receiver<AgentEvent>, GatewayError> {
        self.ensure_session(&session_id);

        let cancel = CancellationToken::new();
        let (history, mode, epoch) = {
            let mut state = self
                .sessions
                .get_mut(&session_id)
                .ok_or_else(|| GatewayError::SessionNotFound(session_id.to_string()))?;
            if state.cancel.is_some() {
                return Err(GatewayError::RunActive(session_id.to_string()));
            }
            if let Some(mode) = mode {
                state.mode = mode;
            }
            state
                .history
                .push(AgentMessage::new(session_id.clone(), Role::User, text));
            state.cancel = Some(cancel.clone());
            (state.history.clone(), state.mode, state.epoch)
        };

        let (out_tx, out_rx) = mpsc::channel(256);
        let manager = self.clone();
        let runtime = self.runtime.clone();
        tokio::spawn(async move {
            let (run_tx, mut run_rx) = mpsc::channel(256);
            let run_session = session_id.clone();
            let run = tokio::spawn(async move {
                runtime
                    .run(run_session, mode, history, run_tx, cancel)
                    .await
            });

            while let Some(event) = run_rx.recv().await {
                if let AgentEvent::ModeChanged { mode } = &event {
                    if let Some(mut state) = manager.sessions.get_mut(&session_id) {
                        state.mode = *mode;
                    }
                }
                // The caller may have stopped listening; the run itself
                // still finishes and updates session state.
                let _ = out_tx.send(event).await;
            }

            match run.await {
                Ok(outcome) => {
                    if let Some(mut state) = manager.sessions.get_mut(&session_id) {
                        // The session may have been cleared while the run was
                        // winding down; its messages are stale then.
                        if state.epoch == epoch {
                            state.history.extend(outcome.messages);
                        }
                        state.cancel = None;
                    }
                    debug!(
                        session = %session_id,
                        reason = ?outcome.result.reason,
                        "Run torn down"
                    );
                }
                Err(e) => {
                    warn!(session = %session_id, error = %e, "Run task panicked");
                    if let Some(mut state) = manager.sessions.get_mut(&session_id) {
                        state.cancel = None;
                    }
                }
            }
        });

        Ok(out_rx)
    }

    /// Delivers a user decision to a suspended run.
    pub fn respond_to_approval(
        &self,
        request_id: &str,
        decision: ApprovalDecision,
    ) -> Result<ApprovalOutcome, GatewayError> {
        self.approvals.resolve(request_id, decision)
    }

    /// Cancels the session's active run, if any. No-op otherwise.
    pub fn cancel_run(&self, session_id: &SessionId) {
        if let Some(state) = self.sessions.get(session_id) {
            if let Some(cancel) = &state.cancel {
                info!(session = %session_id, "Cancelling run");
                cancel.cancel();
            }
        }
    }

    /// Resets the session: cancels any active run, drops its approvals
    /// (resolving pending requests as stop), and wipes the history. The
    /// edit mode survives.
    pub fn clear_session(&self, session_id: &SessionId) {
        self.cancel_run(session_id);
        self.approvals.clear(session_id);
        if let Some(mut state) = self.sessions.get_mut(session_id) {
            state.epoch += 1;
            state.history.clear();
        }
        info!(session = %session_id, "Session cleared");
    }
}

#[cfg(test)]
mod tests {
    use agent::{ChatRequest, LlmProvider, TextStream, ToolRegistry};
    use async_trait::async_trait;
    use proto::{CompletionReason, LlmError, ToolCategory, ToolError};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tools::{ExecutionContext, Tool};

    use super::*;

    struct MockLlm {
        responses: Mutex<VecDeque<String>>,
    }

    impl MockLlm {
        fn new(responses: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.iter().map(|s| s.to_string()).collect()),
            })
        }
    }

    #[async_trait]
    impl LlmProvider for MockLlm {
        async fn stream(&self, _req: ChatRequest) -> Result<TextStream, LlmError> {
            let text = self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| "TASK_COMPLETE".to_string());
            Ok(Box::pin(futures_util::stream::iter(vec![Ok(text)])))
        }
    }

    struct CountingTool {
        category: ToolCategory,
        runs: AtomicUsize,
    }

    #[async_trait]
    impl Tool for CountingTool {
        fn name(&self) -> &str {
            "write"
        }

        fn description(&self) -> &str {
            "counting tool"
        }

        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object", "properties": {}})
        }

        fn category(&self) -> ToolCategory {
            self.category
        }

        async fn execute(
            &self,
            _args: serde_json::Value,
            _ctx: &ExecutionContext,
        ) -> Result<String, ToolError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok("done".to_string())
        }
    }

    fn manager(llm: Arc<dyn LlmProvider>, mode: EditMode) -> (Arc<SessionManager>, Arc<CountingTool>) {
        let tool = Arc::new(CountingTool {
            category: ToolCategory::FileWrite,
            runs: AtomicUsize::new(0),
        });
        let mut registry = ToolRegistry::new();
        registry.register(tool.clone()).expect("register");
        let approvals = Arc::new(ApprovalManager::new());
        let runtime = Arc::new(AgentRuntime::new(
            llm,
            Arc::new(registry),
            approvals.clone(),
            std::env::temp_dir(),
            "test-model",
        ));
        (
            Arc::new(SessionManager::new(runtime, approvals, mode)),
            tool,
        )
    }

    async fn drain(mut rx: mpsc::Receiver<AgentEvent>) -> Vec<AgentEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    fn terminal_reason(events: &[AgentEvent]) -> CompletionReason {
        match events.last() {
            Some(AgentEvent::Complete(result)) => result.reason,
            other => panic!("expected complete terminal, got {other:?}"),
        }
    }

    const WRITE_CALL: &str = "Writing.\n```tool\n{\"name\":\"write\",\"arguments\":{}}\n```";

    #[tokio::test]
    async fn submit_runs_to_completion_and_stores_history() {
        let (mgr, _) = manager(MockLlm::new(&["All set. TASK_COMPLETE"]), EditMode::Ask);
        let session = SessionId::from("s1");

        let rx = mgr
            .submit_message(session.clone(), "hello", None)
            .expect("submit");
        let events = drain(rx).await;
        assert_eq!(terminal_reason(&events), CompletionReason::Done);

        let history = mgr.history(&session).expect("session exists");
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[0].content, "hello");
        assert!(
            history
                .iter()
                .any(|m| m.role == Role::Assistant && m.content.contains("All set"))
        );
        assert!(!mgr.is_running(&session));
    }

    #[tokio::test]
    async fn history_accumulates_across_runs() {
        let (mgr, _) = manager(
            MockLlm::new(&["First answer. TASK_COMPLETE", "Second answer. TASK_COMPLETE"]),
            EditMode::Ask,
        );
        let session = SessionId::from("s1");

        drain(mgr.submit_message(session.clone(), "one", None).expect("submit")).await;
        drain(mgr.submit_message(session.clone(), "two", None).expect("submit")).await;

        let history = mgr.history(&session).expect("session exists");
        let users: Vec<&str> = history
            .iter()
            .filter(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(users, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn concurrent_submit_is_rejected() {
        // A run that suspends on approval keeps the session busy.
        let (mgr, _) = manager(MockLlm::new(&[WRITE_CALL]), EditMode::Ask);
        let session = SessionId::from("s1");

        let mut rx = mgr
            .submit_message(session.clone(), "first", None)
            .expect("submit");
        // Wait until the run is suspended on the approval.
        loop {
            match rx.recv().await {
                Some(AgentEvent::ApprovalRequired(_)) => break,
                Some(_) => continue,
                None => panic!("run ended before approval"),
            }
        }

        let err = mgr
            .submit_message(session.clone(), "second", None)
            .expect_err("second submit while running");
        assert!(matches!(err, GatewayError::RunActive(_)));

        mgr.cancel_run(&session);
        drain(rx).await;
    }

    #[tokio::test]
    async fn approval_flow_through_the_manager() {
        let (mgr, tool) = manager(MockLlm::new(&[WRITE_CALL, "TASK_COMPLETE"]), EditMode::Ask);
        let session = SessionId::from("s1");

        let mut rx = mgr.submit_message(session.clone(), "go", None).expect("submit");
        let request = loop {
            match rx.recv().await {
                Some(AgentEvent::ApprovalRequired(req)) => break req,
                Some(_) => continue,
                None => panic!("run ended before approval"),
            }
        };

        mgr.respond_to_approval(&request.id, ApprovalDecision::AllowOnce)
            .expect("respond");
        let events = drain(rx).await;

        assert_eq!(terminal_reason(&events), CompletionReason::Done);
        assert_eq!(tool.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn allow_all_write_upgrade_sticks_on_the_session() {
        let (mgr, _) = manager(MockLlm::new(&[WRITE_CALL, "TASK_COMPLETE"]), EditMode::Ask);
        let session = SessionId::from("s1");

        let mut rx = mgr.submit_message(session.clone(), "go", None).expect("submit");
        let request = loop {
            match rx.recv().await {
                Some(AgentEvent::ApprovalRequired(req)) => break req,
                Some(_) => continue,
                None => panic!("run ended before approval"),
            }
        };

        mgr.respond_to_approval(&request.id, ApprovalDecision::AllowAll)
            .expect("respond");
        drain(rx).await;

        // The ask-to-allow upgrade outlives the run.
        assert_eq!(mgr.mode(&session), Some(EditMode::Allow));
    }

    #[tokio::test]
    async fn respond_to_unknown_approval_fails() {
        let (mgr, _) = manager(MockLlm::new(&[]), EditMode::Ask);
        let err = mgr
            .respond_to_approval("nope", ApprovalDecision::AllowOnce)
            .expect_err("unknown request");
        assert!(matches!(err, GatewayError::ApprovalNotFound(_)));
    }

    #[tokio::test]
    async fn cancel_aborts_an_active_run() {
        let (mgr, tool) = manager(MockLlm::new(&[WRITE_CALL]), EditMode::Ask);
        let session = SessionId::from("s1");

        let mut rx = mgr.submit_message(session.clone(), "go", None).expect("submit");
        loop {
            match rx.recv().await {
                Some(AgentEvent::ApprovalRequired(_)) => break,
                Some(_) => continue,
                None => panic!("run ended before approval"),
            }
        }

        mgr.cancel_run(&session);
        let events = drain(rx).await;

        assert_eq!(terminal_reason(&events), CompletionReason::Aborted);
        assert_eq!(tool.runs.load(Ordering::SeqCst), 0);
        assert!(!mgr.is_running(&session));
        // Session accepts a new message afterwards.
        let rx = mgr.submit_message(session.clone(), "again", None).expect("resubmit");
        drain(rx).await;
    }

    #[tokio::test]
    async fn clear_during_suspended_run_leaves_history_empty_after_teardown() {
        let (mgr, tool) = manager(MockLlm::new(&[WRITE_CALL]), EditMode::Ask);
        let session = SessionId::from("s1");

        let mut rx = mgr.submit_message(session.clone(), "go", None).expect("submit");
        loop {
            match rx.recv().await {
                Some(AgentEvent::ApprovalRequired(_)) => break,
                Some(_) => continue,
                None => panic!("run ended before approval"),
            }
        }

        mgr.clear_session(&session);
        assert!(mgr.history(&session).expect("exists").is_empty());

        // The aborted run's teardown must not resurrect its messages.
        drain(rx).await;
        assert!(mgr.history(&session).expect("exists").is_empty());
        assert!(!mgr.is_running(&session));
        assert_eq!(tool.runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn clear_session_wipes_history_and_keeps_mode() {
        let (mgr, _) = manager(MockLlm::new(&["Done. TASK_COMPLETE"]), EditMode::Plan);
        let session = SessionId::from("s1");

        drain(mgr.submit_message(session.clone(), "hi", None).expect("submit")).await;
        assert!(!mgr.history(&session).expect("exists").is_empty());

        mgr.clear_session(&session);
        assert!(mgr.history(&session).expect("exists").is_empty());
        assert_eq!(mgr.mode(&session), Some(EditMode::Plan));
    }

    #[tokio::test]
    async fn set_mode_applies_to_the_next_run() {
        let (mgr, tool) = manager(MockLlm::new(&[WRITE_CALL, "TASK_COMPLETE"]), EditMode::Plan);
        let session = SessionId::from("s1");

        mgr.set_mode(&session, EditMode::Allow);
        let rx = mgr.submit_message(session.clone(), "go", None).expect("submit");
        drain(rx).await;

        // Allow mode: the write ran without any approval.
        assert_eq!(tool.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn sessions_are_independent() {
        let (mgr, _) = manager(
            MockLlm::new(&["A. TASK_COMPLETE", "B. TASK_COMPLETE"]),
            EditMode::Ask,
        );
        let a = SessionId::from("a");
        let b = SessionId::from("b");

        drain(mgr.submit_message(a.clone(), "for a", None).expect("submit")).await;
        drain(mgr.submit_message(b.clone(), "for b", None).expect("submit")).await;

        mgr.set_mode(&a, EditMode::Allow);
        assert_eq!(mgr.mode(&a), Some(EditMode::Allow));
        assert_eq!(mgr.mode(&b), Some(EditMode::Ask));

        let history_b = mgr.history(&b).expect("exists");
        assert!(history_b.iter().all(|m| m.content != "for a"));
    }
}
