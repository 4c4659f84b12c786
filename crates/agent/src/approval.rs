//! Session-scoped approval state and the suspend/resume primitive.
//!
//! A run that hits a needs-approval decision registers a pending request
//! here and awaits a one-shot receiver; `resolve` is called from another
//! task (the control surface) and wakes exactly that run. Resolution is
//! message passing, never shared-memory polling.

use std::collections::HashSet;

use dashmap::DashMap;
use proto::{ApprovalDecision, ApprovalRequest, EditMode, GatewayError, SessionId, ToolCategory};
use tokio::sync::oneshot;
use tracing::{debug, info};

/// Approval key covering every write-category tool at once.
const WRITE_GROUP_KEY: &str = "file_write:*";

/// Resolution delivered to a suspended run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApprovalOutcome {
    /// The user's decision.
    pub decision: ApprovalDecision,
    /// Mode transition the caller should apply to the session, if any.
    /// Set only by allow-all on a write-category tool (ask to allow).
    pub mode_transition: Option<EditMode>,
}

impl ApprovalOutcome {
    fn stop() -> Self {
        Self {
            decision: ApprovalDecision::Stop,
            mode_transition: None,
        }
    }
}

struct PendingApproval {
    session_id: SessionId,
    tool_name: String,
    category: ToolCategory,
    tx: oneshot::Sender<ApprovalOutcome>,
}

/// Tracks per-session approvals and pending approval requests.
///
/// Session entries exist only while a chat is active; [`clear`](Self::clear)
/// drops a session's state atomically and resolves anything still pending
/// with a stop.
pub struct ApprovalManager {
    approved: DashMap<SessionId, HashSet<String>>,
    pending: DashMap<String, PendingApproval>,
}

impl ApprovalManager {
    /// Creates an empty manager.
    pub fn new() -> Self {
        Self {
            approved: DashMap::new(),
            pending: DashMap::new(),
        }
    }

    /// Returns `true` when the session already authorized this tool, either
    /// individually or through the write group.
    pub fn is_approved(&self, session_id: &SessionId, tool_name: &str, category: ToolCategory) -> bool {
        let Some(approved) = self.approved.get(session_id) else {
            return false;
        };
        if approved.contains(tool_name) {
            return true;
        }
        category.is_write() && approved.contains(WRITE_GROUP_KEY)
    }

    /// Creates a suspension point for one tool call. The caller awaits the
    /// returned receiver; resolution arrives from another task.
    pub fn request(
        &self,
        session_id: SessionId,
        call_id: &str,
        tool_name: &str,
        category: ToolCategory,
        arguments: serde_json::Value,
    ) -> (ApprovalRequest, oneshot::Receiver<ApprovalOutcome>) {
        let request = ApprovalRequest::new(
            session_id.clone(),
            call_id,
            tool_name,
            category,
            arguments,
        );
        let (tx, rx) = oneshot::channel();
        debug!(
            request_id = %request.id,
            tool = %tool_name,
            session = %session_id,
            "Approval requested"
        );
        self.pending.insert(
            request.id.clone(),
            PendingApproval {
                session_id,
                tool_name: tool_name.to_string(),
                category,
                tx,
            },
        );
        (request, rx)
    }

    /// Resolves a pending request and wakes the suspended run.
    ///
    /// Allow-all on a write-category tool approves the whole write group
    /// for the session and reports an ask-to-allow mode transition;
    /// allow-all on exec/network approves only that tool.
    pub fn resolve(
        &self,
        request_id: &str,
        decision: ApprovalDecision,
    ) -> Result<ApprovalOutcome, GatewayError> {
        let (_, entry) = self
            .pending
            .remove(request_id)
            .ok_or_else(|| GatewayError::ApprovalNotFound(request_id.to_string()))?;

        let mode_transition = match decision {
            ApprovalDecision::AllowAll if entry.category.is_write() => {
                self.approved
                    .entry(entry.session_id.clone())
                    .or_default()
                    .insert(WRITE_GROUP_KEY.to_string());
                Some(EditMode::Allow)
            }
            ApprovalDecision::AllowAll => {
                self.approved
                    .entry(entry.session_id.clone())
                    .or_default()
                    .insert(entry.tool_name.clone());
                None
            }
            ApprovalDecision::AllowOnce | ApprovalDecision::Stop => None,
        };

        info!(
            request_id = %request_id,
            tool = %entry.tool_name,
            decision = ?decision,
            "Approval resolved"
        );

        let outcome = ApprovalOutcome {
            decision,
            mode_transition,
        };
        // The run may have been cancelled while suspended; a dropped
        // receiver is fine.
        let _ = entry.tx.send(outcome);
        Ok(outcome)
    }

    /// Atomically drops all approvals for a session and resolves its
    /// pending requests with stop. Idempotent.
    pub fn clear(&self, session_id: &SessionId) {
        self.approved.remove(session_id);

        let stale: Vec<String> = self
            .pending
            .iter()
            .filter(|entry| &entry.session_id == session_id)
            .map(|entry| entry.key().clone())
            .collect();
        for request_id in stale {
            if let Some((_, entry)) = self.pending.remove(&request_id) {
                let _ = entry.tx.send(ApprovalOutcome::stop());
            }
        }
        info!(session = %session_id, "Approval state cleared");
    }

    /// Number of requests currently awaiting a decision.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

impl Default for ApprovalManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> SessionId {
        SessionId::from("s1")
    }

    #[test]
    fn nothing_is_approved_initially() {
        let mgr = ApprovalManager::new();
        assert!(!mgr.is_approved(&session(), "write_file", ToolCategory::FileWrite));
        assert!(!mgr.is_approved(&session(), "bash_exec", ToolCategory::Exec));
    }

    #[tokio::test]
    async fn allow_once_wakes_run_but_persists_nothing() {
        let mgr = ApprovalManager::new();
        let (req, rx) = mgr.request(
            session(),
            "c1",
            "write_file",
            ToolCategory::FileWrite,
            serde_json::json!({"path":"a.txt"}),
        );

        let outcome = mgr
            .resolve(&req.id, ApprovalDecision::AllowOnce)
            .expect("resolve should succeed");
        assert_eq!(outcome.decision, ApprovalDecision::AllowOnce);
        assert_eq!(outcome.mode_transition, None);

        let received = rx.await.expect("receiver should get outcome");
        assert_eq!(received, outcome);

        // Next call still needs approval.
        assert!(!mgr.is_approved(&session(), "write_file", ToolCategory::FileWrite));
    }

    #[tokio::test]
    async fn allow_all_on_write_tool_approves_group_and_upgrades_mode() {
        let mgr = ApprovalManager::new();
        let (req, _rx) = mgr.request(
            session(),
            "c1",
            "write_file",
            ToolCategory::FileWrite,
            serde_json::json!({}),
        );

        let outcome = mgr
            .resolve(&req.id, ApprovalDecision::AllowAll)
            .expect("resolve should succeed");
        assert_eq!(outcome.mode_transition, Some(EditMode::Allow));

        // Every write tool is covered, not just the one asked about.
        assert!(mgr.is_approved(&session(), "write_file", ToolCategory::FileWrite));
        assert!(mgr.is_approved(&session(), "patch_file", ToolCategory::FileWrite));
        // Exec/network tools stay gated.
        assert!(!mgr.is_approved(&session(), "bash_exec", ToolCategory::Exec));
        assert!(!mgr.is_approved(&session(), "web_fetch", ToolCategory::Network));
    }

    #[tokio::test]
    async fn allow_all_on_exec_tool_approves_only_that_tool() {
        let mgr = ApprovalManager::new();
        let (req, _rx) = mgr.request(
            session(),
            "c1",
            "bash_exec",
            ToolCategory::Exec,
            serde_json::json!({"command":"ls"}),
        );

        let outcome = mgr
            .resolve(&req.id, ApprovalDecision::AllowAll)
            .expect("resolve should succeed");
        assert_eq!(outcome.mode_transition, None);

        assert!(mgr.is_approved(&session(), "bash_exec", ToolCategory::Exec));
        // Exec approval does not leak to write tools.
        assert!(!mgr.is_approved(&session(), "write_file", ToolCategory::FileWrite));
        // Nor to other exec/network tools.
        assert!(!mgr.is_approved(&session(), "web_fetch", ToolCategory::Network));
    }

    #[tokio::test]
    async fn approvals_are_scoped_per_session() {
        let mgr = ApprovalManager::new();
        let (req, _rx) = mgr.request(
            session(),
            "c1",
            "bash_exec",
            ToolCategory::Exec,
            serde_json::json!({}),
        );
        mgr.resolve(&req.id, ApprovalDecision::AllowAll)
            .expect("resolve");

        assert!(mgr.is_approved(&session(), "bash_exec", ToolCategory::Exec));
        assert!(!mgr.is_approved(&SessionId::from("other"), "bash_exec", ToolCategory::Exec));
    }

    #[test]
    fn resolve_unknown_request_fails_loudly() {
        let mgr = ApprovalManager::new();
        let err = mgr
            .resolve("missing", ApprovalDecision::AllowOnce)
            .expect_err("unknown id should fail");
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn resolve_is_single_shot_per_request() {
        let mgr = ApprovalManager::new();
        let (req, _rx) = mgr.request(
            session(),
            "c1",
            "write_file",
            ToolCategory::FileWrite,
            serde_json::json!({}),
        );
        mgr.resolve(&req.id, ApprovalDecision::Stop).expect("first");
        assert!(mgr.resolve(&req.id, ApprovalDecision::AllowAll).is_err());
    }

    #[tokio::test]
    async fn clear_drops_approvals_and_stops_pending_requests() {
        let mgr = ApprovalManager::new();

        let (granted, _rx) = mgr.request(
            session(),
            "c0",
            "bash_exec",
            ToolCategory::Exec,
            serde_json::json!({}),
        );
        mgr.resolve(&granted.id, ApprovalDecision::AllowAll)
            .expect("resolve");
        assert!(mgr.is_approved(&session(), "bash_exec", ToolCategory::Exec));

        let (_pending, rx) = mgr.request(
            session(),
            "c1",
            "write_file",
            ToolCategory::FileWrite,
            serde_json::json!({}),
        );

        mgr.clear(&session());

        assert!(!mgr.is_approved(&session(), "bash_exec", ToolCategory::Exec));
        let outcome = rx.await.expect("pending request resolves");
        assert_eq!(outcome.decision, ApprovalDecision::Stop);
        assert_eq!(mgr.pending_count(), 0);

        // Idempotent.
        mgr.clear(&session());
        assert!(!mgr.is_approved(&session(), "bash_exec", ToolCategory::Exec));
    }

    #[tokio::test]
    async fn clear_leaves_other_sessions_untouched() {
        let mgr = ApprovalManager::new();
        let other = SessionId::from("other");

        let (req, _rx) = mgr.request(
            other.clone(),
            "c1",
            "bash_exec",
            ToolCategory::Exec,
            serde_json::json!({}),
        );
        mgr.resolve(&req.id, ApprovalDecision::AllowAll)
            .expect("resolve");

        mgr.clear(&session());
        assert!(mgr.is_approved(&other, "bash_exec", ToolCategory::Exec));
    }
}
