//! Edit-mode policy: a pure, total function from (mode, tool danger,
//! session approval) to a gating decision. No side effects, testable
//! without a running loop.

use proto::EditMode;

/// Outcome of gating one tool call against the active edit mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyDecision {
    /// Execute without asking.
    Allowed,
    /// Do not execute; tell the model to plan instead.
    Blocked,
    /// Suspend the run and ask the user.
    NeedsApproval,
}

/// Decides whether a tool call may execute under the given mode.
///
/// Non-dangerous tools are always allowed. In plan mode every dangerous
/// tool is blocked before its executor; in ask mode a dangerous tool needs
/// approval unless the session already granted it; allow mode executes
/// everything.
pub fn decide(mode: EditMode, dangerous: bool, already_approved: bool) -> PolicyDecision {
    if !dangerous {
        return PolicyDecision::Allowed;
    }
    match mode {
        EditMode::Plan => PolicyDecision::Blocked,
        EditMode::Ask => {
            if already_approved {
                PolicyDecision::Allowed
            } else {
                PolicyDecision::NeedsApproval
            }
        }
        EditMode::Allow => PolicyDecision::Allowed,
    }
}
