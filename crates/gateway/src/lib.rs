//! Session gateway: the control surface callers use to drive agent runs.
//!
//! Owns per-session state (edit mode, conversation history, the active
//! run's cancellation token) and routes approvals and mode changes to the
//! right run.

pub mod session;

pub use session::SessionManager;
