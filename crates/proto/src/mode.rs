use serde::{Deserialize, Serialize};

/// Edit mode controlling which tools may execute without per-call approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditMode {
    /// Read-only: every dangerous tool is blocked before its executor runs.
    Plan,
    /// Approval-gated: dangerous tools require a user decision per call
    /// unless already approved for the session.
    Ask,
    /// Unrestricted: everything executes without asking.
    Allow,
}

impl std::fmt::Display for EditMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EditMode::Plan => write!(f, "plan"),
            EditMode::Ask => write!(f, "ask"),
            EditMode::Allow => write!(f, "allow"),
        }
    }
}

impl std::str::FromStr for EditMode {
    type Err = crate::error::ProtoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plan" => Ok(EditMode::Plan),
            "ask" => Ok(EditMode::Ask),
            "allow" => Ok(EditMode::Allow),
            other => Err(crate::error::ProtoError::InvalidMode(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn mode_display_and_parse_round_trip() {
        for mode in [EditMode::Plan, EditMode::Ask, EditMode::Allow] {
            let rendered = mode.to_string();
            let parsed = EditMode::from_str(&rendered).expect("mode should parse");
            assert_eq!(parsed, mode);
        }
    }

    #[test]
    fn mode_parse_invalid_value_returns_error() {
        let err = EditMode::from_str("yolo").expect_err("invalid mode should fail");
        assert!(err.to_string().contains("yolo"));
    }
}
