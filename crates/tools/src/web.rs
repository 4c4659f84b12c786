//! Web fetch tool.

use std::time::Duration;

use async_trait::async_trait;
use proto::{ToolCategory, ToolError};
use serde::Deserialize;
use tracing::debug;

use crate::{ExecutionContext, Tool};

const FETCH_TIMEOUT_SECS: u64 = 30;
const MAX_BODY_CHARS: usize = 30_000;

#[derive(Debug, Deserialize)]
struct FetchArgs {
    url: String,
}

/// Tool that fetches a URL over HTTP(S) and returns the response body.
pub struct WebFetchTool {
    client: reqwest::Client,
}

impl WebFetchTool {
    /// Creates a fetch tool with a shared HTTP client.
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

impl Default for WebFetchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for WebFetchTool {
    fn name(&self) -> &str {
        "web_fetch"
    }

    fn description(&self) -> &str {
        "Fetch a URL with an HTTP GET request and return status plus body text. \
         Body is limited to 30,000 characters."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "http:// or https:// URL to fetch"
                }
            },
            "required": ["url"]
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Network
    }

    async fn execute(
        &self,
        args: serde_json::Value,
        _ctx: &ExecutionContext,
    ) -> Result<String, ToolError> {
        let args: FetchArgs =
            serde_json::from_value(args).map_err(|e| ToolError::InvalidArgs(e.to_string()))?;

        if !args.url.starts_with("http://") && !args.url.starts_with("https://") {
            return Err(ToolError::InvalidArgs(format!(
                "unsupported URL scheme: {}",
                args.url
            )));
        }

        debug!("Fetching URL: {}", args.url);
        let response = self
            .client
            .get(&args.url)
            .send()
            .await
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;

        let body = if body.chars().count() > MAX_BODY_CHARS {
            let truncated: String = body.chars().take(MAX_BODY_CHARS).collect();
            format!("{truncated}\n[... body truncated at {MAX_BODY_CHARS} chars]")
        } else {
            body
        };

        Ok(format!("status: {}\n\n{body}", status.as_u16()))
    }
}

#[cfg(test)]
mod tests {
    use proto::{EditMode, SessionId};

    use super::*;

    fn context() -> ExecutionContext {
        ExecutionContext::new(SessionId::from("s1"), "/tmp", EditMode::Allow)
    }

    #[tokio::test]
    async fn execute_rejects_non_http_schemes() {
        let err = WebFetchTool::new()
            .execute(serde_json::json!({"url":"file:///etc/passwd"}), &context())
            .await
            .expect_err("file scheme must be rejected");
        assert!(matches!(err, ToolError::InvalidArgs(_)));
    }

    #[tokio::test]
    async fn execute_rejects_missing_url() {
        let err = WebFetchTool::new()
            .execute(serde_json::json!({}), &context())
            .await
            .expect_err("missing url must be rejected");
        assert!(matches!(err, ToolError::InvalidArgs(_)));
    }

    #[test]
    fn fetch_tool_is_network_category_and_dangerous() {
        let tool = WebFetchTool::new();
        assert_eq!(tool.category(), ToolCategory::Network);
        assert!(tool.dangerous());
        assert_eq!(tool.name(), "web_fetch");
    }
}
