use async_trait::async_trait;
use relay_mcp::{
    CallToolParams, CallToolResult, ListToolsParams, ListToolsResult, McpHandler, Tool,
};
use serde_json::Value;
use tracing::{Instrument as _, info};

use crate::agent::AgentClient;
use crate::memory::MemoryStore;

/// Default timeout (seconds) forwarded to the agent for `ask`.
const DEFAULT_ASK_TIMEOUT_SECS: u64 = 120;

/// Entry cap forwarded to the agent for `sessions_status`.
const SESSIONS_LIMIT: u32 = 10;

/// The gateway's static tool surface: `ask`, `memory_search`,
/// `sessions_status`.
///
/// Every tool failure, validation or execution, is funneled into an
/// error-flagged text block; callers always see outer JSON-RPC success.
pub struct ToolRegistry {
    agent: AgentClient,
    memory: MemoryStore,
}

impl ToolRegistry {
    pub fn new(agent: AgentClient, memory: MemoryStore) -> Self {
        Self { agent, memory }
    }

    pub fn descriptors() -> Vec<Tool> {
        vec![tool_ask(), tool_memory_search(), tool_sessions_status()]
    }

    async fn call(&self, name: &str, args: &Value) -> CallToolResult {
        let outcome = match name {
            "ask" => self.ask(args).await,
            "memory_search" => self.memory_search(args).await,
            "sessions_status" => self.sessions_status().await,
            other => return CallToolResult::error(format!("Unknown tool: {other}")),
        };

        match outcome {
            Ok(text) => CallToolResult::text(text),
            Err(e) => CallToolResult::error(e.to_string()),
        }
    }

    async fn ask(&self, args: &Value) -> anyhow::Result<String> {
        let message = args
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        if message.is_empty() {
            anyhow::bail!("ask requires a non-empty `message` string");
        }

        let timeout_secs = args
            .get("timeout")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_ASK_TIMEOUT_SECS);

        Ok(self.agent.send_message(message, timeout_secs).await?)
    }

    async fn memory_search(&self, args: &Value) -> anyhow::Result<String> {
        let query = args
            .get("query")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        if query.is_empty() {
            anyhow::bail!("memory_search requires a non-empty `query` string");
        }

        self.memory.search(query).await
    }

    async fn sessions_status(&self) -> anyhow::Result<String> {
        Ok(self.agent.list_sessions(SESSIONS_LIMIT).await?)
    }
}

#[async_trait]
impl McpHandler for ToolRegistry {
    async fn list_tools(&self, _params: ListToolsParams) -> anyhow::Result<ListToolsResult> {
        Ok(ListToolsResult {
            tools: Self::descriptors(),
            next_cursor: None,
        })
    }

    async fn call_tool(&self, params: CallToolParams) -> anyhow::Result<CallToolResult> {
        let name = params.name.clone();
        let args = params.arguments.unwrap_or_else(|| serde_json::json!({}));
        async {
            let result = self.call(&name, &args).await;
            info!(
                is_error = result.is_error.unwrap_or(false),
                "tool call finished"
            );
            Ok(result)
        }
        .instrument(tracing::info_span!("relay.call_tool", tool = %name))
        .await
    }
}

fn tool_ask() -> Tool {
    Tool {
        name: "ask".to_string(),
        title: Some("Ask".to_string()),
        description: Some(
            "Sends a message to the agent session and returns its reply.".to_string(),
        ),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "message": { "type": "string", "minLength": 1 },
                "timeout": { "type": "integer", "minimum": 1, "default": 120 }
            },
            "required": ["message"],
            "additionalProperties": false
        }),
    }
}

fn tool_memory_search() -> Tool {
    Tool {
        name: "memory_search".to_string(),
        title: Some("Memory Search".to_string()),
        description: Some(
            "Case-insensitive substring search over the workspace memory file.".to_string(),
        ),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "minLength": 1 }
            },
            "required": ["query"],
            "additionalProperties": false
        }),
    }
}

fn tool_sessions_status() -> Tool {
    Tool {
        name: "sessions_status".to_string(),
        title: Some("Sessions Status".to_string()),
        description: Some("Lists the agent's active sessions.".to_string()),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {},
            "additionalProperties": false
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_mcp::ContentBlock;

    fn registry_with_missing_agent(dir: &std::path::Path) -> ToolRegistry {
        ToolRegistry::new(
            AgentClient::new("definitely-not-a-real-agent-binary", "relay"),
            MemoryStore::new(dir),
        )
    }

    fn block_text(result: &CallToolResult) -> &str {
        let ContentBlock::Text { text } = result.content.first().expect("one block");
        text
    }

    #[test]
    fn descriptors_enumerate_the_three_tools_in_order() {
        let names: Vec<String> = ToolRegistry::descriptors()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["ask", "memory_search", "sessions_status"]);
    }

    #[tokio::test]
    async fn unknown_tool_is_an_error_block_not_an_rpc_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let reg = registry_with_missing_agent(dir.path());
        let result = reg
            .call_tool(CallToolParams {
                name: "nope".to_string(),
                arguments: None,
            })
            .await
            .expect("outer success");
        assert_eq!(result.is_error, Some(true));
        assert_eq!(block_text(&result), "Unknown tool: nope");
    }

    #[tokio::test]
    async fn ask_requires_a_message() {
        let dir = tempfile::tempdir().expect("tempdir");
        let reg = registry_with_missing_agent(dir.path());
        let result = reg
            .call_tool(CallToolParams {
                name: "ask".to_string(),
                arguments: Some(serde_json::json!({ "message": "" })),
            })
            .await
            .expect("outer success");
        assert_eq!(result.is_error, Some(true));
        assert!(block_text(&result).contains("non-empty"));
    }

    #[tokio::test]
    async fn ask_with_missing_agent_reports_spawn_failure_in_band() {
        let dir = tempfile::tempdir().expect("tempdir");
        let reg = registry_with_missing_agent(dir.path());
        let result = reg
            .call_tool(CallToolParams {
                name: "ask".to_string(),
                arguments: Some(serde_json::json!({ "message": "hello" })),
            })
            .await
            .expect("outer success");
        assert_eq!(result.is_error, Some(true));
        assert!(block_text(&result).contains("failed to spawn"));
    }

    #[tokio::test]
    async fn memory_search_requires_a_query() {
        let dir = tempfile::tempdir().expect("tempdir");
        let reg = registry_with_missing_agent(dir.path());
        let result = reg
            .call_tool(CallToolParams {
                name: "memory_search".to_string(),
                arguments: Some(serde_json::json!({})),
            })
            .await
            .expect("outer success");
        assert_eq!(result.is_error, Some(true));
    }

    #[tokio::test]
    async fn memory_search_missing_file_is_a_normal_result() {
        let dir = tempfile::tempdir().expect("tempdir");
        let reg = registry_with_missing_agent(dir.path());
        let result = reg
            .call_tool(CallToolParams {
                name: "memory_search".to_string(),
                arguments: Some(serde_json::json!({ "query": "anything" })),
            })
            .await
            .expect("outer success");
        assert!(result.is_error.is_none());
        assert!(block_text(&result).starts_with("Memory file not found at "));
    }
}
