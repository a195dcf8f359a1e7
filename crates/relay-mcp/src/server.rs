use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::jsonrpc::{
    JsonRpcError, JsonRpcId, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
};
use crate::types::{
    CallToolParams, CallToolResult, InitializeParams, InitializeResult, ListToolsParams,
    ListToolsResult, McpServerInfo,
};
use crate::{PROTOCOL_VERSION_2025_03_26, PROTOCOL_VERSION_LATEST};

#[async_trait]
pub trait McpHandler: Send + Sync {
    async fn list_tools(&self, params: ListToolsParams) -> anyhow::Result<ListToolsResult>;
    async fn call_tool(&self, params: CallToolParams) -> anyhow::Result<CallToolResult>;
}

#[derive(Debug, Clone)]
pub struct McpServerConfig {
    pub server_info: McpServerInfo,
    pub instructions: Option<String>,
    pub capabilities: Value,
    pub supported_protocol_versions: Vec<String>,
}

impl McpServerConfig {
    pub fn default_for_binary(name: &str, version: &str) -> Self {
        Self {
            server_info: McpServerInfo {
                name: name.to_string(),
                version: version.to_string(),
            },
            instructions: None,
            capabilities: serde_json::json!({
                "tools": {
                    "listChanged": false
                }
            }),
            supported_protocol_versions: vec![
                PROTOCOL_VERSION_LATEST.to_string(),
                PROTOCOL_VERSION_2025_03_26.to_string(),
            ],
        }
    }

    fn negotiate_protocol(&self, requested: &str) -> String {
        if self
            .supported_protocol_versions
            .iter()
            .any(|v| v == requested)
        {
            requested.to_string()
        } else {
            PROTOCOL_VERSION_LATEST.to_string()
        }
    }
}

/// MCP method router.
///
/// Stateless between calls: every method may be invoked at any time, and the
/// `initialize` handshake mints a fresh identifier instead of recording a
/// session. Handlers are shared, so one dispatcher serves all requests.
pub struct McpDispatcher {
    cfg: McpServerConfig,
    handler: Arc<dyn McpHandler>,
}

impl McpDispatcher {
    pub fn new(cfg: McpServerConfig, handler: Arc<dyn McpHandler>) -> Self {
        Self { cfg, handler }
    }

    /// Handle a single JSON-RPC message.
    ///
    /// Returns `Some(response)` for requests, `None` for notifications or
    /// stray response messages (both are acknowledged without a body).
    pub async fn handle_message(&self, msg: JsonRpcMessage) -> Option<JsonRpcResponse> {
        match msg {
            JsonRpcMessage::Request(req) => Some(self.handle_request(req).await),
            JsonRpcMessage::Notification(n) => {
                self.handle_notification(n);
                None
            }
            JsonRpcMessage::Response(_) => None,
        }
    }

    fn invalid_request(id: JsonRpcId, message: impl Into<String>) -> JsonRpcResponse {
        JsonRpcResponse::err(
            id,
            JsonRpcError {
                code: -32600,
                message: message.into(),
                data: None,
            },
        )
    }

    fn method_not_found(id: JsonRpcId) -> JsonRpcResponse {
        JsonRpcResponse::err(
            id,
            JsonRpcError {
                code: -32601,
                message: "method not found".to_string(),
                data: None,
            },
        )
    }

    fn invalid_params(id: JsonRpcId, detail: String) -> JsonRpcResponse {
        JsonRpcResponse::err(
            id,
            JsonRpcError {
                code: -32602,
                message: "invalid params".to_string(),
                data: Some(serde_json::json!({ "detail": detail })),
            },
        )
    }

    fn internal_error(id: JsonRpcId, detail: String) -> JsonRpcResponse {
        JsonRpcResponse::err(
            id,
            JsonRpcError {
                code: -32603,
                message: detail,
                data: None,
            },
        )
    }

    async fn handle_request(&self, req: JsonRpcRequest) -> JsonRpcResponse {
        if req.jsonrpc != "2.0" {
            return Self::invalid_request(req.id, "invalid jsonrpc version");
        }

        match req.method.as_str() {
            "initialize" => self.handle_initialize(req),
            "ping" => JsonRpcResponse::ok(req.id, serde_json::json!({})),
            "tools/list" => {
                let params = match req.params {
                    Some(v) => {
                        serde_json::from_value::<ListToolsParams>(v).map_err(|e| e.to_string())
                    }
                    None => Ok(ListToolsParams::default()),
                };
                let params = match params {
                    Ok(p) => p,
                    Err(e) => return Self::invalid_params(req.id, e),
                };

                match self.handler.list_tools(params).await {
                    Ok(res) => JsonRpcResponse::ok(
                        req.id,
                        serde_json::to_value(res).unwrap_or(Value::Null),
                    ),
                    Err(e) => Self::internal_error(req.id, e.to_string()),
                }
            }
            "tools/call" => {
                let Some(v) = req.params else {
                    return Self::invalid_params(req.id, "missing params".to_string());
                };
                let params = match serde_json::from_value::<CallToolParams>(v) {
                    Ok(p) => p,
                    Err(e) => return Self::invalid_params(req.id, e.to_string()),
                };

                match self.handler.call_tool(params).await {
                    Ok(res) => JsonRpcResponse::ok(
                        req.id,
                        serde_json::to_value(res).unwrap_or(Value::Null),
                    ),
                    Err(e) => Self::internal_error(req.id, e.to_string()),
                }
            }
            _ => Self::method_not_found(req.id),
        }
    }

    fn handle_initialize(&self, req: JsonRpcRequest) -> JsonRpcResponse {
        let Some(params) = req.params else {
            return Self::invalid_params(req.id, "missing params".to_string());
        };

        let init: InitializeParams = match serde_json::from_value(params) {
            Ok(p) => p,
            Err(e) => return Self::invalid_params(req.id, e.to_string()),
        };

        let negotiated = self.cfg.negotiate_protocol(&init.protocol_version);
        tracing::info!(
            client = %init.client_info.name,
            protocol = %negotiated,
            "mcp initialize"
        );

        let result = InitializeResult {
            protocol_version: negotiated,
            capabilities: self.cfg.capabilities.clone(),
            server_info: self.cfg.server_info.clone(),
            session_id: Uuid::new_v4().to_string(),
            instructions: self.cfg.instructions.clone(),
        };

        JsonRpcResponse::ok(req.id, serde_json::to_value(result).unwrap_or(Value::Null))
    }

    fn handle_notification(&self, n: JsonRpcNotification) {
        if n.jsonrpc != "2.0" {
            return;
        }
        if n.method.as_str() == "notifications/initialized" {
            tracing::debug!("client reported initialized");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContentBlock, Tool};

    struct DummyHandler;

    #[async_trait]
    impl McpHandler for DummyHandler {
        async fn list_tools(&self, _params: ListToolsParams) -> anyhow::Result<ListToolsResult> {
            Ok(ListToolsResult {
                tools: vec![Tool {
                    name: "echo".to_string(),
                    title: Some("Echo".to_string()),
                    description: Some("demo".to_string()),
                    input_schema: serde_json::json!({"type":"object"}),
                }],
                next_cursor: None,
            })
        }

        async fn call_tool(&self, params: CallToolParams) -> anyhow::Result<CallToolResult> {
            if params.name == "explode" {
                anyhow::bail!("handler exploded");
            }
            Ok(CallToolResult {
                content: vec![ContentBlock::Text {
                    text: format!("called {}", params.name),
                }],
                is_error: Some(false),
            })
        }
    }

    fn mk_dispatcher() -> McpDispatcher {
        let cfg = McpServerConfig::default_for_binary("test", "0.0.0");
        let h: Arc<dyn McpHandler> = Arc::new(DummyHandler);
        McpDispatcher::new(cfg, h)
    }

    #[tokio::test]
    async fn tools_list_works_without_initialize() {
        let d = mk_dispatcher();
        let req = JsonRpcRequest::new(
            JsonRpcId::Number(1),
            "tools/list",
            Some(serde_json::json!({})),
        );
        let resp = d
            .handle_message(JsonRpcMessage::Request(req))
            .await
            .expect("response");
        assert!(resp.error.is_none());
        assert!(resp.result.is_some());
    }

    #[tokio::test]
    async fn initialize_mints_a_session_id_and_negotiates_protocol() {
        let d = mk_dispatcher();
        let req = JsonRpcRequest::new(
            JsonRpcId::Number(1),
            "initialize",
            Some(serde_json::json!({
                "protocolVersion": PROTOCOL_VERSION_2025_03_26,
                "capabilities": {},
                "clientInfo": { "name": "client", "version": "0.0.0" }
            })),
        );
        let resp = d
            .handle_message(JsonRpcMessage::Request(req))
            .await
            .expect("response");
        let result = resp.result.expect("result");
        assert_eq!(
            result.get("protocolVersion").and_then(|v| v.as_str()),
            Some(PROTOCOL_VERSION_2025_03_26)
        );
        let sid = result
            .get("sessionId")
            .and_then(|v| v.as_str())
            .expect("sessionId");
        Uuid::parse_str(sid).expect("uuid session id");
    }

    #[tokio::test]
    async fn unsupported_protocol_falls_back_to_latest() {
        let d = mk_dispatcher();
        let req = JsonRpcRequest::new(
            JsonRpcId::Number(1),
            "initialize",
            Some(serde_json::json!({
                "protocolVersion": "1999-01-01",
                "clientInfo": { "name": "client", "version": "0.0.0" }
            })),
        );
        let resp = d
            .handle_message(JsonRpcMessage::Request(req))
            .await
            .expect("response");
        assert_eq!(
            resp.result
                .expect("result")
                .get("protocolVersion")
                .and_then(|v| v.as_str()),
            Some(PROTOCOL_VERSION_LATEST)
        );
    }

    #[tokio::test]
    async fn wrong_jsonrpc_version_is_rejected_before_dispatch() {
        let d = mk_dispatcher();
        let mut req = JsonRpcRequest::new(JsonRpcId::Number(1), "ping", None);
        req.jsonrpc = "1.0".to_string();
        let resp = d
            .handle_message(JsonRpcMessage::Request(req))
            .await
            .expect("response");
        assert_eq!(resp.error.as_ref().map(|e| e.code), Some(-32600));
    }

    #[tokio::test]
    async fn unknown_method_is_error() {
        let d = mk_dispatcher();
        let req = JsonRpcRequest::new(JsonRpcId::Number(1), "nope", None);
        let resp = d
            .handle_message(JsonRpcMessage::Request(req))
            .await
            .expect("response");
        assert_eq!(resp.error.as_ref().map(|e| e.code), Some(-32601));
    }

    #[tokio::test]
    async fn ping_returns_empty_object_regardless_of_params() {
        let d = mk_dispatcher();
        let req = JsonRpcRequest::new(
            JsonRpcId::Number(1),
            "ping",
            Some(serde_json::json!({"anything": "goes"})),
        );
        let resp = d
            .handle_message(JsonRpcMessage::Request(req))
            .await
            .expect("response");
        assert_eq!(resp.result, Some(serde_json::json!({})));
    }

    #[tokio::test]
    async fn notification_produces_no_response() {
        let d = mk_dispatcher();
        let note = JsonRpcNotification::new("notifications/initialized", None);
        let resp = d.handle_message(JsonRpcMessage::Notification(note)).await;
        assert!(resp.is_none());
    }

    #[tokio::test]
    async fn handler_failure_surfaces_as_internal_error() {
        let d = mk_dispatcher();
        let req = JsonRpcRequest::new(
            JsonRpcId::Number(1),
            "tools/call",
            Some(serde_json::json!({"name": "explode"})),
        );
        let resp = d
            .handle_message(JsonRpcMessage::Request(req))
            .await
            .expect("response");
        let err = resp.error.expect("error");
        assert_eq!(err.code, -32603);
        assert!(err.message.contains("handler exploded"));
    }
}
