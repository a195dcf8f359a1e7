//! Model Context Protocol (MCP) primitives used by the relay gateway.
//!
//! This crate is intentionally scoped to what the streamable-HTTP server
//! surface needs: JSON-RPC envelope types, the MCP lifecycle/tool types, and
//! a method dispatcher behind an async handler trait. Transport concerns
//! (HTTP framing, authentication, SSE) live in `apps/relay-gateway`.

mod jsonrpc;
mod server;
mod types;

pub use jsonrpc::{
    JsonRpcError, JsonRpcId, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
};
pub use server::{McpDispatcher, McpHandler, McpServerConfig};
pub use types::{
    CallToolParams, CallToolResult, ContentBlock, InitializeParams, InitializeResult,
    ListToolsParams, ListToolsResult, McpClientInfo, McpServerInfo, Tool,
};

/// Latest protocol version supported by this implementation.
pub const PROTOCOL_VERSION_LATEST: &str = "2025-06-18";

/// Older protocol version still commonly used by clients.
pub const PROTOCOL_VERSION_2025_03_26: &str = "2025-03-26";
