//! HTTP gateway translating MCP tool calls into invocations of an external
//! command-line agent and scans over a flat-text memory document.
//!
//! Exposed as a library so integration tests can mount the real router on an
//! ephemeral port; the binary entrypoint lives in `main.rs`.

pub mod agent;
pub mod http;
pub mod memory;
pub mod middleware;
pub mod tools;
