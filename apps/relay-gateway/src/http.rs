use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderValue, Request, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use chrono::Utc;
use futures::stream::Stream;
use relay_mcp::{
    JsonRpcError, JsonRpcId, JsonRpcMessage, JsonRpcResponse, McpDispatcher, McpServerConfig,
};
use serde_json::Value;
use tower_http::trace::TraceLayer;

use crate::middleware::require_auth;

/// Default interval between comment-only SSE heartbeat frames.
pub const SSE_HEARTBEAT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct HttpState {
    pub cfg: McpServerConfig,
    pub dispatcher: Arc<McpDispatcher>,
    pub display_name: String,
    pub auth_token: String,
    pub sse_heartbeat: Duration,
}

pub fn router(state: HttpState) -> Router {
    let mcp = Router::new()
        .route("/mcp", post(mcp_post).get(mcp_sse))
        .layer(axum::middleware::from_fn_with_state(
            state.auth_token.clone(),
            require_auth,
        ));

    Router::new()
        .route("/", get(describe))
        .route("/health", get(health))
        .merge(mcp)
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &Request<_>| {
                // Never include request headers or bodies in spans (the
                // bearer token travels in a header).
                tracing::info_span!(
                    "http.request",
                    http_method = %req.method(),
                    http_path = %req.uri().path(),
                )
            }),
        )
        .with_state(state)
}

/// Unauthenticated server descriptor.
async fn describe(State(st): State<HttpState>) -> Json<Value> {
    Json(serde_json::json!({
        "name": st.display_name,
        "version": st.cfg.server_info.version,
        "protocol": "mcp",
        "endpoint": "/mcp",
    }))
}

/// Unauthenticated liveness probe.
async fn health(State(st): State<HttpState>) -> Json<Value> {
    Json(serde_json::json!({
        "status": "ok",
        "name": st.display_name,
        "ts": Utc::now().to_rfc3339(),
    }))
}

/// Heartbeat-only event stream. No application payloads are pushed; the
/// keep-alive comment frames are the entire contract. Dropping the stream
/// when the client disconnects releases the interval.
async fn mcp_sse(State(st): State<HttpState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    Sse::new(futures::stream::pending::<Result<Event, Infallible>>())
        .keep_alive(KeepAlive::new().interval(st.sse_heartbeat))
}

async fn mcp_post(State(st): State<HttpState>, body: String) -> Response {
    let val: Value = match serde_json::from_str(&body) {
        Ok(v) => v,
        Err(e) => {
            let resp = JsonRpcResponse::err(
                JsonRpcId::Null,
                JsonRpcError {
                    code: -32700,
                    message: "parse error".to_string(),
                    data: Some(serde_json::json!({ "detail": e.to_string() })),
                },
            );
            return jsonrpc_http_response(resp);
        }
    };

    if val.is_array() {
        let resp = JsonRpcResponse::err(
            JsonRpcId::Null,
            JsonRpcError {
                code: -32600,
                message: "batching not supported".to_string(),
                data: None,
            },
        );
        return jsonrpc_http_response(resp);
    }

    let msg: JsonRpcMessage = match serde_json::from_value(val) {
        Ok(m) => m,
        Err(e) => {
            let resp = JsonRpcResponse::err(
                JsonRpcId::Null,
                JsonRpcError {
                    code: -32600,
                    message: "invalid request".to_string(),
                    data: Some(serde_json::json!({ "detail": e.to_string() })),
                },
            );
            return jsonrpc_http_response(resp);
        }
    };

    match st.dispatcher.handle_message(msg).await {
        Some(resp) => jsonrpc_http_response(resp),
        // Notifications (and stray responses) are acknowledged without a body.
        None => StatusCode::ACCEPTED.into_response(),
    }
}

fn jsonrpc_http_response(resp: JsonRpcResponse) -> Response {
    // Internal dispatcher failures surface as HTTP 500; everything else,
    // including tool-level errors, is HTTP 200.
    let status = match resp.error.as_ref().map(|e| e.code) {
        Some(-32603) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::OK,
    };

    let session_id = resp
        .result
        .as_ref()
        .and_then(|r| r.get("sessionId"))
        .and_then(|v| v.as_str())
        .map(str::to_owned);

    let body = serde_json::to_string(&resp).unwrap_or_else(|_| "{}".to_string());
    let mut builder = Response::builder()
        .status(status)
        .header("content-type", "application/json");

    if let Some(sid) = session_id {
        if let Ok(v) = HeaderValue::from_str(&sid) {
            builder = builder.header("mcp-session-id", v);
        }
    }

    builder
        .body(axum::body::Body::from(body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
