use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use subtle::ConstantTimeEq;

fn reject(status: StatusCode, body: &'static str) -> Response {
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap_or_else(|_| Response::new(Body::empty()))
}

/// Bearer-token gate for the MCP endpoint.
///
/// Missing or malformed `Authorization` header is 401; a well-formed bearer
/// token that does not match the configured secret is 403.
pub async fn require_auth(
    State(auth_token): State<String>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(presented) = request
        .headers()
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
    else {
        return reject(
            StatusCode::UNAUTHORIZED,
            r#"{"code":"unauthorized","message":"missing or malformed authorization header"}"#,
        );
    };

    let matches: bool = presented
        .as_bytes()
        .ct_eq(auth_token.as_bytes())
        .into();
    if !matches {
        return reject(
            StatusCode::FORBIDDEN,
            r#"{"code":"forbidden","message":"invalid token"}"#,
        );
    }

    next.run(request).await
}
