use std::net::SocketAddr;

use axum::{
    Json,
    extract::Request,
    http::{HeaderMap, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::debug;

/// Reject anything that does not identify as the game client. This is a
/// courtesy fence against casual browsers, not an authentication layer.
pub async fn require_game_client(req: Request, next: Next) -> Response {
    let user_agent = req
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if !user_agent.contains("VRCUnity") && !user_agent.contains("Unity") {
        debug!("Rejected non-game client: {user_agent}");
        return (
            StatusCode::FORBIDDEN,
            Json(json!({ "error": "Access restricted to VRChat" })),
        )
            .into_response();
    }

    next.run(req).await
}

/// Rate-limit key for a request: first hop of `X-Forwarded-For` when the
/// process sits behind a proxy, peer address otherwise.
pub fn source_ip(headers: &HeaderMap, peer: SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| peer.ip().to_string())
}
