use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::extract::connect_info::MockConnectInfo;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use tcg_api::{AppStateInner, router};
use tcg_core::RateLimiter;
use tcg_store::SqliteTree;

const XOR_KEY: u8 = 0x5A;
const SHIFT_VALUE: u8 = 42;

/// Client-side credential obfuscation: hex, mask, hex again.
fn obfuscate(plain: &str) -> String {
    let inner_hex = hex::encode(plain.as_bytes());
    let masked: Vec<u8> = inner_hex
        .bytes()
        .map(|b| (b ^ XOR_KEY).wrapping_add(SHIFT_VALUE))
        .collect();
    hex::encode(masked)
}

fn app() -> Router {
    let store = Arc::new(SqliteTree::open_in_memory().unwrap());
    let limiter = Arc::new(RateLimiter::new(Duration::from_millis(5000)));
    router(Arc::new(AppStateInner::new(store, limiter)))
        .layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 9999))))
}

async fn get(app: &Router, uri: &str, user_agent: Option<&str>) -> (StatusCode, Value) {
    let mut builder = Request::builder().uri(uri);
    if let Some(ua) = user_agent {
        builder = builder.header("user-agent", ua);
    }
    let response = app
        .clone()
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn non_game_clients_are_rejected() {
    let app = app();
    let (status, body) = get(&app, "/loadchat", Some("Mozilla/5.0")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Access restricted to VRChat");

    let (status, _) = get(&app, "/loadchat", Some("VRCUnity")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn chat_roundtrip_posts_and_returns_log() {
    let app = app();
    let uri = format!(
        "/?n={}&p={}&m=hello",
        obfuscate("alice"),
        obfuscate("hunter2")
    );

    let (status, body) = get(&app, &uri, Some("VRCUnity")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["user"], "alice");
    assert_eq!(body[0]["msg"], "hello");

    let (status, body) = get(&app, "/loadchat", Some("Unity")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn missing_credentials_are_a_client_error() {
    let app = app();
    let (status, body) = get(&app, "/?m=hi", Some("VRCUnity")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Username and password required");
}

#[tokio::test]
async fn wrong_password_is_forbidden() {
    let app = app();
    let first = format!("/?n={}&p={}", obfuscate("alice"), obfuscate("right"));
    let (status, _) = get(&app, &first, Some("VRCUnity")).await;
    assert_eq!(status, StatusCode::OK);

    let second = format!("/?n={}&p={}", obfuscate("alice"), obfuscate("wrong"));
    let (status, body) = get(&app, &second, Some("VRCUnity")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Invalid password");
}

#[tokio::test]
async fn update_cards_applies_batch_and_returns_normalized_state() {
    let app = app();
    let uri = format!(
        "/updatecards?n={}&p={}&u=sv1:3,4;sv1:-4&w=sv3:10,11",
        obfuscate("alice"),
        obfuscate("pw")
    );

    let (status, body) = get(&app, &uri, Some("VRCUnity")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cards"]["alice"]["sv1"], serde_json::json!({ "3": "T" }));
    assert_eq!(body["wanted"]["sv3"], "10,11");
}

#[tokio::test]
async fn mutating_endpoints_are_rate_limited_per_source() {
    let app = app();
    let uri = format!(
        "/updatecards?n={}&p={}&u=sv1:1",
        obfuscate("alice"),
        obfuscate("pw")
    );

    let (status, _) = get(&app, &uri, Some("VRCUnity")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = get(&app, &uri, Some("VRCUnity")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], "Too many requests");
}

#[tokio::test]
async fn unmatched_routes_return_json_404() {
    let app = app();
    let (status, body) = get(&app, "/nope", Some("VRCUnity")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Route not found");
}
