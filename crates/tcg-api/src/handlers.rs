use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json,
    extract::{ConnectInfo, Query, State},
    http::{HeaderMap, StatusCode, Uri},
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{error, info};

use tcg_core::chat::DEFAULT_LOG_LIMIT;
use tcg_core::{Engine, EngineError, RateLimiter};
use tcg_store::{KeyTree, SqliteTree};

use crate::codec::decode_credential;
use crate::error::ApiError;
use crate::middleware::source_ip;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub store: Arc<SqliteTree>,
    pub engine: Engine<SqliteTree>,
    pub limiter: Arc<RateLimiter>,
}

impl AppStateInner {
    pub fn new(store: Arc<SqliteTree>, limiter: Arc<RateLimiter>) -> Self {
        Self {
            engine: Engine::new(store.clone()),
            store,
            limiter,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatQuery {
    n: Option<String>,
    p: Option<String>,
    m: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateQuery {
    n: Option<String>,
    p: Option<String>,
    /// Collection batch command: `set:id,id;set:-id,...`
    u: Option<String>,
    /// Wanted-list batch command, same grammar.
    w: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TradeQuery {
    n: Option<String>,
    p: Option<String>,
    /// Counterparty username.
    t: Option<String>,
    /// Offered cards: comma-joined `set:id` pairs.
    o: Option<String>,
    /// Requested cards, same format.
    f: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GiftQuery {
    n: Option<String>,
    p: Option<String>,
    t: Option<String>,
    pack: Option<u32>,
    amount: Option<u32>,
}

/// Deobfuscate the credential pair; empty after decoding means missing.
fn credentials(n: Option<&str>, p: Option<&str>) -> Result<(String, String), ApiError> {
    let username = decode_credential(n.unwrap_or(""));
    let password = decode_credential(p.unwrap_or(""));
    if username.is_empty() || password.is_empty() {
        return Err(EngineError::Validation("Username and password").into());
    }
    Ok((username, password))
}

fn throttle(state: &AppState, headers: &HeaderMap, peer: SocketAddr) -> Result<(), ApiError> {
    let source = source_ip(headers, peer);
    if state.limiter.allow(&source) {
        Ok(())
    } else {
        info!("Rate limited: {source}");
        Err(EngineError::RateLimited.into())
    }
}

fn join_error(err: tokio::task::JoinError) -> ApiError {
    error!("spawn_blocking join error: {err}");
    ApiError::Internal
}

/// `GET /` — authenticate (registering on first contact), post `m` if
/// present, return the recent chat log.
pub async fn chat(
    State(state): State<AppState>,
    Query(query): Query<ChatQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let (username, password) = credentials(query.n.as_deref(), query.p.as_deref())?;

    let log = tokio::task::spawn_blocking(move || {
        state
            .engine
            .chat
            .visit(&username, &password, query.m.as_deref(), DEFAULT_LOG_LIMIT)
    })
    .await
    .map_err(join_error)??;

    Ok(Json(log))
}

/// `GET /loadchat` — recent chat log, no identity required.
pub async fn load_chat(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let log = tokio::task::spawn_blocking(move || state.engine.chat.log(DEFAULT_LOG_LIMIT))
        .await
        .map_err(join_error)??;
    Ok(Json(log))
}

/// `GET /cards` — every user's collection, legacy encodings healed.
pub async fn cards(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let collections =
        tokio::task::spawn_blocking(move || state.engine.cards.all_collections())
            .await
            .map_err(join_error)??;
    Ok(Json(Value::Object(collections)))
}

/// `GET /updatecards` — apply the `u` (collection) and `w` (wanted) batch
/// commands, then return the healed collections plus the caller's
/// canonical wanted list.
pub async fn update_cards(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(query): Query<UpdateQuery>,
) -> Result<impl IntoResponse, ApiError> {
    throttle(&state, &headers, peer)?;
    let (username, password) = credentials(query.n.as_deref(), query.p.as_deref())?;

    let body = tokio::task::spawn_blocking(move || {
        state.engine.directory.authenticate(&username, &password)?;

        if let Some(updates) = query.u.as_deref() {
            state.engine.cards.apply_batch(&username, updates)?;
        }
        let wanted = match query.w.as_deref() {
            Some(updates) => state.engine.wanted.apply_batch(&username, updates)?,
            None => state.engine.wanted.normalize(&username)?,
        };
        let collections = state.engine.cards.all_collections()?;

        Ok::<_, EngineError>(json!({ "cards": collections, "wanted": wanted }))
    })
    .await
    .map_err(join_error)??;

    Ok(Json(body))
}

/// `GET /trade` — record a trade proposal against the `trades` ledger.
pub async fn trade(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(query): Query<TradeQuery>,
) -> Result<impl IntoResponse, ApiError> {
    throttle(&state, &headers, peer)?;
    let (username, password) = credentials(query.n.as_deref(), query.p.as_deref())?;

    let (seq, record) = tokio::task::spawn_blocking(move || {
        state.engine.trades.propose(
            &username,
            &password,
            query.t.as_deref().unwrap_or(""),
            query.o.as_deref().unwrap_or(""),
            query.f.as_deref().unwrap_or(""),
        )
    })
    .await
    .map_err(join_error)??;

    Ok(Json(json!({ "id": seq, "trade": record })))
}

/// `GET /gift` — log a gift for out-of-band fulfillment and stamp the
/// target's cooldown.
pub async fn gift(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(query): Query<GiftQuery>,
) -> Result<impl IntoResponse, ApiError> {
    throttle(&state, &headers, peer)?;
    let (username, password) = credentials(query.n.as_deref(), query.p.as_deref())?;
    let Some(pack) = query.pack else {
        return Err(EngineError::Validation("pack").into());
    };
    let amount = query.amount.unwrap_or(1);

    let (seq, record) = tokio::task::spawn_blocking(move || {
        state.engine.gifts.send(
            &username,
            &password,
            query.t.as_deref().unwrap_or(""),
            pack,
            amount,
        )
    })
    .await
    .map_err(join_error)??;

    Ok(Json(json!({ "id": seq, "gift": record })))
}

/// `GET /debug` — store connectivity probe.
pub async fn debug_probe(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let data = tokio::task::spawn_blocking(move || {
        state
            .store
            .set("test/time", json!(chrono::Utc::now().to_rfc3339()))?;
        state.store.get("test")
    })
    .await
    .map_err(join_error)?
    .map_err(EngineError::from)?;

    Ok(Json(json!({ "status": "Store connected", "data": data })))
}

pub async fn not_found(uri: Uri) -> impl IntoResponse {
    info!("Unmatched route: {uri}");
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "Route not found" })),
    )
}
