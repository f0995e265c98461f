pub mod codec;
pub mod error;
pub mod handlers;
pub mod middleware;

pub use handlers::{AppState, AppStateInner};

use axum::{Router, routing::get};

/// Assemble the full route tree. Game routes sit behind the user-agent
/// gate; `/debug` and the 404 fallback do not.
pub fn router(state: AppState) -> Router {
    let game_routes = Router::new()
        .route("/", get(handlers::chat))
        .route("/loadchat", get(handlers::load_chat))
        .route("/cards", get(handlers::cards))
        .route("/updatecards", get(handlers::update_cards))
        .route("/trade", get(handlers::trade))
        .route("/gift", get(handlers::gift))
        .layer(axum::middleware::from_fn(middleware::require_game_client));

    Router::new()
        .merge(game_routes)
        .route("/debug", get(handlers::debug_probe))
        .fallback(handlers::not_found)
        .with_state(state)
}
