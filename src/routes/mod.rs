use axum::Router;

use crate::state::SharedState;

/// Admin-key gated endpoints.
pub mod admin;
/// Swagger UI.
pub mod docs;
/// Team registration, ranking and avatars.
pub mod game;
/// Healthcheck.
pub mod health;
/// Device progression.
pub mod progress;
/// Server-sent event streams.
pub mod sse;
/// Realtime socket.
pub mod websocket;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(sse::router())
        .merge(websocket::router())
        .merge(game::router())
        .merge(progress::router())
        .merge(admin::router(state.clone()));

    let docs_router = docs::router(state.clone());

    api_router.merge(docs_router).with_state(state)
}
