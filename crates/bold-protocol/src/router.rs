//! Axum router construction for the graph store protocol.
//!
//! Graph resources are addressed directly by path, so apart from the
//! `GET /ws` statement feed every request goes to the
//! [`handlers::dispatch`] fallback. The feed is served in every state.
//! CORS is open so browser-based agents can reach the server.

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;
use crate::ws;

/// Build the complete Axum router for the protocol server.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ws", get(ws::ws_statements))
        .fallback(handlers::dispatch)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
