//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! The push feed lives at `/ws`, the same snapshot is readable over plain
//! HTTP at `/api/clients`, and everything else falls through to the static
//! viewer page under `http.root`.

pub mod ws;

use std::path::Path;

use axum::Router;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use serde_json::json;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Header carrying the snapshot's publish time in epoch milliseconds.
pub const LAST_UPDATE_HEADER: &str = "x-last-update";

pub fn app(state: AppState, web_root: &Path) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Compression stays off the websocket upgrade.
    let http = Router::new()
        .route("/api/clients", get(clients))
        .route("/healthz", get(healthz))
        .fallback_service(ServeDir::new(web_root).append_index_html_on_directories(true))
        .layer(CompressionLayer::new())
        .layer(cors);

    Router::new()
        .route("/ws", get(ws::handle_ws))
        .merge(http)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn clients(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.snapshot.current();
    (
        [
            (CONTENT_TYPE.as_str(), "application/json".to_owned()),
            (LAST_UPDATE_HEADER, snapshot.last_update.to_string()),
        ],
        snapshot.data.to_string(),
    )
}

async fn healthz(State(state): State<AppState>) -> Json<serde_json::Value> {
    let snapshot = state.snapshot.current();
    Json(json!({
        "status": "ok",
        "last_update": snapshot.last_update,
        "clients": snapshot.count,
        "leases": state.leases.len().await,
    }))
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
