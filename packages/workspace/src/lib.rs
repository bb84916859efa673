//! HTTP and WebSocket surface for the renscript collaborative editor.
//!
//! Wires the parser, the collaboration engine and the storage/identity
//! boundaries into one axum application. All state lives in [`AppState`],
//! built once at startup; handlers receive it by injection so independent
//! server instances can coexist in tests.

pub mod projects;
pub mod scripts;
pub mod state;
pub mod ws;

#[cfg(test)]
mod tests_comprehensive;

pub use state::{ApiError, AppState, SharedState};

use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

/// Builds the full application router.
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route(
            "/api/projects",
            post(projects::create_project).get(projects::list_projects),
        )
        .route("/api/projects/:project_id", get(projects::get_project))
        .route("/api/projects/:project_id/share", post(projects::share_project))
        .route("/api/projects/:project_id/scripts", post(projects::create_script))
        .route("/api/scripts/parse", post(scripts::parse_script))
        .route("/api/scripts/node-content/:script_id", get(scripts::node_content))
        .route("/api/scripts/update-node/:script_id", post(scripts::update_node))
        .route("/api/scripts/insert-node/:script_id", post(scripts::insert_node))
        .route("/api/scripts/download/:script_id", get(scripts::download_script))
        .route("/api/scripts/search", get(scripts::search_scripts))
        .route("/api/scripts/project/:project_id", get(scripts::project_scripts))
        .route("/api/scripts/:script_id", delete(scripts::delete_script))
        .route("/ws/project/:project_id", get(ws::project_socket))
        .route("/ws/script/:script_id", get(ws::script_socket))
        .with_state(state)
}

async fn root() -> Json<Value> {
    Json(json!({ "message": "Welcome to the Renscript editor API" }))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
