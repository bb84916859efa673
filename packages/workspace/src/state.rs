//! Shared application state and the HTTP error taxonomy.

use std::sync::Arc;

use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use renscript_common::identity::{IdentityProvider, User};
use renscript_common::store::{ScriptStore, StoreError};
use renscript_editor::CollabEngine;

/// Everything a handler needs, constructed once at startup and injected.
pub struct AppState {
    pub engine: CollabEngine,
    pub store: Arc<dyn ScriptStore>,
    pub identity: Arc<dyn IdentityProvider>,
}

pub type SharedState = Arc<AppState>;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{resource} with ID {id} not found")]
    NotFound { resource: &'static str, id: String },

    #[error("authentication failed")]
    Unauthenticated,

    #[error("permission denied for {0}")]
    PermissionDenied(&'static str),

    #[error("{0}")]
    Validation(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

/// Bearer token from the Authorization header, if present.
pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_string)
}

/// Resolves the caller from the Authorization header or a `token` query
/// parameter. Any identity failure is reported as unauthenticated.
pub fn current_user(
    state: &AppState,
    headers: &HeaderMap,
    query_token: Option<&str>,
) -> Result<User, ApiError> {
    let token = bearer_token(headers)
        .or_else(|| query_token.map(str::to_string))
        .ok_or(ApiError::Unauthenticated)?;
    state
        .identity
        .current_user(&token)
        .map_err(|_| ApiError::Unauthenticated)
}

/// The caller's role in the project, or a permission error.
pub fn require_access(
    state: &AppState,
    user_id: &str,
    project_id: &str,
) -> Result<String, ApiError> {
    state
        .store
        .check_access(user_id, project_id)
        .ok_or(ApiError::PermissionDenied("this project"))
}
