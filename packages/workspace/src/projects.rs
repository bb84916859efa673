//! Project REST surface: creation, listing, sharing.

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use renscript_common::store::{ProjectSummary, ScriptStore, ScriptSummary};
use renscript_editor::ActiveUser;

use crate::scripts::AuthQuery;
use crate::state::{current_user, require_access, ApiError, SharedState};

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProjectCreatedResponse {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub owner_id: String,
}

pub async fn create_project(
    State(state): State<SharedState>,
    Query(auth): Query<AuthQuery>,
    headers: HeaderMap,
    Json(request): Json<CreateProjectRequest>,
) -> Result<Json<ProjectCreatedResponse>, ApiError> {
    let user = current_user(&state, &headers, auth.token.as_deref())?;
    let id = state.store.create_project(&request.name, &user.id)?;
    Ok(Json(ProjectCreatedResponse {
        id,
        name: request.name,
        description: request.description,
        owner_id: user.id,
    }))
}

pub async fn list_projects(
    State(state): State<SharedState>,
    Query(auth): Query<AuthQuery>,
    headers: HeaderMap,
) -> Result<Json<Vec<ProjectSummary>>, ApiError> {
    let user = current_user(&state, &headers, auth.token.as_deref())?;
    Ok(Json(state.store.get_user_projects(&user.id)))
}

#[derive(Debug, Serialize)]
pub struct ProjectDetailsResponse {
    pub id: String,
    pub name: String,
    pub role: String,
    pub scripts: Vec<ScriptSummary>,
    pub active_users: Vec<ActiveUser>,
}

pub async fn get_project(
    State(state): State<SharedState>,
    Path(project_id): Path<String>,
    Query(auth): Query<AuthQuery>,
    headers: HeaderMap,
) -> Result<Json<ProjectDetailsResponse>, ApiError> {
    let user = current_user(&state, &headers, auth.token.as_deref())?;
    let role = require_access(&state, &user.id, &project_id)?;

    let summary = state
        .store
        .get_user_projects(&user.id)
        .into_iter()
        .find(|p| p.id == project_id)
        .ok_or(ApiError::NotFound {
            resource: "Project",
            id: project_id.clone(),
        })?;

    Ok(Json(ProjectDetailsResponse {
        id: summary.id,
        name: summary.name,
        role,
        scripts: state.store.get_project_scripts(&project_id),
        active_users: state.engine.active_project_users(&project_id),
    }))
}

#[derive(Debug, Deserialize)]
pub struct ShareRequest {
    pub user_id: String,
    pub role: String,
}

#[derive(Debug, Serialize)]
pub struct ShareResponse {
    pub status: String,
    pub message: String,
}

pub async fn share_project(
    State(state): State<SharedState>,
    Path(project_id): Path<String>,
    Query(auth): Query<AuthQuery>,
    headers: HeaderMap,
    Json(request): Json<ShareRequest>,
) -> Result<Json<ShareResponse>, ApiError> {
    let user = current_user(&state, &headers, auth.token.as_deref())?;
    require_access(&state, &user.id, &project_id)?;

    state
        .store
        .grant_access(&project_id, &request.user_id, &request.role)?;

    Ok(Json(ShareResponse {
        status: "success".to_string(),
        message: format!("Project shared with user {}", request.user_id),
    }))
}

#[derive(Debug, Deserialize)]
pub struct CreateScriptRequest {
    pub filename: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct ScriptCreatedResponse {
    pub id: String,
    pub filename: String,
    pub project_id: String,
}

pub async fn create_script(
    State(state): State<SharedState>,
    Path(project_id): Path<String>,
    Query(auth): Query<AuthQuery>,
    headers: HeaderMap,
    Json(request): Json<CreateScriptRequest>,
) -> Result<Json<ScriptCreatedResponse>, ApiError> {
    let user = current_user(&state, &headers, auth.token.as_deref())?;
    require_access(&state, &user.id, &project_id)?;

    let id = state
        .store
        .save_script(&project_id, &request.filename, &request.content, &user.id)?;

    Ok(Json(ScriptCreatedResponse {
        id,
        filename: request.filename,
        project_id,
    }))
}
