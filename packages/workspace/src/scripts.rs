//! Script REST surface: upload/parse, node content by line range, splice
//! edits, download, search.
//!
//! The tree handed back by these endpoints is a snapshot; concurrent edits
//! to the same script resolve last-write-wins at the store, and node-level
//! exclusivity is the collaboration socket's lock concern.

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use renscript_common::store::{ScriptStore, ScriptSummary};
use renscript_parser::{parse_source, ChoiceNode};

use crate::state::{current_user, require_access, ApiError, SharedState};

/// Uploaded scripts are capped at 1 MiB.
pub const MAX_SCRIPT_BYTES: usize = 1024 * 1024;

#[derive(Debug, Deserialize)]
pub struct AuthQuery {
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ParseRequest {
    pub filename: String,
    pub content: String,
    pub project_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ParseResponse {
    pub script_id: String,
    pub filename: String,
    pub tree: ChoiceNode,
}

pub async fn parse_script(
    State(state): State<SharedState>,
    Query(auth): Query<AuthQuery>,
    headers: HeaderMap,
    Json(request): Json<ParseRequest>,
) -> Result<Json<ParseResponse>, ApiError> {
    let user = current_user(&state, &headers, auth.token.as_deref())?;

    if !request.filename.to_lowercase().ends_with(".rpy") {
        return Err(ApiError::Validation(
            "Invalid file type. Only .rpy files are allowed.".to_string(),
        ));
    }
    if request.content.len() > MAX_SCRIPT_BYTES {
        return Err(ApiError::Validation(
            "File too large. Maximum size is 1MB.".to_string(),
        ));
    }

    let project_id = match request.project_id {
        Some(project_id) => {
            require_access(&state, &user.id, &project_id)?;
            project_id
        }
        None => state.store.create_default_project(&user.id)?,
    };

    let script_id = state
        .store
        .save_script(&project_id, &request.filename, &request.content, &user.id)?;

    // Seeding ids with the script id keeps node ids stable across re-parses.
    let tree = parse_source(&request.content, &script_id);

    Ok(Json(ParseResponse {
        script_id,
        filename: request.filename,
        tree,
    }))
}

#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    pub start_line: usize,
    pub end_line: usize,
    pub token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct NodeContentResponse {
    pub content: String,
    pub start_line: usize,
    pub end_line: usize,
}

pub async fn node_content(
    State(state): State<SharedState>,
    Path(script_id): Path<String>,
    Query(query): Query<RangeQuery>,
    headers: HeaderMap,
) -> Result<Json<NodeContentResponse>, ApiError> {
    let user = current_user(&state, &headers, query.token.as_deref())?;
    let script = state
        .store
        .get_script(&script_id)
        .ok_or(ApiError::NotFound {
            resource: "Script",
            id: script_id.clone(),
        })?;
    require_access(&state, &user.id, &script.project_id)?;

    let lines = state.store.load_script_lines(&script_id)?;
    if query.end_line >= lines.len() || query.start_line > query.end_line {
        return Err(ApiError::Validation("Invalid line range".to_string()));
    }

    Ok(Json(NodeContentResponse {
        content: lines[query.start_line..=query.end_line].join("\n"),
        start_line: query.start_line,
        end_line: query.end_line,
    }))
}

#[derive(Debug, Deserialize)]
pub struct UpdateNodeRequest {
    pub start_line: usize,
    pub end_line: usize,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct UpdateNodeResponse {
    pub start_line: usize,
    pub end_line: i64,
    pub line_diff: i64,
}

pub async fn update_node(
    State(state): State<SharedState>,
    Path(script_id): Path<String>,
    Query(auth): Query<AuthQuery>,
    headers: HeaderMap,
    Json(request): Json<UpdateNodeRequest>,
) -> Result<Json<UpdateNodeResponse>, ApiError> {
    let user = current_user(&state, &headers, auth.token.as_deref())?;
    let script = state
        .store
        .get_script(&script_id)
        .ok_or(ApiError::NotFound {
            resource: "Script",
            id: script_id.clone(),
        })?;
    require_access(&state, &user.id, &script.project_id)?;

    let mut lines = state.store.load_script_lines(&script_id)?;
    if request.end_line >= lines.len() || request.start_line > request.end_line {
        return Err(ApiError::Validation("Invalid line range".to_string()));
    }

    let old_count = request.end_line - request.start_line + 1;
    let new_lines: Vec<String> = request.content.lines().map(str::to_string).collect();
    let new_count = new_lines.len();

    lines.splice(request.start_line..=request.end_line, new_lines);
    state
        .store
        .save_script_content(&script_id, &lines.join("\n"), &user.id)?;

    Ok(Json(UpdateNodeResponse {
        start_line: request.start_line,
        end_line: request.start_line as i64 + new_count as i64 - 1,
        line_diff: new_count as i64 - old_count as i64,
    }))
}

#[derive(Debug, Deserialize)]
pub struct InsertNodeRequest {
    pub insertion_line: usize,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct InsertNodeResponse {
    pub start_line: usize,
    pub end_line: i64,
    pub line_count: usize,
    pub tree: ChoiceNode,
}

pub async fn insert_node(
    State(state): State<SharedState>,
    Path(script_id): Path<String>,
    Query(auth): Query<AuthQuery>,
    headers: HeaderMap,
    Json(request): Json<InsertNodeRequest>,
) -> Result<Json<InsertNodeResponse>, ApiError> {
    let user = current_user(&state, &headers, auth.token.as_deref())?;
    let script = state
        .store
        .get_script(&script_id)
        .ok_or(ApiError::NotFound {
            resource: "Script",
            id: script_id.clone(),
        })?;
    require_access(&state, &user.id, &script.project_id)?;

    let mut lines = state.store.load_script_lines(&script_id)?;
    if request.insertion_line > lines.len() {
        return Err(ApiError::Validation("Invalid insertion line".to_string()));
    }

    let new_lines: Vec<String> = request.content.lines().map(str::to_string).collect();
    let line_count = new_lines.len();
    lines.splice(request.insertion_line..request.insertion_line, new_lines);

    let new_content = lines.join("\n");
    state
        .store
        .save_script_content(&script_id, &new_content, &user.id)?;

    // The whole tree shifts below the insertion point, so re-parse.
    let tree = parse_source(&new_content, &script_id);

    Ok(Json(InsertNodeResponse {
        start_line: request.insertion_line,
        end_line: request.insertion_line as i64 + line_count as i64 - 1,
        line_count,
        tree,
    }))
}

#[derive(Debug, Serialize)]
pub struct DownloadResponse {
    pub filename: String,
    pub content: String,
}

pub async fn download_script(
    State(state): State<SharedState>,
    Path(script_id): Path<String>,
    Query(auth): Query<AuthQuery>,
    headers: HeaderMap,
) -> Result<Json<DownloadResponse>, ApiError> {
    let user = current_user(&state, &headers, auth.token.as_deref())?;
    let script = state
        .store
        .get_script(&script_id)
        .ok_or(ApiError::NotFound {
            resource: "Script",
            id: script_id.clone(),
        })?;
    require_access(&state, &user.id, &script.project_id)?;

    Ok(Json(DownloadResponse {
        filename: script.filename,
        content: script.content,
    }))
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub message: String,
}

pub async fn delete_script(
    State(state): State<SharedState>,
    Path(script_id): Path<String>,
    Query(auth): Query<AuthQuery>,
    headers: HeaderMap,
) -> Result<Json<DeleteResponse>, ApiError> {
    let user = current_user(&state, &headers, auth.token.as_deref())?;
    let script = state
        .store
        .get_script(&script_id)
        .ok_or(ApiError::NotFound {
            resource: "Script",
            id: script_id.clone(),
        })?;

    let role = require_access(&state, &user.id, &script.project_id)?;
    if role != "Owner" && role != "Editor" {
        return Err(ApiError::PermissionDenied("deleting this script"));
    }

    if !state.store.delete_script(&script_id) {
        return Err(ApiError::NotFound {
            resource: "Script",
            id: script_id,
        });
    }

    Ok(Json(DeleteResponse {
        message: "Script deleted successfully".to_string(),
    }))
}

pub async fn project_scripts(
    State(state): State<SharedState>,
    Path(project_id): Path<String>,
    Query(auth): Query<AuthQuery>,
    headers: HeaderMap,
) -> Result<Json<Vec<ScriptSummary>>, ApiError> {
    let user = current_user(&state, &headers, auth.token.as_deref())?;
    require_access(&state, &user.id, &project_id)?;
    Ok(Json(state.store.get_project_scripts(&project_id)))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub query: Option<String>,
    pub project_id: Option<String>,
    pub limit: Option<usize>,
    pub token: Option<String>,
}

pub async fn search_scripts(
    State(state): State<SharedState>,
    Query(query): Query<SearchQuery>,
    headers: HeaderMap,
) -> Result<Json<Vec<ScriptSummary>>, ApiError> {
    let user = current_user(&state, &headers, query.token.as_deref())?;
    if let Some(project_id) = query.project_id.as_deref() {
        require_access(&state, &user.id, project_id)?;
    }
    Ok(Json(state.store.search_scripts(
        query.project_id.as_deref(),
        query.query.as_deref(),
        query.limit.unwrap_or(20),
    )))
}
