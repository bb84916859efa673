//! Workspace-level tests: REST handler behavior, auth resolution, socket
//! access checks and the store wiring underneath them.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::Json;

use renscript_common::identity::{TokenIdentity, User};
use renscript_common::store::{MemoryStore, ScriptStore};
use renscript_editor::{CollabEngine, ConnectionHandle};

use crate::projects;
use crate::scripts::{self, AuthQuery};
use crate::state::{current_user, ApiError, AppState, SharedState};
use crate::ws;

fn test_state() -> SharedState {
    let identity = TokenIdentity::new();
    identity.insert(
        "tok-alice",
        User {
            id: "u-alice".to_string(),
            username: "alice".to_string(),
        },
    );
    identity.insert(
        "tok-bob",
        User {
            id: "u-bob".to_string(),
            username: "bob".to_string(),
        },
    );

    Arc::new(AppState {
        engine: CollabEngine::new(),
        store: Arc::new(MemoryStore::new()),
        identity: Arc::new(identity),
    })
}

fn auth(token: &str) -> Query<AuthQuery> {
    Query(AuthQuery {
        token: Some(token.to_string()),
    })
}

fn seeded_script(state: &AppState) -> (String, String) {
    let project = state.store.create_project("Game", "u-alice").unwrap();
    let script = state
        .store
        .save_script(
            &project,
            "intro.rpy",
            "label start:\n    \"hi\"\n    jump x\n\nlabel x:\n    return",
            "u-alice",
        )
        .unwrap();
    (project, script)
}

#[tokio::test]
async fn test_parse_rejects_wrong_extension() {
    let state = test_state();
    let result = scripts::parse_script(
        State(state),
        auth("tok-alice"),
        HeaderMap::new(),
        Json(scripts::ParseRequest {
            filename: "notes.txt".to_string(),
            content: "label a:".to_string(),
            project_id: None,
        }),
    )
    .await;

    assert!(matches!(result, Err(ApiError::Validation(_))));
}

#[tokio::test]
async fn test_parse_rejects_oversized_content() {
    let state = test_state();
    let result = scripts::parse_script(
        State(state),
        auth("tok-alice"),
        HeaderMap::new(),
        Json(scripts::ParseRequest {
            filename: "big.rpy".to_string(),
            content: "x".repeat(scripts::MAX_SCRIPT_BYTES + 1),
            project_id: None,
        }),
    )
    .await;

    assert!(matches!(result, Err(ApiError::Validation(_))));
}

#[tokio::test]
async fn test_parse_creates_default_project_and_returns_tree() {
    let state = test_state();
    let Json(response) = scripts::parse_script(
        State(state.clone()),
        auth("tok-alice"),
        HeaderMap::new(),
        Json(scripts::ParseRequest {
            filename: "intro.rpy".to_string(),
            content: "label start:\n    \"hi\"\n\nlabel x:\n    return".to_string(),
            project_id: None,
        }),
    )
    .await
    .unwrap();

    assert_eq!(response.tree.children.len(), 2);
    assert_eq!(response.tree.children[0].label, "start");

    let projects = state.store.get_user_projects("u-alice");
    assert_eq!(projects.len(), 1);
    assert_eq!(projects[0].name, "Default Project");
    assert!(state.store.get_script(&response.script_id).is_some());
}

#[tokio::test]
async fn test_parse_denies_foreign_project() {
    let state = test_state();
    let project = state.store.create_project("Private", "u-alice").unwrap();

    let result = scripts::parse_script(
        State(state),
        auth("tok-bob"),
        HeaderMap::new(),
        Json(scripts::ParseRequest {
            filename: "intro.rpy".to_string(),
            content: "label a:".to_string(),
            project_id: Some(project),
        }),
    )
    .await;

    assert!(matches!(result, Err(ApiError::PermissionDenied(_))));
}

#[tokio::test]
async fn test_bearer_header_authenticates() {
    let state = test_state();
    let mut headers = HeaderMap::new();
    headers.insert(header::AUTHORIZATION, "Bearer tok-alice".parse().unwrap());

    let user = current_user(&state, &headers, None).unwrap();
    assert_eq!(user.username, "alice");

    let bad = current_user(&state, &HeaderMap::new(), Some("unknown"));
    assert!(matches!(bad, Err(ApiError::Unauthenticated)));

    let none = current_user(&state, &HeaderMap::new(), None);
    assert!(matches!(none, Err(ApiError::Unauthenticated)));
}

#[tokio::test]
async fn test_node_content_validates_range() {
    let state = test_state();
    let (_, script) = seeded_script(&state);

    let bad = scripts::node_content(
        State(state.clone()),
        Path(script.clone()),
        Query(scripts::RangeQuery {
            start_line: 4,
            end_line: 2,
            token: Some("tok-alice".to_string()),
        }),
        HeaderMap::new(),
    )
    .await;
    assert!(matches!(bad, Err(ApiError::Validation(_))));

    let out_of_bounds = scripts::node_content(
        State(state.clone()),
        Path(script.clone()),
        Query(scripts::RangeQuery {
            start_line: 0,
            end_line: 99,
            token: Some("tok-alice".to_string()),
        }),
        HeaderMap::new(),
    )
    .await;
    assert!(matches!(out_of_bounds, Err(ApiError::Validation(_))));

    let Json(ok) = scripts::node_content(
        State(state),
        Path(script),
        Query(scripts::RangeQuery {
            start_line: 1,
            end_line: 2,
            token: Some("tok-alice".to_string()),
        }),
        HeaderMap::new(),
    )
    .await
    .unwrap();
    assert_eq!(ok.content, "    \"hi\"\n    jump x");
}

#[tokio::test]
async fn test_update_node_splices_and_reports_diff() {
    let state = test_state();
    let (_, script) = seeded_script(&state);

    let Json(response) = scripts::update_node(
        State(state.clone()),
        Path(script.clone()),
        auth("tok-alice"),
        HeaderMap::new(),
        Json(scripts::UpdateNodeRequest {
            start_line: 1,
            end_line: 2,
            content: "    \"hello\"\n    \"there\"\n    jump x".to_string(),
        }),
    )
    .await
    .unwrap();

    assert_eq!(response.start_line, 1);
    assert_eq!(response.end_line, 3);
    assert_eq!(response.line_diff, 1);

    let lines = state.store.load_script_lines(&script).unwrap();
    assert_eq!(lines[1], "    \"hello\"");
    assert_eq!(lines[3], "    jump x");
    assert_eq!(lines[5], "label x:");
}

#[tokio::test]
async fn test_insert_node_reparses_tree() {
    let state = test_state();
    let (_, script) = seeded_script(&state);

    let Json(response) = scripts::insert_node(
        State(state.clone()),
        Path(script.clone()),
        auth("tok-alice"),
        HeaderMap::new(),
        Json(scripts::InsertNodeRequest {
            insertion_line: 4,
            content: "label middle:\n    \"inserted\"\n".to_string(),
        }),
    )
    .await
    .unwrap();

    assert_eq!(response.start_line, 4);
    assert_eq!(response.line_count, 2);

    let labels: Vec<&str> = response
        .tree
        .children
        .iter()
        .map(|c| c.label.as_str())
        .collect();
    assert_eq!(labels, vec!["start", "middle", "x"]);
}

#[tokio::test]
async fn test_delete_requires_editor_or_owner_role() {
    let state = test_state();
    let (project, script) = seeded_script(&state);
    state.store.grant_access(&project, "u-bob", "Viewer").unwrap();

    let denied = scripts::delete_script(
        State(state.clone()),
        Path(script.clone()),
        auth("tok-bob"),
        HeaderMap::new(),
    )
    .await;
    assert!(matches!(denied, Err(ApiError::PermissionDenied(_))));

    let allowed = scripts::delete_script(
        State(state.clone()),
        Path(script.clone()),
        auth("tok-alice"),
        HeaderMap::new(),
    )
    .await;
    assert!(allowed.is_ok());
    assert!(state.store.get_script(&script).is_none());
}

#[tokio::test]
async fn test_download_and_search() {
    let state = test_state();
    let (project, script) = seeded_script(&state);

    let Json(download) = scripts::download_script(
        State(state.clone()),
        Path(script),
        auth("tok-alice"),
        HeaderMap::new(),
    )
    .await
    .unwrap();
    assert_eq!(download.filename, "intro.rpy");
    assert!(download.content.contains("label start:"));

    let Json(found) = scripts::search_scripts(
        State(state),
        Query(scripts::SearchQuery {
            query: Some("jump x".to_string()),
            project_id: Some(project),
            limit: None,
            token: Some("tok-alice".to_string()),
        }),
        HeaderMap::new(),
    )
    .await
    .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].filename, "intro.rpy");
}

#[tokio::test]
async fn test_project_share_grants_access() {
    let state = test_state();
    let (project, _) = seeded_script(&state);

    projects::share_project(
        State(state.clone()),
        Path(project.clone()),
        auth("tok-alice"),
        HeaderMap::new(),
        Json(projects::ShareRequest {
            user_id: "u-bob".to_string(),
            role: "Editor".to_string(),
        }),
    )
    .await
    .unwrap();

    assert_eq!(
        state.store.check_access("u-bob", &project).as_deref(),
        Some("Editor")
    );
}

#[tokio::test]
async fn test_project_details_include_scripts_and_active_users() {
    let state = test_state();
    let (project, _) = seeded_script(&state);

    let Json(details) = projects::get_project(
        State(state.clone()),
        Path(project.clone()),
        auth("tok-alice"),
        HeaderMap::new(),
    )
    .await
    .unwrap();
    assert_eq!(details.scripts.len(), 1);
    assert!(details.active_users.is_empty());

    let (conn, _rx) = ConnectionHandle::channel();
    state.engine.connect_project(&conn, &project, "u-alice", "alice");

    let Json(details) = projects::get_project(
        State(state.clone()),
        Path(project),
        auth("tok-alice"),
        HeaderMap::new(),
    )
    .await
    .unwrap();
    assert_eq!(details.active_users.len(), 1);
    assert_eq!(details.active_users[0].username, "alice");
}

#[tokio::test]
async fn test_script_socket_access_close_codes() {
    let state = test_state();
    let (project, script) = seeded_script(&state);

    let no_token = ws::script_access(&state, None, &script).unwrap_err();
    assert_eq!(no_token.0, ws::CLOSE_AUTH_FAILURE);

    let bad_token = ws::script_access(&state, Some("junk"), &script).unwrap_err();
    assert_eq!(bad_token.0, ws::CLOSE_AUTH_FAILURE);

    let missing = ws::script_access(&state, Some("tok-alice"), "no-such-script").unwrap_err();
    assert_eq!(missing.0, ws::CLOSE_NOT_FOUND);

    let forbidden = ws::script_access(&state, Some("tok-bob"), &script).unwrap_err();
    assert_eq!(forbidden.0, ws::CLOSE_PERMISSION_DENIED);

    let (user, record) = ws::script_access(&state, Some("tok-alice"), &script).unwrap();
    assert_eq!(user.id, "u-alice");
    assert_eq!(record.project_id, project);
}

#[tokio::test]
async fn test_project_socket_access_close_codes() {
    let state = test_state();
    let (project, _) = seeded_script(&state);

    let unauthenticated = ws::project_access(&state, None, &project).unwrap_err();
    assert_eq!(unauthenticated.0, ws::CLOSE_AUTH_FAILURE);

    let forbidden = ws::project_access(&state, Some("tok-bob"), &project).unwrap_err();
    assert_eq!(forbidden.0, ws::CLOSE_PERMISSION_DENIED);

    let user = ws::project_access(&state, Some("tok-alice"), &project).unwrap();
    assert_eq!(user.username, "alice");
}

#[test]
fn test_api_error_status_mapping() {
    assert_eq!(
        ApiError::NotFound {
            resource: "Script",
            id: "s1".to_string()
        }
        .status(),
        StatusCode::NOT_FOUND
    );
    assert_eq!(ApiError::Unauthenticated.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        ApiError::PermissionDenied("x").status(),
        StatusCode::FORBIDDEN
    );
    assert_eq!(
        ApiError::Validation("bad".to_string()).status(),
        StatusCode::BAD_REQUEST
    );
}
