//! Persistence boundary.
//!
//! The collaboration core and the HTTP surface consume storage through the
//! `ScriptStore` trait; the SQL engine, schema and caching that back it in
//! production are external. `MemoryStore` is the in-process implementation
//! used by tests and the dev server.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::Serialize;
use thiserror::Error;

pub const DEFAULT_PROJECT_NAME: &str = "Default Project";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectSummary {
    pub id: String,
    pub name: String,
    pub role: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScriptRecord {
    pub id: String,
    pub project_id: String,
    pub filename: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScriptSummary {
    pub id: String,
    pub project_id: String,
    pub filename: String,
}

pub trait ScriptStore: Send + Sync {
    fn create_project(&self, name: &str, owner_id: &str) -> StoreResult<String>;

    /// Finds the caller's default project, creating it on first use.
    fn create_default_project(&self, owner_id: &str) -> StoreResult<String>;

    fn get_user_projects(&self, user_id: &str) -> Vec<ProjectSummary>;

    /// The caller's role in the project, or `None` without access.
    fn check_access(&self, user_id: &str, project_id: &str) -> Option<String>;

    fn grant_access(&self, project_id: &str, user_id: &str, role: &str) -> StoreResult<()>;

    fn save_script(
        &self,
        project_id: &str,
        filename: &str,
        content: &str,
        user_id: &str,
    ) -> StoreResult<String>;

    fn get_script(&self, script_id: &str) -> Option<ScriptRecord>;

    fn load_script_lines(&self, script_id: &str) -> StoreResult<Vec<String>>;

    /// Replaces the script content. Last write wins; node-level exclusivity
    /// is the lock manager's concern, not the store's.
    fn save_script_content(&self, script_id: &str, content: &str, editor_id: &str)
        -> StoreResult<()>;

    fn delete_script(&self, script_id: &str) -> bool;

    fn get_project_scripts(&self, project_id: &str) -> Vec<ScriptSummary>;

    fn search_scripts(
        &self,
        project_id: Option<&str>,
        query: Option<&str>,
        limit: usize,
    ) -> Vec<ScriptSummary>;
}

#[derive(Debug, Clone)]
struct ProjectRow {
    name: String,
    owner_id: String,
}

#[derive(Debug, Clone)]
struct ScriptRow {
    project_id: String,
    filename: String,
    content: String,
}

#[derive(Default)]
struct StoreState {
    projects: HashMap<String, ProjectRow>,
    // project_id -> user_id -> role
    access: HashMap<String, HashMap<String, String>>,
    scripts: HashMap<String, ScriptRow>,
}

/// In-memory `ScriptStore` implementation.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
    counter: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self, prefix: &str) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}-{}", prefix, n)
    }
}

impl ScriptStore for MemoryStore {
    fn create_project(&self, name: &str, owner_id: &str) -> StoreResult<String> {
        let id = self.next_id("proj");
        let mut state = self.state.lock().unwrap();
        state.projects.insert(
            id.clone(),
            ProjectRow {
                name: name.to_string(),
                owner_id: owner_id.to_string(),
            },
        );
        state
            .access
            .entry(id.clone())
            .or_default()
            .insert(owner_id.to_string(), "Owner".to_string());
        Ok(id)
    }

    fn create_default_project(&self, owner_id: &str) -> StoreResult<String> {
        let existing = {
            let state = self.state.lock().unwrap();
            state
                .projects
                .iter()
                .filter(|(id, row)| {
                    row.name == DEFAULT_PROJECT_NAME
                        && state
                            .access
                            .get(*id)
                            .is_some_and(|users| users.contains_key(owner_id))
                })
                .map(|(id, _)| id.clone())
                .min()
        };
        match existing {
            Some(id) => Ok(id),
            None => self.create_project(DEFAULT_PROJECT_NAME, owner_id),
        }
    }

    fn get_user_projects(&self, user_id: &str) -> Vec<ProjectSummary> {
        let state = self.state.lock().unwrap();
        let mut projects: Vec<ProjectSummary> = state
            .projects
            .iter()
            .filter_map(|(id, row)| {
                let role = state.access.get(id)?.get(user_id)?.clone();
                Some(ProjectSummary {
                    id: id.clone(),
                    name: row.name.clone(),
                    role,
                })
            })
            .collect();
        projects.sort_by(|a, b| a.id.cmp(&b.id));
        projects
    }

    fn check_access(&self, user_id: &str, project_id: &str) -> Option<String> {
        let state = self.state.lock().unwrap();
        state.access.get(project_id)?.get(user_id).cloned()
    }

    fn grant_access(&self, project_id: &str, user_id: &str, role: &str) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        if !state.projects.contains_key(project_id) {
            return Err(StoreError::NotFound {
                kind: "Project",
                id: project_id.to_string(),
            });
        }
        state
            .access
            .entry(project_id.to_string())
            .or_default()
            .insert(user_id.to_string(), role.to_string());
        Ok(())
    }

    fn save_script(
        &self,
        project_id: &str,
        filename: &str,
        content: &str,
        _user_id: &str,
    ) -> StoreResult<String> {
        let id = self.next_id("scr");
        let mut state = self.state.lock().unwrap();
        if !state.projects.contains_key(project_id) {
            return Err(StoreError::NotFound {
                kind: "Project",
                id: project_id.to_string(),
            });
        }
        state.scripts.insert(
            id.clone(),
            ScriptRow {
                project_id: project_id.to_string(),
                filename: filename.to_string(),
                content: content.to_string(),
            },
        );
        Ok(id)
    }

    fn get_script(&self, script_id: &str) -> Option<ScriptRecord> {
        let state = self.state.lock().unwrap();
        state.scripts.get(script_id).map(|row| ScriptRecord {
            id: script_id.to_string(),
            project_id: row.project_id.clone(),
            filename: row.filename.clone(),
            content: row.content.clone(),
        })
    }

    fn load_script_lines(&self, script_id: &str) -> StoreResult<Vec<String>> {
        let state = self.state.lock().unwrap();
        let row = state.scripts.get(script_id).ok_or_else(|| StoreError::NotFound {
            kind: "Script",
            id: script_id.to_string(),
        })?;
        Ok(row.content.lines().map(str::to_string).collect())
    }

    fn save_script_content(
        &self,
        script_id: &str,
        content: &str,
        _editor_id: &str,
    ) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        let row = state
            .scripts
            .get_mut(script_id)
            .ok_or_else(|| StoreError::NotFound {
                kind: "Script",
                id: script_id.to_string(),
            })?;
        row.content = content.to_string();
        Ok(())
    }

    fn delete_script(&self, script_id: &str) -> bool {
        self.state.lock().unwrap().scripts.remove(script_id).is_some()
    }

    fn get_project_scripts(&self, project_id: &str) -> Vec<ScriptSummary> {
        let state = self.state.lock().unwrap();
        let mut scripts: Vec<ScriptSummary> = state
            .scripts
            .iter()
            .filter(|(_, row)| row.project_id == project_id)
            .map(|(id, row)| ScriptSummary {
                id: id.clone(),
                project_id: row.project_id.clone(),
                filename: row.filename.clone(),
            })
            .collect();
        scripts.sort_by(|a, b| a.id.cmp(&b.id));
        scripts
    }

    fn search_scripts(
        &self,
        project_id: Option<&str>,
        query: Option<&str>,
        limit: usize,
    ) -> Vec<ScriptSummary> {
        let state = self.state.lock().unwrap();
        let mut matches: Vec<ScriptSummary> = state
            .scripts
            .iter()
            .filter(|(_, row)| project_id.map_or(true, |p| row.project_id == p))
            .filter(|(_, row)| {
                query.map_or(true, |q| row.filename.contains(q) || row.content.contains(q))
            })
            .map(|(id, row)| ScriptSummary {
                id: id.clone(),
                project_id: row.project_id.clone(),
                filename: row.filename.clone(),
            })
            .collect();
        matches.sort_by(|a, b| a.id.cmp(&b.id));
        matches.truncate(limit);
        matches
    }
}
