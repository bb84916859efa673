//! Session registry: who is connected, and to what.
//!
//! Plain maps with no interior locking. The registry is only reached through
//! the engine, which serializes all access behind its own lock; it is not
//! safe for unsynchronized concurrent use.

use std::collections::HashMap;

use crate::connection::ConnectionHandle;
use crate::protocol::ActiveUser;

/// One user's live editing context. Reconnecting overwrites the connection
/// handle; a user has a single active device at a time.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: String,
    pub username: String,
    pub project_id: Option<String>,
    pub script_id: Option<String>,
    pub conn: ConnectionHandle,
    pub connected_at: String,
}

#[derive(Default)]
pub struct SessionRegistry {
    pub(crate) project_connections: HashMap<String, Vec<ConnectionHandle>>,
    pub(crate) script_connections: HashMap<String, Vec<ConnectionHandle>>,
    pub(crate) sessions: HashMap<String, Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_project_connection(&mut self, project_id: &str, conn: ConnectionHandle) {
        let conns = self
            .project_connections
            .entry(project_id.to_string())
            .or_default();
        if !conns.contains(&conn) {
            conns.push(conn);
        }
    }

    pub fn add_script_connection(&mut self, script_id: &str, conn: ConnectionHandle) {
        let conns = self
            .script_connections
            .entry(script_id.to_string())
            .or_default();
        if !conns.contains(&conn) {
            conns.push(conn);
        }
    }

    /// Removes the connection from the project's set. Returns whether it was
    /// present; empty sets are dropped.
    pub fn remove_project_connection(&mut self, project_id: &str, conn_id: u64) -> bool {
        let Some(conns) = self.project_connections.get_mut(project_id) else {
            return false;
        };
        let before = conns.len();
        conns.retain(|c| c.id() != conn_id);
        let removed = conns.len() != before;
        if conns.is_empty() {
            self.project_connections.remove(project_id);
        }
        removed
    }

    pub fn remove_script_connection(&mut self, script_id: &str, conn_id: u64) -> bool {
        let Some(conns) = self.script_connections.get_mut(script_id) else {
            return false;
        };
        let before = conns.len();
        conns.retain(|c| c.id() != conn_id);
        let removed = conns.len() != before;
        if conns.is_empty() {
            self.script_connections.remove(script_id);
        }
        removed
    }

    /// Scrubs a connection out of every set it appears in. Used when a
    /// disconnect arrives for a connection with no resolvable session.
    pub fn remove_connection_everywhere(&mut self, conn_id: u64) {
        self.project_connections.retain(|_, conns| {
            conns.retain(|c| c.id() != conn_id);
            !conns.is_empty()
        });
        self.script_connections.retain(|_, conns| {
            conns.retain(|c| c.id() != conn_id);
            !conns.is_empty()
        });
    }

    /// Resolves a user id from a connection by scanning sessions.
    pub fn user_for_connection(&self, conn_id: u64) -> Option<String> {
        self.sessions
            .values()
            .find(|s| s.conn.id() == conn_id)
            .map(|s| s.user_id.clone())
    }

    /// The roster of users whose session points at the project.
    pub fn active_project_users(&self, project_id: &str) -> Vec<ActiveUser> {
        let mut users: Vec<ActiveUser> = self
            .sessions
            .values()
            .filter(|s| s.project_id.as_deref() == Some(project_id))
            .map(|s| ActiveUser {
                id: s.user_id.clone(),
                username: s.username.clone(),
                connected_at: s.connected_at.clone(),
                editing_script: s.script_id.clone(),
            })
            .collect();
        users.sort_by(|a, b| a.id.cmp(&b.id));
        users
    }
}
