//! Collaboration engine.
//!
//! `CollabEngine` is an explicit context object: one instance per server,
//! constructed at startup and injected into the transport handlers. All
//! mutable state (session registry + lock table) sits behind a single mutex,
//! and every inbound message runs to completion under it, so a message's
//! state changes and broadcast enqueues are atomic with respect to every
//! other connection. Enqueues are non-blocking, which keeps holding the lock
//! across them safe.

use std::sync::Mutex;

use chrono::Utc;
use serde_json::Value;

use crate::broadcast::{broadcast_to_project, broadcast_to_script, send_to};
use crate::connection::ConnectionHandle;
use crate::locks::LockManager;
use crate::protocol::{ActiveUser, ClientMessage, LockInfo, ServerEvent};
use crate::sessions::{Session, SessionRegistry};

fn now() -> String {
    Utc::now().to_rfc3339()
}

struct EngineState {
    registry: SessionRegistry,
    locks: LockManager,
}

pub struct CollabEngine {
    state: Mutex<EngineState>,
}

impl CollabEngine {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(EngineState {
                registry: SessionRegistry::new(),
                locks: LockManager::new(),
            }),
        }
    }

    /// Engine with a custom lock lifetime, mainly for tests.
    pub fn with_lock_timeout(timeout: chrono::Duration) -> Self {
        Self {
            state: Mutex::new(EngineState {
                registry: SessionRegistry::new(),
                locks: LockManager::with_timeout(timeout),
            }),
        }
    }

    pub fn connect_project(
        &self,
        conn: &ConnectionHandle,
        project_id: &str,
        user_id: &str,
        username: &str,
    ) {
        self.state
            .lock()
            .unwrap()
            .connect_project(conn, project_id, user_id, username);
    }

    pub fn connect_script(
        &self,
        conn: &ConnectionHandle,
        script_id: &str,
        user_id: &str,
        username: &str,
    ) {
        self.state
            .lock()
            .unwrap()
            .connect_script(conn, script_id, user_id, username);
    }

    /// Tries to take the node lock; returns whether it was granted.
    pub fn lock_node(&self, script_id: &str, node_id: &str, user_id: &str, username: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .lock_node(script_id, node_id, user_id, username)
    }

    /// Releases the node lock if the caller holds it.
    pub fn release_node_lock(
        &self,
        script_id: &str,
        node_id: &str,
        user_id: &str,
        username: &str,
    ) -> bool {
        self.state
            .lock()
            .unwrap()
            .release_node_lock(script_id, node_id, user_id, username)
    }

    /// Handles one raw inbound frame from a script socket.
    pub fn handle_message(&self, conn: &ConnectionHandle, raw: &str) {
        self.state.lock().unwrap().handle_message(conn, raw);
    }

    /// Full cleanup for a departing connection; safe to call more than once.
    pub fn disconnect(&self, conn: &ConnectionHandle, user_id: Option<&str>) {
        self.state.lock().unwrap().disconnect(conn, user_id);
    }

    /// Fan-out of an externally produced event to a project's peers.
    pub fn broadcast_project(&self, project_id: &str, event: &ServerEvent) {
        let state = self.state.lock().unwrap();
        broadcast_to_project(&state.registry, project_id, event, None, None);
    }

    /// Fan-out of an externally produced event to a script's peers.
    pub fn broadcast_script(&self, script_id: &str, event: &ServerEvent) {
        let state = self.state.lock().unwrap();
        broadcast_to_script(&state.registry, script_id, event, None, None);
    }

    pub fn active_project_users(&self, project_id: &str) -> Vec<ActiveUser> {
        self.state
            .lock()
            .unwrap()
            .registry
            .active_project_users(project_id)
    }

    pub fn script_locks(&self, script_id: &str) -> Vec<LockInfo> {
        self.state.lock().unwrap().locks.script_locks(script_id)
    }
}

impl Default for CollabEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineState {
    fn connect_project(
        &mut self,
        conn: &ConnectionHandle,
        project_id: &str,
        user_id: &str,
        username: &str,
    ) {
        self.registry.add_project_connection(project_id, conn.clone());
        self.registry.sessions.insert(
            user_id.to_string(),
            Session {
                user_id: user_id.to_string(),
                username: username.to_string(),
                project_id: Some(project_id.to_string()),
                script_id: None,
                conn: conn.clone(),
                connected_at: now(),
            },
        );

        // Every join changes the roster for everyone: the new connection
        // gets the list, and so does every previously connected peer.
        let users = self.registry.active_project_users(project_id);
        let event = ServerEvent::ActiveUsers { users };
        send_to(conn, &event);
        broadcast_to_project(&self.registry, project_id, &event, Some(conn.id()), None);

        tracing::info!(user = username, project = project_id, "connected to project");
    }

    fn connect_script(
        &mut self,
        conn: &ConnectionHandle,
        script_id: &str,
        user_id: &str,
        username: &str,
    ) {
        self.registry.add_script_connection(script_id, conn.clone());

        match self.registry.sessions.get_mut(user_id) {
            Some(session) => {
                session.script_id = Some(script_id.to_string());
                session.conn = conn.clone();
                session.username = username.to_string();
            }
            None => {
                self.registry.sessions.insert(
                    user_id.to_string(),
                    Session {
                        user_id: user_id.to_string(),
                        username: username.to_string(),
                        project_id: None,
                        script_id: Some(script_id.to_string()),
                        conn: conn.clone(),
                        connected_at: now(),
                    },
                );
            }
        }

        broadcast_to_script(
            &self.registry,
            script_id,
            &ServerEvent::UserJoinedScript {
                user_id: user_id.to_string(),
                username: username.to_string(),
                timestamp: now(),
            },
            Some(conn.id()),
            None,
        );

        tracing::info!(user = username, script = script_id, "connected to script");

        // The newcomer needs the current lock table to grey out busy nodes.
        let locks = self.locks.script_locks(script_id);
        send_to(conn, &ServerEvent::NodeLocks { locks });
    }

    fn lock_node(&mut self, script_id: &str, node_id: &str, user_id: &str, username: &str) -> bool {
        if !self.locks.try_lock(script_id, node_id, user_id, username) {
            return false;
        }
        broadcast_to_script(
            &self.registry,
            script_id,
            &ServerEvent::NodeLocked {
                node_id: node_id.to_string(),
                user_id: user_id.to_string(),
                username: username.to_string(),
                timestamp: now(),
            },
            None,
            None,
        );
        true
    }

    fn release_node_lock(
        &mut self,
        script_id: &str,
        node_id: &str,
        user_id: &str,
        username: &str,
    ) -> bool {
        if !self.locks.release(script_id, node_id, user_id) {
            return false;
        }
        broadcast_to_script(
            &self.registry,
            script_id,
            &ServerEvent::NodeUnlocked {
                node_id: node_id.to_string(),
                user_id: user_id.to_string(),
                username: username.to_string(),
                timestamp: now(),
            },
            None,
            None,
        );
        true
    }

    fn notify_edit(&self, script_id: &str, node_id: &str, user_id: &str, username: &str) {
        broadcast_to_script(
            &self.registry,
            script_id,
            &ServerEvent::NodeEditing {
                node_id: node_id.to_string(),
                user_id: user_id.to_string(),
                username: username.to_string(),
                timestamp: now(),
            },
            None,
            Some(user_id),
        );
    }

    fn notify_edit_end(&self, script_id: &str, node_id: &str, user_id: &str) {
        let username = self.username_for(user_id);
        broadcast_to_script(
            &self.registry,
            script_id,
            &ServerEvent::NodeEditingEnded {
                node_id: node_id.to_string(),
                user_id: user_id.to_string(),
                username,
                timestamp: now(),
            },
            None,
            Some(user_id),
        );
    }

    fn handle_message(&mut self, conn: &ConnectionHandle, raw: &str) {
        let message: ClientMessage = match serde_json::from_str(raw) {
            Ok(message) => message,
            Err(err) => {
                tracing::warn!(error = %err, "dropping malformed message");
                return;
            }
        };

        match message {
            ClientMessage::Ping => send_to(conn, &ServerEvent::Pong),

            ClientMessage::Join {
                script_id,
                user_id,
                user_name,
            } => self.connect_script(conn, &script_id, &user_id, &user_name),

            ClientMessage::Leave { user_id } => self.disconnect(conn, Some(&user_id)),

            ClientMessage::StartEditing {
                script_id,
                user_id,
                node_id,
            } => {
                let username = self.username_for(&user_id);
                if self.lock_node(&script_id, &node_id, &user_id, &username) {
                    self.notify_edit(&script_id, &node_id, &user_id, &username);
                } else {
                    let locked_by = self
                        .locks
                        .holder(&script_id, &node_id)
                        .map(|entry| entry.username.clone())
                        .unwrap_or_else(|| "Unknown".to_string());
                    send_to(
                        conn,
                        &ServerEvent::EditConflict {
                            node_id,
                            locked_by,
                            timestamp: now(),
                        },
                    );
                }
            }

            ClientMessage::EndEditing {
                script_id,
                user_id,
                node_id,
            } => {
                let username = self.username_for(&user_id);
                if self.release_node_lock(&script_id, &node_id, &user_id, &username) {
                    self.notify_edit_end(&script_id, &node_id, &user_id);
                }
            }

            ClientMessage::UpdateNode {
                script_id,
                user_id,
                node_id,
                content,
                start_line,
                end_line,
            } => {
                let username = self.username_for(&user_id);
                broadcast_to_script(
                    &self.registry,
                    &script_id,
                    &ServerEvent::UpdateNode {
                        script_id: script_id.clone(),
                        node_id,
                        user_id,
                        username,
                        content,
                        start_line,
                        end_line,
                        timestamp: now(),
                    },
                    None,
                    None,
                );
            }

            ClientMessage::InsertNode {
                script_id,
                user_id,
                insertion_line,
                content,
                node_type,
            } => {
                let username = self.username_for(&user_id);
                broadcast_to_script(
                    &self.registry,
                    &script_id,
                    &ServerEvent::InsertNode {
                        script_id: script_id.clone(),
                        user_id,
                        username,
                        insertion_line,
                        content,
                        node_type,
                        timestamp: now(),
                    },
                    None,
                    None,
                );
            }

            ClientMessage::UpdateStructure { script_id, tree } => {
                self.broadcast_structure_update(&script_id, tree);
            }

            // Project-socket concern; the script path has no store access.
            ClientMessage::ShareProject { .. } => {}

            ClientMessage::Unknown => {
                tracing::debug!("ignoring unrecognized message type");
            }
        }
    }

    fn broadcast_structure_update(&self, script_id: &str, tree: Value) {
        broadcast_to_script(
            &self.registry,
            script_id,
            &ServerEvent::UpdateStructure {
                script_id: script_id.to_string(),
                tree,
                timestamp: now(),
            },
            None,
            None,
        );
    }

    fn disconnect(&mut self, conn: &ConnectionHandle, user_id: Option<&str>) {
        let resolved = user_id
            .map(str::to_string)
            .or_else(|| self.registry.user_for_connection(conn.id()));

        let Some(user_id) = resolved else {
            self.registry.remove_connection_everywhere(conn.id());
            return;
        };
        let Some(session) = self.registry.sessions.get(&user_id).cloned() else {
            // Already disconnected; just scrub the connection.
            self.registry.remove_connection_everywhere(conn.id());
            return;
        };

        if let Some(project_id) = session.project_id.as_deref() {
            if self.registry.remove_project_connection(project_id, conn.id()) {
                broadcast_to_project(
                    &self.registry,
                    project_id,
                    &ServerEvent::UserLeftProject {
                        user_id: user_id.clone(),
                        username: session.username.clone(),
                        timestamp: now(),
                    },
                    None,
                    None,
                );
            }
        }

        if let Some(script_id) = session.script_id.as_deref() {
            if self.registry.remove_script_connection(script_id, conn.id()) {
                broadcast_to_script(
                    &self.registry,
                    script_id,
                    &ServerEvent::UserLeftScript {
                        user_id: user_id.clone(),
                        username: session.username.clone(),
                        timestamp: now(),
                    },
                    None,
                    None,
                );
            }

            // Cascading release: one batched event for all freed nodes.
            let freed = self.locks.release_all_for_user(script_id, &user_id);
            if !freed.is_empty() {
                broadcast_to_script(
                    &self.registry,
                    script_id,
                    &ServerEvent::LocksReleased {
                        nodes: freed,
                        user_id: user_id.clone(),
                        username: session.username.clone(),
                        timestamp: now(),
                    },
                    None,
                    None,
                );
            }
        }

        self.registry.sessions.remove(&user_id);
        tracing::info!(user = %user_id, "disconnected");
    }

    fn username_for(&self, user_id: &str) -> String {
        self.registry
            .sessions
            .get(user_id)
            .map(|session| session.username.clone())
            .unwrap_or_else(|| "Unknown".to_string())
    }
}
