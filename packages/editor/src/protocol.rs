//! Wire protocol for the collaboration sockets.
//!
//! Every message is a JSON object with a required `type` tag. Unrecognized
//! inbound types deserialize to `ClientMessage::Unknown` and are ignored;
//! malformed envelopes are logged and dropped at the engine boundary without
//! closing the connection.
//!
//! ## Message Semantics
//!
//! ### startEditing
//! - Attempts the node lock; a live foreign lock denies without mutation
//! - Denial answers only the requester (`editConflict` with the holder)
//! - Re-acquiring one's own lock refreshes the expiry
//!
//! ### updateNode / insertNode / updateStructure
//! - Relayed to every script peer; content convergence is resolved by
//!   storage, last write wins

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Inbound client messages.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "ping")]
    Ping,

    #[serde(rename = "join", rename_all = "camelCase")]
    Join {
        script_id: String,
        user_id: String,
        user_name: String,
    },

    #[serde(rename = "leave", rename_all = "camelCase")]
    Leave { user_id: String },

    #[serde(rename = "startEditing", rename_all = "camelCase")]
    StartEditing {
        script_id: String,
        user_id: String,
        node_id: String,
    },

    #[serde(rename = "endEditing", rename_all = "camelCase")]
    EndEditing {
        script_id: String,
        user_id: String,
        node_id: String,
    },

    #[serde(rename = "updateNode", rename_all = "camelCase")]
    UpdateNode {
        script_id: String,
        user_id: String,
        node_id: String,
        content: String,
        start_line: usize,
        end_line: usize,
    },

    #[serde(rename = "insertNode", rename_all = "camelCase")]
    InsertNode {
        script_id: String,
        user_id: String,
        insertion_line: usize,
        content: String,
        node_type: String,
    },

    #[serde(rename = "updateStructure", rename_all = "camelCase")]
    UpdateStructure { script_id: String, tree: Value },

    /// Project-socket only: grant another user access to the project.
    #[serde(rename = "shareProject", rename_all = "camelCase")]
    ShareProject {
        target_user_id: String,
        role_id: String,
    },

    #[serde(other)]
    Unknown,
}

/// One entry of the `active_users` roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveUser {
    pub id: String,
    pub username: String,
    pub connected_at: String,
    pub editing_script: Option<String>,
}

/// One entry of the `node_locks` table sent to joining clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockInfo {
    pub node_id: String,
    pub user_id: String,
    pub username: String,
    pub locked_at: String,
}

/// Outbound events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "pong")]
    Pong,

    #[serde(rename = "active_users")]
    ActiveUsers { users: Vec<ActiveUser> },

    #[serde(rename = "node_locks")]
    NodeLocks { locks: Vec<LockInfo> },

    #[serde(rename = "user_joined_script")]
    UserJoinedScript {
        user_id: String,
        username: String,
        timestamp: String,
    },

    #[serde(rename = "node_locked")]
    NodeLocked {
        node_id: String,
        user_id: String,
        username: String,
        timestamp: String,
    },

    #[serde(rename = "node_unlocked")]
    NodeUnlocked {
        node_id: String,
        user_id: String,
        username: String,
        timestamp: String,
    },

    #[serde(rename = "editConflict")]
    EditConflict {
        node_id: String,
        locked_by: String,
        timestamp: String,
    },

    #[serde(rename = "node_editing")]
    NodeEditing {
        node_id: String,
        user_id: String,
        username: String,
        timestamp: String,
    },

    #[serde(rename = "node_editing_ended")]
    NodeEditingEnded {
        node_id: String,
        user_id: String,
        username: String,
        timestamp: String,
    },

    #[serde(rename = "updateNode")]
    UpdateNode {
        script_id: String,
        node_id: String,
        user_id: String,
        username: String,
        content: String,
        start_line: usize,
        end_line: usize,
        timestamp: String,
    },

    #[serde(rename = "insertNode")]
    InsertNode {
        script_id: String,
        user_id: String,
        username: String,
        insertion_line: usize,
        content: String,
        node_type: String,
        timestamp: String,
    },

    #[serde(rename = "updateStructure")]
    UpdateStructure {
        script_id: String,
        tree: Value,
        timestamp: String,
    },

    #[serde(rename = "user_left_project")]
    UserLeftProject {
        user_id: String,
        username: String,
        timestamp: String,
    },

    #[serde(rename = "user_left_script")]
    UserLeftScript {
        user_id: String,
        username: String,
        timestamp: String,
    },

    /// Batched release on disconnect: one event listing every freed node.
    #[serde(rename = "locks_released")]
    LocksReleased {
        nodes: Vec<String>,
        user_id: String,
        username: String,
        timestamp: String,
    },

    #[serde(rename = "project_shared")]
    ProjectShared {
        project_id: String,
        user_id: String,
        role_id: String,
        shared_by: String,
        timestamp: String,
    },

    #[serde(rename = "error")]
    Error { message: String },
}
