//! Advisory node locks.
//!
//! One state machine per (script, node): Unlocked → Locked(holder, expiry)
//! → Unlocked. Expiry is lazy; there is no background sweeper. Stale entries
//! are replaced when the node is next requested and filtered from every
//! read, so they are never reported as live.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

use crate::protocol::LockInfo;

/// Default advisory lock lifetime, in seconds.
pub const DEFAULT_LOCK_TIMEOUT_SECS: i64 = 5 * 60;

/// One live node lock.
#[derive(Debug, Clone)]
pub struct LockEntry {
    pub user_id: String,
    pub username: String,
    pub locked_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl LockEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

pub struct LockManager {
    // script_id -> node_id -> lock
    locks: HashMap<String, HashMap<String, LockEntry>>,
    timeout: Duration,
}

impl LockManager {
    pub fn new() -> Self {
        Self::with_timeout(Duration::seconds(DEFAULT_LOCK_TIMEOUT_SECS))
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            locks: HashMap::new(),
            timeout,
        }
    }

    /// Attempts to acquire the node for `user_id`. Grants on an unlocked or
    /// expired entry, and re-grants to the current holder (refreshing the
    /// expiry). A live lock held by someone else denies without mutation.
    pub fn try_lock(&mut self, script_id: &str, node_id: &str, user_id: &str, username: &str) -> bool {
        let now = Utc::now();
        let table = self.locks.entry(script_id.to_string()).or_default();

        if let Some(existing) = table.get(node_id) {
            if !existing.is_expired(now) && existing.user_id != user_id {
                return false;
            }
        }

        table.insert(
            node_id.to_string(),
            LockEntry {
                user_id: user_id.to_string(),
                username: username.to_string(),
                locked_at: now,
                expires_at: now + self.timeout,
            },
        );
        true
    }

    /// Releases the node if `user_id` holds it. A missing lock or a foreign
    /// holder is a no-op returning false.
    pub fn release(&mut self, script_id: &str, node_id: &str, user_id: &str) -> bool {
        let Some(table) = self.locks.get_mut(script_id) else {
            return false;
        };
        match table.get(node_id) {
            Some(entry) if entry.user_id == user_id => {
                table.remove(node_id);
                true
            }
            _ => false,
        }
    }

    /// The live holder of a node, if any.
    pub fn holder(&self, script_id: &str, node_id: &str) -> Option<&LockEntry> {
        let entry = self.locks.get(script_id)?.get(node_id)?;
        (!entry.is_expired(Utc::now())).then_some(entry)
    }

    /// Every live lock on a script, for the table sent to joining clients.
    pub fn script_locks(&self, script_id: &str) -> Vec<LockInfo> {
        let now = Utc::now();
        let Some(table) = self.locks.get(script_id) else {
            return Vec::new();
        };
        let mut locks: Vec<LockInfo> = table
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .map(|(node_id, entry)| LockInfo {
                node_id: node_id.clone(),
                user_id: entry.user_id.clone(),
                username: entry.username.clone(),
                locked_at: entry.locked_at.to_rfc3339(),
            })
            .collect();
        locks.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        locks
    }

    /// Removes every lock the user holds on the script and returns the freed
    /// node ids, sorted for stable broadcast payloads.
    pub fn release_all_for_user(&mut self, script_id: &str, user_id: &str) -> Vec<String> {
        let Some(table) = self.locks.get_mut(script_id) else {
            return Vec::new();
        };
        let mut freed: Vec<String> = table
            .iter()
            .filter(|(_, entry)| entry.user_id == user_id)
            .map(|(node_id, _)| node_id.clone())
            .collect();
        for node_id in &freed {
            table.remove(node_id);
        }
        if table.is_empty() {
            self.locks.remove(script_id);
        }
        freed.sort();
        freed
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}
