//! Event fan-out over the session registry.
//!
//! Exclusion by user resolves to that user's current session connection, so
//! excluding a user always skips their latest socket even when the
//! triggering connection is an older one.

use crate::connection::ConnectionHandle;
use crate::protocol::ServerEvent;
use crate::sessions::SessionRegistry;

/// Sends one event to one connection; transport errors are absorbed by the
/// handle.
pub fn send_to(conn: &ConnectionHandle, event: &ServerEvent) {
    conn.send(event);
}

/// Sends to every connection registered for the project, minus exclusions.
/// A project with no connections is a silent no-op.
pub fn broadcast_to_project(
    registry: &SessionRegistry,
    project_id: &str,
    event: &ServerEvent,
    exclude_conn: Option<u64>,
    exclude_user: Option<&str>,
) {
    let Some(conns) = registry.project_connections.get(project_id) else {
        return;
    };
    fan_out(registry, conns, event, exclude_conn, exclude_user);
}

/// Same, scoped to the script's subscribers.
pub fn broadcast_to_script(
    registry: &SessionRegistry,
    script_id: &str,
    event: &ServerEvent,
    exclude_conn: Option<u64>,
    exclude_user: Option<&str>,
) {
    let Some(conns) = registry.script_connections.get(script_id) else {
        return;
    };
    fan_out(registry, conns, event, exclude_conn, exclude_user);
}

fn fan_out(
    registry: &SessionRegistry,
    conns: &[ConnectionHandle],
    event: &ServerEvent,
    exclude_conn: Option<u64>,
    exclude_user: Option<&str>,
) {
    let excluded_user_conn = exclude_user
        .and_then(|user_id| registry.sessions.get(user_id))
        .map(|session| session.conn.id());

    for conn in conns {
        if Some(conn.id()) == exclude_conn || Some(conn.id()) == excluded_user_conn {
            continue;
        }
        conn.send(event);
    }
}
