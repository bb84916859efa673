//! Engine-level tests: connection lifecycle, lock semantics, broadcast
//! routing and the message dispatch contract.

use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::connection::ConnectionHandle;
use crate::engine::CollabEngine;

fn drain(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<Value> {
    let mut events = Vec::new();
    while let Ok(payload) = rx.try_recv() {
        events.push(serde_json::from_str(&payload).unwrap());
    }
    events
}

fn events_of_type<'a>(events: &'a [Value], kind: &str) -> Vec<&'a Value> {
    events.iter().filter(|e| e["type"] == kind).collect()
}

#[test]
fn test_lock_contention_sequence() {
    let engine = CollabEngine::new();

    assert!(engine.lock_node("s1", "n1", "u1", "alice"));
    assert!(!engine.lock_node("s1", "n1", "u2", "bob"));
    assert!(!engine.release_node_lock("s1", "n1", "u2", "bob"));
    assert!(engine.release_node_lock("s1", "n1", "u1", "alice"));
    assert!(engine.lock_node("s1", "n1", "u2", "bob"));
}

#[test]
fn test_reentrant_lock_still_broadcasts() {
    let engine = CollabEngine::new();
    let (conn, mut rx) = ConnectionHandle::channel();
    engine.connect_script(&conn, "s1", "u1", "alice");
    drain(&mut rx);

    assert!(engine.lock_node("s1", "n1", "u1", "alice"));
    assert!(engine.lock_node("s1", "n1", "u1", "alice"));

    let events = drain(&mut rx);
    assert_eq!(events_of_type(&events, "node_locked").len(), 2);
}

#[test]
fn test_denied_lock_does_not_broadcast() {
    let engine = CollabEngine::new();
    let (conn, mut rx) = ConnectionHandle::channel();
    engine.connect_script(&conn, "s1", "u1", "alice");
    engine.lock_node("s1", "n1", "u1", "alice");
    drain(&mut rx);

    assert!(!engine.lock_node("s1", "n1", "u2", "bob"));
    assert!(drain(&mut rx).is_empty());
}

#[test]
fn test_expired_locks_are_invisible_and_regrantable() {
    let engine = CollabEngine::with_lock_timeout(chrono::Duration::zero());

    assert!(engine.lock_node("s1", "n1", "u1", "alice"));
    assert!(engine.script_locks("s1").is_empty());
    assert!(engine.lock_node("s1", "n1", "u2", "bob"));
}

#[test]
fn test_project_join_rebroadcasts_roster_to_existing_peers() {
    let engine = CollabEngine::new();
    let (conn_a, mut rx_a) = ConnectionHandle::channel();
    let (conn_b, mut rx_b) = ConnectionHandle::channel();

    engine.connect_project(&conn_a, "p1", "u1", "alice");
    let events = drain(&mut rx_a);
    assert_eq!(events_of_type(&events, "active_users").len(), 1);
    assert_eq!(events[0]["users"].as_array().unwrap().len(), 1);

    engine.connect_project(&conn_b, "p1", "u2", "bob");

    // Both the newcomer and the existing peer see the updated roster.
    let events_b = drain(&mut rx_b);
    assert_eq!(events_b[0]["type"], "active_users");
    assert_eq!(events_b[0]["users"].as_array().unwrap().len(), 2);

    let events_a = drain(&mut rx_a);
    assert_eq!(events_a[0]["type"], "active_users");
    assert_eq!(events_a[0]["users"].as_array().unwrap().len(), 2);
}

#[test]
fn test_script_join_notifies_peers_and_sends_lock_table() {
    let engine = CollabEngine::new();
    let (conn_a, mut rx_a) = ConnectionHandle::channel();
    let (conn_b, mut rx_b) = ConnectionHandle::channel();

    engine.connect_script(&conn_a, "s1", "u1", "alice");
    engine.lock_node("s1", "n1", "u1", "alice");
    drain(&mut rx_a);

    engine.connect_script(&conn_b, "s1", "u2", "bob");

    // Existing peer hears about the join; the newcomer does not.
    let events_a = drain(&mut rx_a);
    let joins = events_of_type(&events_a, "user_joined_script");
    assert_eq!(joins.len(), 1);
    assert_eq!(joins[0]["user_id"], "u2");

    // The newcomer receives the live lock table.
    let events_b = drain(&mut rx_b);
    assert!(events_of_type(&events_b, "user_joined_script").is_empty());
    let locks = events_of_type(&events_b, "node_locks");
    assert_eq!(locks.len(), 1);
    assert_eq!(locks[0]["locks"][0]["node_id"], "n1");
    assert_eq!(locks[0]["locks"][0]["username"], "alice");
}

#[test]
fn test_start_editing_grants_lock_and_notifies_others() {
    let engine = CollabEngine::new();
    let (conn_a, mut rx_a) = ConnectionHandle::channel();
    let (conn_b, mut rx_b) = ConnectionHandle::channel();
    engine.connect_script(&conn_a, "s1", "u1", "alice");
    engine.connect_script(&conn_b, "s1", "u2", "bob");
    drain(&mut rx_a);
    drain(&mut rx_b);

    engine.handle_message(
        &conn_b,
        &json!({"type": "startEditing", "scriptId": "s1", "userId": "u2", "nodeId": "n1"})
            .to_string(),
    );

    // Everyone sees the lock; only the other peer sees the editing notice.
    let events_a = drain(&mut rx_a);
    assert_eq!(events_of_type(&events_a, "node_locked").len(), 1);
    assert_eq!(events_of_type(&events_a, "node_editing").len(), 1);

    let events_b = drain(&mut rx_b);
    assert_eq!(events_of_type(&events_b, "node_locked").len(), 1);
    assert!(events_of_type(&events_b, "node_editing").is_empty());
}

#[test]
fn test_edit_conflict_answers_only_the_requester() {
    let engine = CollabEngine::new();
    let (conn_a, mut rx_a) = ConnectionHandle::channel();
    let (conn_b, mut rx_b) = ConnectionHandle::channel();
    engine.connect_script(&conn_a, "s1", "u1", "alice");
    engine.connect_script(&conn_b, "s1", "u2", "bob");
    engine.lock_node("s1", "n1", "u1", "alice");
    drain(&mut rx_a);
    drain(&mut rx_b);

    engine.handle_message(
        &conn_b,
        &json!({"type": "startEditing", "scriptId": "s1", "userId": "u2", "nodeId": "n1"})
            .to_string(),
    );

    let events_b = drain(&mut rx_b);
    let conflicts = events_of_type(&events_b, "editConflict");
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0]["locked_by"], "alice");
    assert_eq!(conflicts[0]["node_id"], "n1");

    assert!(drain(&mut rx_a).is_empty());
}

#[test]
fn test_end_editing_releases_and_notifies() {
    let engine = CollabEngine::new();
    let (conn_a, mut rx_a) = ConnectionHandle::channel();
    let (conn_b, mut rx_b) = ConnectionHandle::channel();
    engine.connect_script(&conn_a, "s1", "u1", "alice");
    engine.connect_script(&conn_b, "s1", "u2", "bob");
    engine.lock_node("s1", "n1", "u1", "alice");
    drain(&mut rx_a);
    drain(&mut rx_b);

    engine.handle_message(
        &conn_a,
        &json!({"type": "endEditing", "scriptId": "s1", "userId": "u1", "nodeId": "n1"})
            .to_string(),
    );

    let events_b = drain(&mut rx_b);
    assert_eq!(events_of_type(&events_b, "node_unlocked").len(), 1);
    assert_eq!(events_of_type(&events_b, "node_editing_ended").len(), 1);

    // The releasing user sees the unlock but not the editing-ended notice.
    let events_a = drain(&mut rx_a);
    assert_eq!(events_of_type(&events_a, "node_unlocked").len(), 1);
    assert!(events_of_type(&events_a, "node_editing_ended").is_empty());
}

#[test]
fn test_disconnect_releases_all_locks_in_one_batched_event() {
    let engine = CollabEngine::new();
    let (conn_a, mut rx_a) = ConnectionHandle::channel();
    let (conn_b, mut rx_b) = ConnectionHandle::channel();
    engine.connect_script(&conn_a, "s1", "u1", "alice");
    engine.connect_script(&conn_b, "s1", "u2", "bob");
    engine.lock_node("s1", "n1", "u1", "alice");
    engine.lock_node("s1", "n2", "u1", "alice");
    drain(&mut rx_a);
    drain(&mut rx_b);

    engine.disconnect(&conn_a, Some("u1"));

    let events_b = drain(&mut rx_b);
    assert_eq!(events_of_type(&events_b, "user_left_script").len(), 1);

    let released = events_of_type(&events_b, "locks_released");
    assert_eq!(released.len(), 1);
    let nodes = released[0]["nodes"].as_array().unwrap();
    assert_eq!(nodes, &vec![json!("n1"), json!("n2")]);

    // Both nodes are free again.
    assert!(engine.lock_node("s1", "n1", "u2", "bob"));
    assert!(engine.lock_node("s1", "n2", "u2", "bob"));
}

#[test]
fn test_duplicate_disconnect_is_a_noop() {
    let engine = CollabEngine::new();
    let (conn_a, mut rx_a) = ConnectionHandle::channel();
    let (conn_b, mut rx_b) = ConnectionHandle::channel();
    engine.connect_script(&conn_a, "s1", "u1", "alice");
    engine.connect_script(&conn_b, "s1", "u2", "bob");
    drain(&mut rx_a);
    drain(&mut rx_b);

    engine.disconnect(&conn_a, Some("u1"));
    drain(&mut rx_b);

    engine.disconnect(&conn_a, Some("u1"));
    assert!(drain(&mut rx_b).is_empty());
}

#[test]
fn test_disconnect_resolves_user_from_connection() {
    let engine = CollabEngine::new();
    let (conn_a, mut rx_a) = ConnectionHandle::channel();
    let (conn_b, mut rx_b) = ConnectionHandle::channel();
    engine.connect_script(&conn_a, "s1", "u1", "alice");
    engine.connect_script(&conn_b, "s1", "u2", "bob");
    drain(&mut rx_a);
    drain(&mut rx_b);

    // No user id given; the engine scans sessions for the connection.
    engine.disconnect(&conn_a, None);

    let events_b = drain(&mut rx_b);
    let left = events_of_type(&events_b, "user_left_script");
    assert_eq!(left.len(), 1);
    assert_eq!(left[0]["user_id"], "u1");
}

#[test]
fn test_user_exclusion_targets_the_latest_socket() {
    let engine = CollabEngine::new();
    let (conn_a, mut rx_a) = ConnectionHandle::channel();
    let (conn_b, mut rx_b) = ConnectionHandle::channel();
    let (conn_c, mut rx_c) = ConnectionHandle::channel();

    engine.connect_script(&conn_a, "s1", "u1", "alice");
    engine.connect_script(&conn_b, "s1", "u2", "bob");
    // Bob reconnects on a new socket; the session now points at conn_c.
    engine.connect_script(&conn_c, "s1", "u2", "bob");
    drain(&mut rx_a);
    drain(&mut rx_b);
    drain(&mut rx_c);

    engine.handle_message(
        &conn_c,
        &json!({"type": "startEditing", "scriptId": "s1", "userId": "u2", "nodeId": "n1"})
            .to_string(),
    );

    // The editing notice excludes bob's current socket only; his stale
    // socket is still subscribed and hears it.
    assert!(events_of_type(&drain(&mut rx_c), "node_editing").is_empty());
    assert_eq!(events_of_type(&drain(&mut rx_b), "node_editing").len(), 1);
    assert_eq!(events_of_type(&drain(&mut rx_a), "node_editing").len(), 1);
}

#[test]
fn test_ping_answers_pong() {
    let engine = CollabEngine::new();
    let (conn, mut rx) = ConnectionHandle::channel();

    engine.handle_message(&conn, r#"{"type":"ping"}"#);

    let events = drain(&mut rx);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["type"], "pong");
}

#[test]
fn test_malformed_json_is_dropped_quietly() {
    let engine = CollabEngine::new();
    let (conn, mut rx) = ConnectionHandle::channel();
    engine.connect_script(&conn, "s1", "u1", "alice");
    drain(&mut rx);

    engine.handle_message(&conn, "this is {not json");
    assert!(drain(&mut rx).is_empty());

    // The connection keeps working afterwards.
    engine.handle_message(&conn, r#"{"type":"ping"}"#);
    assert_eq!(drain(&mut rx).len(), 1);
}

#[test]
fn test_unknown_type_and_missing_fields_are_ignored() {
    let engine = CollabEngine::new();
    let (conn, mut rx) = ConnectionHandle::channel();
    engine.connect_script(&conn, "s1", "u1", "alice");
    drain(&mut rx);

    engine.handle_message(&conn, r#"{"type":"brandNewThing","payload":42}"#);
    engine.handle_message(&conn, r#"{"type":"startEditing","scriptId":"s1"}"#);
    assert!(drain(&mut rx).is_empty());
}

#[test]
fn test_leave_message_triggers_disconnect() {
    let engine = CollabEngine::new();
    let (conn_a, mut rx_a) = ConnectionHandle::channel();
    let (conn_b, mut rx_b) = ConnectionHandle::channel();
    engine.connect_script(&conn_a, "s1", "u1", "alice");
    engine.connect_script(&conn_b, "s1", "u2", "bob");
    drain(&mut rx_a);
    drain(&mut rx_b);

    engine.handle_message(&conn_a, &json!({"type": "leave", "userId": "u1"}).to_string());

    let events_b = drain(&mut rx_b);
    assert_eq!(events_of_type(&events_b, "user_left_script").len(), 1);
}

#[test]
fn test_update_node_relays_to_all_script_peers() {
    let engine = CollabEngine::new();
    let (conn_a, mut rx_a) = ConnectionHandle::channel();
    let (conn_b, mut rx_b) = ConnectionHandle::channel();
    engine.connect_script(&conn_a, "s1", "u1", "alice");
    engine.connect_script(&conn_b, "s1", "u2", "bob");
    drain(&mut rx_a);
    drain(&mut rx_b);

    engine.handle_message(
        &conn_a,
        &json!({
            "type": "updateNode",
            "scriptId": "s1",
            "userId": "u1",
            "nodeId": "n1",
            "content": "    \"rewritten\"",
            "startLine": 3,
            "endLine": 4,
        })
        .to_string(),
    );

    for rx in [&mut rx_a, &mut rx_b] {
        let events = drain(rx);
        let updates = events_of_type(&events, "updateNode");
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0]["username"], "alice");
        assert_eq!(updates[0]["start_line"], 3);
        assert_eq!(updates[0]["end_line"], 4);
    }
}

#[test]
fn test_update_structure_relays_tree_verbatim() {
    let engine = CollabEngine::new();
    let (conn_a, mut rx_a) = ConnectionHandle::channel();
    let (conn_b, mut rx_b) = ConnectionHandle::channel();
    engine.connect_script(&conn_a, "s1", "u1", "alice");
    engine.connect_script(&conn_b, "s1", "u2", "bob");
    drain(&mut rx_a);
    drain(&mut rx_b);

    let tree = json!({"kind": "LabelBlock", "label": "root", "children": []});
    engine.handle_message(
        &conn_a,
        &json!({"type": "updateStructure", "scriptId": "s1", "tree": tree}).to_string(),
    );

    let events_b = drain(&mut rx_b);
    let updates = events_of_type(&events_b, "updateStructure");
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0]["tree"], tree);
}

#[test]
fn test_broadcasts_to_unknown_scope_are_noops() {
    let engine = CollabEngine::new();
    // No one is connected; nothing should panic.
    engine.broadcast_script(
        "ghost-script",
        &crate::protocol::ServerEvent::Pong,
    );
    engine.broadcast_project(
        "ghost-project",
        &crate::protocol::ServerEvent::Pong,
    );
    assert!(engine.active_project_users("ghost-project").is_empty());
}
