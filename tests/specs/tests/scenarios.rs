// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end scenario tests driving the real HTTP/WebSocket surface of a
//! `relaymesh` instance (or two, sharing a bus).

use std::sync::Arc;
use std::time::Duration;

use relaymesh::collaborators::{AuthIdentity, FakeBus, FakeGroupDirectory, GroupChangeEvent, GroupMembership};
use relaymesh_specs::{next_json_frame, TestInstance, ADMIN_TOKEN};

const TIMEOUT: Duration = Duration::from_secs(5);

fn identity(user_id: &str, character_id: i64) -> AuthIdentity {
    AuthIdentity { user_id: user_id.to_owned(), character_id, character_name: format!("char-{character_id}") }
}

#[tokio::test]
async fn s1_to_user_reaches_sessions_on_both_instances() {
    let groups = Arc::new(FakeGroupDirectory::new());
    let bus = FakeBus::new();

    let instance_a = TestInstance::start(vec![("t1", identity("u1", 1))], Arc::clone(&groups), bus.clone()).await;
    let instance_b = TestInstance::start(vec![("t2", identity("u1", 2))], Arc::clone(&groups), bus.clone()).await;

    let mut ws_a = instance_a.connect("t1").await;
    let mut ws_b = instance_b.connect("t2").await;
    next_json_frame(&mut ws_a).await.expect("welcome frame on A");
    next_json_frame(&mut ws_b).await.expect("welcome frame on B");

    let client = instance_a.admin_client();
    let resp = client
        .post(format!("{}/ws/users/u1/message", instance_a.base_url()))
        .bearer_auth(ADMIN_TOKEN)
        .json(&serde_json::json!({"type": "notification", "data": {"text": "hi"}}))
        .send()
        .await
        .expect("admin post");
    let receipt: serde_json::Value = resp.json().await.expect("receipt json");
    assert_eq!(receipt["recipients_count"], 1, "receipt only counts the local session on A");

    let frame_a = tokio::time::timeout(TIMEOUT, next_json_frame(&mut ws_a)).await.expect("no timeout").expect("frame on A");
    assert_eq!(frame_a["type"], "notification");
    assert_eq!(frame_a["data"]["text"], "hi");

    let frame_b = tokio::time::timeout(TIMEOUT, next_json_frame(&mut ws_b)).await.expect("no timeout").expect("frame on B");
    assert_eq!(frame_b["type"], "notification");
    assert_eq!(frame_b["data"]["text"], "hi");
}

#[tokio::test]
async fn s2_initial_assignment_joins_personal_and_group_rooms() {
    let groups = Arc::new(FakeGroupDirectory::new());
    groups
        .seed(
            1,
            vec![
                GroupMembership { group_id: "g1".into(), group_name: "G1".into() },
                GroupMembership { group_id: "g2".into(), group_name: "G2".into() },
            ],
        )
        .await;
    let bus = FakeBus::new();
    let instance = TestInstance::start(vec![("t1", identity("u1", 1))], groups, bus).await;

    let mut ws = instance.connect("t1").await;
    next_json_frame(&mut ws).await.expect("welcome frame");

    // Background group reconciliation needs a moment to land.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let sessions = instance.app.sessions.all().await;
    let session = sessions.first().expect("one session registered");
    let rooms = instance.app.rooms.rooms_of(&session.id).await;
    assert!(rooms.contains(&"user:u1".to_string()));
    assert!(rooms.contains(&"group:g1".to_string()));
    assert!(rooms.contains(&"group:g2".to_string()));
}

#[tokio::test]
async fn s3_group_change_event_leaves_room_and_notifies() {
    let groups = Arc::new(FakeGroupDirectory::new());
    groups.seed(1, vec![GroupMembership { group_id: "g1".into(), group_name: "G1".into() }]).await;
    let bus = FakeBus::new();
    let instance = TestInstance::start(vec![("t1", identity("u1", 1))], Arc::clone(&groups), bus).await;

    let mut ws = instance.connect("t1").await;
    next_json_frame(&mut ws).await.expect("welcome frame");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(instance.app.rooms.has_member("group:g1", &instance.app.sessions.all().await[0].id).await);

    instance
        .app
        .membership
        .on_group_change(GroupChangeEvent { character_id: 1, group_id: "g1".into(), group_name: "G1".into(), joined: false })
        .await;

    let session_id = instance.app.sessions.all().await[0].id.clone();
    assert!(!instance.app.rooms.has_member("group:g1", &session_id).await);

    let frame = tokio::time::timeout(TIMEOUT, next_json_frame(&mut ws)).await.expect("no timeout").expect("change frame");
    assert_eq!(frame["type"], "group_membership_change");
    assert_eq!(frame["data"]["joined"], false);
}

#[tokio::test]
async fn s4_liveness_sweep_closes_idle_session() {
    let groups = Arc::new(FakeGroupDirectory::new());
    let bus = FakeBus::new();
    // Ping fires almost immediately and the idle window is already zero, so
    // the very first ping tick observes the session as idle and closes it.
    let instance = TestInstance::start_with_timing(vec![("t1", identity("u1", 1))], groups, bus, 1, 0).await;

    let mut ws = instance.connect("t1").await;
    next_json_frame(&mut ws).await.expect("welcome frame");

    let closed = tokio::time::timeout(Duration::from_secs(3), async {
        loop {
            if instance.app.sessions.active_count().await == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await;
    assert!(closed.is_ok(), "session should be reaped by the per-session liveness check");
    assert_eq!(instance.app.instance.stats.snapshot().active_sessions, 0);
}

#[tokio::test]
async fn s5_broadcast_reaches_local_and_remote_sessions() {
    let groups = Arc::new(FakeGroupDirectory::new());
    let bus = FakeBus::new();

    let instance_a = TestInstance::start(vec![("t1", identity("u1", 1)), ("t2", identity("u2", 2))], Arc::clone(&groups), bus.clone()).await;
    let instance_b = TestInstance::start(vec![("t3", identity("u3", 3))], groups, bus).await;

    let mut ws_a1 = instance_a.connect("t1").await;
    let mut ws_a2 = instance_a.connect("t2").await;
    let mut ws_b1 = instance_b.connect("t3").await;
    next_json_frame(&mut ws_a1).await.expect("welcome a1");
    next_json_frame(&mut ws_a2).await.expect("welcome a2");
    next_json_frame(&mut ws_b1).await.expect("welcome b1");

    let client = instance_a.admin_client();
    let resp = client
        .post(format!("{}/ws/broadcast", instance_a.base_url()))
        .bearer_auth(ADMIN_TOKEN)
        .json(&serde_json::json!({"type": "critical_alert", "data": {"severity": "high"}}))
        .send()
        .await
        .expect("admin post");
    let receipt: serde_json::Value = resp.json().await.expect("receipt json");
    assert_eq!(receipt["recipients_count"], 2, "receipt only counts sessions local to A");

    for ws in [&mut ws_a1, &mut ws_a2, &mut ws_b1] {
        let frame = tokio::time::timeout(TIMEOUT, next_json_frame(ws)).await.expect("no timeout").expect("alert frame");
        assert_eq!(frame["type"], "critical_alert");
        assert_eq!(frame["data"]["severity"], "high");
    }
}

#[tokio::test]
async fn s6_message_to_non_member_room_is_rejected_with_error_frame() {
    let groups = Arc::new(FakeGroupDirectory::new());
    let bus = FakeBus::new();
    let instance = TestInstance::start(vec![("t1", identity("u1", 1))], groups, bus).await;

    let mut ws = instance.connect("t1").await;
    next_json_frame(&mut ws).await.expect("welcome frame");

    use futures_util::SinkExt;
    let outbound = serde_json::json!({"type": "message", "room": "group:x", "data": {"text": "hello"}});
    ws.send(tokio_tungstenite::tungstenite::Message::Text(outbound.to_string().into())).await.expect("send frame");

    let frame = tokio::time::timeout(TIMEOUT, next_json_frame(&mut ws)).await.expect("no timeout").expect("error frame");
    assert_eq!(frame["type"], "error");
    assert_eq!(frame["room"], "group:x");
}
