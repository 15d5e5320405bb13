// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Room directory (C2, §4.2): membership edges between sessions and rooms.
//!
//! `RoomRegistry` never reaches back into the bus or the session registry
//! directly (§9 design note on cyclic references). It only ever calls out
//! through the `RoomEventSink` it is attached to, and holds that reference
//! as a `Weak` pointer so constructing a `Dispatcher` around a `RoomRegistry`
//! never creates an `Arc` cycle.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Weak};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::CoreError;
use crate::model::WireFrame;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomType {
    Personal,
    Group,
}

/// Callback surface `RoomRegistry` uses to announce membership transitions.
/// Implemented by `Dispatcher` (§9).
pub trait RoomEventSink: Send + Sync {
    fn room_membership_changed(&self, room_id: &str, action: &str, member_count: usize, actor_session: &str);
}

struct RoomInner {
    id: String,
    kind: RoomType,
    name: RwLock<String>,
    members: RwLock<HashSet<String>>,
    created_at_ms: i64,
    updated_at_ms: AtomicI64,
}

/// Public view of a room for the admin surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomView {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: RoomType,
    pub name: String,
    pub member_count: usize,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

#[derive(Debug, Clone, Default)]
pub struct RoomFilter {
    pub kind: Option<RoomType>,
    pub member_id: Option<String>,
}

#[derive(Default)]
pub struct RoomRegistry {
    rooms: RwLock<HashMap<String, Arc<RoomInner>>>,
    /// Reverse index, maintained symmetrically with each room's member set (§5).
    rooms_of_session: RwLock<HashMap<String, HashSet<String>>>,
    sink: RwLock<Option<Weak<dyn RoomEventSink>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the sink that receives `room_update` notifications. Called
    /// once, after the owning `Dispatcher` has been wrapped in an `Arc`.
    pub async fn attach_sink(&self, sink: Weak<dyn RoomEventSink>) {
        *self.sink.write().await = Some(sink);
    }

    pub async fn ensure(&self, room_id: &str, kind: RoomType, name: &str) -> Arc<RoomInnerHandle> {
        if let Some(existing) = self.rooms.read().await.get(room_id) {
            return Arc::new(RoomInnerHandle(Arc::clone(existing)));
        }
        let mut rooms = self.rooms.write().await;
        if let Some(existing) = rooms.get(room_id) {
            return Arc::new(RoomInnerHandle(Arc::clone(existing)));
        }
        let now = now_ms();
        let room = Arc::new(RoomInner {
            id: room_id.to_owned(),
            kind,
            name: RwLock::new(name.to_owned()),
            members: RwLock::new(HashSet::new()),
            created_at_ms: now,
            updated_at_ms: AtomicI64::new(now),
        });
        rooms.insert(room_id.to_owned(), Arc::clone(&room));
        Arc::new(RoomInnerHandle(room))
    }

    /// Idempotent join. Personal rooms may only admit sessions whose
    /// `user_id` matches the room's owner (§4.2 invariant).
    pub async fn join(
        &self,
        room_id: &str,
        session_id: &str,
        kind: RoomType,
        name: &str,
        session_user_id: &str,
    ) -> Result<(), CoreError> {
        if kind == RoomType::Personal {
            let Some(owner) = room_id.strip_prefix("user:") else {
                return Err(CoreError::Invariant(format!("malformed personal room id: {room_id}")));
            };
            if owner != session_user_id {
                return Err(CoreError::Invariant(format!(
                    "session user {session_user_id} may not join personal room of {owner}"
                )));
            }
        }

        let handle = self.ensure(room_id, kind, name).await;
        let is_new_member = {
            let room = &handle.0;
            let mut members = room.members.write().await;
            let inserted = members.insert(session_id.to_owned());
            if inserted {
                room.updated_at_ms.store(now_ms(), Ordering::Relaxed);
            }
            (inserted, members.len())
        };

        self.rooms_of_session.write().await.entry(session_id.to_owned()).or_default().insert(room_id.to_owned());

        if is_new_member.0 {
            self.notify(room_id, "joined", is_new_member.1, session_id).await;
        }
        Ok(())
    }

    /// Idempotent leave. Removes the empty `group` room; `personal` rooms
    /// are GC'd separately, driven by session count for the user (§4.2).
    pub async fn leave(&self, room_id: &str, session_id: &str) {
        let outcome = {
            let rooms = self.rooms.read().await;
            let Some(room) = rooms.get(room_id) else { return };
            let mut members = room.members.write().await;
            let removed = members.remove(session_id);
            if removed {
                room.updated_at_ms.store(now_ms(), Ordering::Relaxed);
            }
            (removed, members.len(), room.kind)
        };

        if let Some(set) = self.rooms_of_session.write().await.get_mut(session_id) {
            set.remove(room_id);
        }

        if !outcome.0 {
            return;
        }

        self.notify(room_id, "left", outcome.1, session_id).await;

        if outcome.2 == RoomType::Group && outcome.1 == 0 {
            self.rooms.write().await.remove(room_id);
        }
    }

    /// Remove a `personal` room once its owning user has zero local
    /// sessions; idempotent no-op otherwise.
    pub async fn gc_personal_if_empty(&self, user_id: &str) {
        let room_id = crate::model::personal_room_id(user_id);
        let is_empty = {
            let rooms = self.rooms.read().await;
            match rooms.get(&room_id) {
                Some(room) => room.members.read().await.is_empty(),
                None => return,
            }
        };
        if is_empty {
            self.rooms.write().await.remove(&room_id);
        }
    }

    pub async fn members(&self, room_id: &str) -> Vec<String> {
        let rooms = self.rooms.read().await;
        match rooms.get(room_id) {
            Some(room) => room.members.read().await.iter().cloned().collect(),
            None => Vec::new(),
        }
    }

    pub async fn rooms_of(&self, session_id: &str) -> Vec<String> {
        self.rooms_of_session.read().await.get(session_id).map(|s| s.iter().cloned().collect()).unwrap_or_default()
    }

    pub async fn has_member(&self, room_id: &str, session_id: &str) -> bool {
        let rooms = self.rooms.read().await;
        match rooms.get(room_id) {
            Some(room) => room.members.read().await.contains(session_id),
            None => false,
        }
    }

    pub async fn get_view(&self, room_id: &str) -> Option<RoomView> {
        let rooms = self.rooms.read().await;
        let room = rooms.get(room_id)?;
        Some(Self::view_of(room).await)
    }

    pub async fn list_filtered(&self, filter: &RoomFilter) -> Vec<RoomView> {
        let rooms = self.rooms.read().await;
        let mut out = Vec::new();
        for room in rooms.values() {
            if let Some(kind) = filter.kind {
                if room.kind != kind {
                    continue;
                }
            }
            if let Some(ref member_id) = filter.member_id {
                if !room.members.read().await.contains(member_id) {
                    continue;
                }
            }
            out.push(Self::view_of(room).await);
        }
        out
    }

    pub async fn active_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    async fn view_of(room: &Arc<RoomInner>) -> RoomView {
        RoomView {
            id: room.id.clone(),
            kind: room.kind,
            name: room.name.read().await.clone(),
            member_count: room.members.read().await.len(),
            created_at_ms: room.created_at_ms,
            updated_at_ms: room.updated_at_ms.load(Ordering::Relaxed),
        }
    }

    /// Fan out a message to every locally-resident member of a room, with
    /// no bus publish (§4.2 `broadcast_local`). Returns the frames to be
    /// enqueued; callers (the `Dispatcher`) own the actual session sends so
    /// this module never depends on `SessionRegistry`.
    pub async fn broadcast_targets(&self, room_id: &str) -> Vec<String> {
        self.members(room_id).await
    }

    async fn notify(&self, room_id: &str, action: &str, member_count: usize, actor_session: &str) {
        let sink = self.sink.read().await.clone();
        if let Some(weak) = sink {
            if let Some(strong) = weak.upgrade() {
                strong.room_membership_changed(room_id, action, member_count, actor_session);
            }
        }
    }
}

/// Opaque handle returned by `ensure`; exists only so callers don't need to
/// reach into the crate-private `RoomInner` type.
pub struct RoomInnerHandle(Arc<RoomInner>);

impl RoomInnerHandle {
    pub fn id(&self) -> &str {
        &self.0.id
    }
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// A wire-addressed room broadcast frame, used by `Dispatcher` to build the
/// `room_update` visibility event (§4.2).
pub fn room_update_frame(room_id: &str, action: &str, member_count: usize, timestamp: String) -> WireFrame {
    WireFrame {
        id: None,
        kind: crate::model::MessageType::RoomUpdate,
        room: Some(room_id.to_owned()),
        from: None,
        to: None,
        data: serde_json::json!({"action": action, "member_count": member_count}),
        timestamp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn join_then_leave_is_symmetric() {
        let registry = RoomRegistry::new();
        registry.join("group:g1", "s1", RoomType::Group, "G1", "u1").await.unwrap();
        assert!(registry.has_member("group:g1", "s1").await);
        assert_eq!(registry.rooms_of("s1").await, vec!["group:g1".to_string()]);

        registry.leave("group:g1", "s1").await;
        assert!(!registry.has_member("group:g1", "s1").await);
        assert!(registry.rooms_of("s1").await.is_empty());
        // Empty group room was GC'd.
        assert!(registry.get_view("group:g1").await.is_none());
    }

    #[tokio::test]
    async fn personal_room_rejects_mismatched_user() {
        let registry = RoomRegistry::new();
        let err = registry.join("user:alice", "s1", RoomType::Personal, "alice", "bob").await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn join_is_idempotent() {
        let registry = RoomRegistry::new();
        registry.join("group:g1", "s1", RoomType::Group, "G1", "u1").await.unwrap();
        registry.join("group:g1", "s1", RoomType::Group, "G1", "u1").await.unwrap();
        assert_eq!(registry.members("group:g1").await.len(), 1);
    }

    #[tokio::test]
    async fn personal_room_survives_empty_members_until_gc_called() {
        let registry = RoomRegistry::new();
        registry.join("user:alice", "s1", RoomType::Personal, "alice", "alice").await.unwrap();
        registry.leave("user:alice", "s1").await;
        // Personal rooms aren't auto-removed on last-leave like group rooms.
        assert!(registry.get_view("user:alice").await.is_some());
        registry.gc_personal_if_empty("alice").await;
        assert!(registry.get_view("user:alice").await.is_none());
    }

    #[tokio::test]
    async fn leave_unknown_room_is_noop() {
        let registry = RoomRegistry::new();
        registry.leave("group:ghost", "s1").await;
    }
}
