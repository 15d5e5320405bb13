// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single accept point for every outbound message (C6, §4.6).
//!
//! `Dispatcher` is the one component that knows about `SessionRegistry`,
//! `RoomRegistry`, and the bus at once (§9 design note on cyclic
//! references): the registries never reach back into the bus themselves,
//! they call out through this type.

use std::sync::Arc;

use tracing::warn;
use uuid::Uuid;

use crate::collaborators::PubSubBus;
use crate::error::CoreError;
use crate::instance::InstanceState;
use crate::model::{iso8601_now, BusEnvelope, BusMessage, Message, Target};
use crate::registry::room::{room_update_frame, RoomEventSink, RoomRegistry};
use crate::registry::session::SessionRegistry;

/// Bus subject suffixes (§4.3). There is no session-specific topic: a
/// `to_session` send that misses locally falls back to `BROADCAST` so any
/// peer holding that session id can pick it up.
pub const TOPIC_BROADCAST: &str = "broadcast";
pub const TOPIC_ROOM: &str = "room";
pub const TOPIC_USER: &str = "user";

/// Caller-facing receipt for an accepted send (§6.3 admin response shape).
///
/// `recipients_count` reports only sessions delivered on *this* instance,
/// even when the message was also published to the bus — the source
/// under-reports true delivery this way and callers must not read it as an
/// authoritative count (§9 open question 1, preserved deliberately).
#[derive(Debug, Clone, serde::Serialize)]
pub struct AcceptReceipt {
    pub success: bool,
    pub message_id: String,
    pub recipients_count: usize,
    pub timestamp: String,
}

pub struct Dispatcher {
    instance: Arc<InstanceState>,
    sessions: Arc<SessionRegistry>,
    rooms: Arc<RoomRegistry>,
    bus: Arc<dyn PubSubBus>,
}

impl Dispatcher {
    pub fn new(
        instance: Arc<InstanceState>,
        sessions: Arc<SessionRegistry>,
        rooms: Arc<RoomRegistry>,
        bus: Arc<dyn PubSubBus>,
    ) -> Self {
        Self { instance, sessions, rooms, bus }
    }

    /// Route one message to its target, locally and (unless `local_only`)
    /// across the bus (§4.6 algorithm table).
    pub async fn route(&self, mut msg: Message, local_only: bool) -> Result<AcceptReceipt, CoreError> {
        if msg.id.is_none() {
            msg.id = Some(Uuid::new_v4().to_string());
        }
        self.instance.stats.message_accepted();

        let recipients = match msg.target.clone() {
            Target::ToSession(ref id) => self.route_to_session(id, &msg, local_only).await,
            Target::ToUser(ref user_id) => self.route_to_user(user_id, &msg, local_only).await,
            Target::ToRoom(ref room_id) => self.route_to_room(room_id, &msg, local_only).await,
            Target::ToAll => self.route_to_all(&msg, local_only).await,
            Target::None => return Err(CoreError::Validation("message has no target".into())),
        };

        self.instance.stats.message_fanned_out(recipients as u64);
        Ok(AcceptReceipt {
            success: true,
            message_id: msg.id.clone().unwrap_or_default(),
            recipients_count: recipients,
            timestamp: msg.timestamp.clone(),
        })
    }

    async fn route_to_session(&self, id: &str, msg: &Message, local_only: bool) -> usize {
        let frame = msg.to_wire_frame(None);
        let delivered = self.sessions.send(id, &frame).await;
        if delivered == 0 && !local_only {
            self.publish(TOPIC_BROADCAST, msg).await;
        }
        delivered
    }

    async fn route_to_user(&self, user_id: &str, msg: &Message, local_only: bool) -> usize {
        let frame = msg.to_wire_frame(None);
        let delivered = self.sessions.send_user(user_id, &frame).await;
        if !local_only {
            self.publish(TOPIC_USER, msg).await;
        }
        delivered
    }

    async fn route_to_room(&self, room_id: &str, msg: &Message, local_only: bool) -> usize {
        let frame = msg.to_wire_frame(Some(room_id));
        let mut delivered = 0;
        for session_id in self.rooms.broadcast_targets(room_id).await {
            delivered += self.sessions.send(&session_id, &frame).await;
        }
        if !local_only {
            self.publish(TOPIC_ROOM, msg).await;
        }
        delivered
    }

    async fn route_to_all(&self, msg: &Message, local_only: bool) -> usize {
        let frame = msg.to_wire_frame(None);
        let delivered = self.sessions.send_all(&frame).await;
        if !local_only {
            self.publish(TOPIC_BROADCAST, msg).await;
        }
        delivered
    }

    /// Publish to the bus, tagging the envelope with this instance's id
    /// (§4.3). A `BusErr` here is logged and never fails the caller: local
    /// delivery (if any already happened) is not rolled back (§7).
    async fn publish(&self, subject_suffix: &str, msg: &Message) {
        let envelope = BusEnvelope {
            origin_instance_id: self.instance.instance_id.clone(),
            message: BusMessage::from(msg),
            enqueued_at: iso8601_now(),
        };
        if let Err(e) = self.bus.publish(subject_suffix, &envelope).await {
            warn!(error = %e, topic = subject_suffix, "bus publish failed; local delivery is unaffected");
        }
    }
}

impl RoomEventSink for Dispatcher {
    /// Broadcasts a `room_update` visibility event to every other local
    /// member of a room on a join/leave transition (§4.2). This is a
    /// local-only notification: every instance independently emits the
    /// same event to its own members when its own membership changes, so
    /// there is no bus publish here.
    fn room_membership_changed(&self, room_id: &str, action: &str, member_count: usize, actor_session: &str) {
        let sessions = Arc::clone(&self.sessions);
        let rooms = Arc::clone(&self.rooms);
        let room_id = room_id.to_owned();
        let action = action.to_owned();
        let actor_session = actor_session.to_owned();
        tokio::spawn(async move {
            let frame = room_update_frame(&room_id, &action, member_count, iso8601_now());
            for session_id in rooms.broadcast_targets(&room_id).await {
                if session_id == actor_session {
                    continue;
                }
                sessions.send(&session_id, &frame).await;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::FakeBus;
    use crate::model::MessageType;
    use crate::registry::session::{OutFrame, Session};
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    fn make_dispatcher() -> (Dispatcher, Arc<SessionRegistry>, Arc<RoomRegistry>) {
        let instance = Arc::new(InstanceState::new());
        let sessions = Arc::new(SessionRegistry::new());
        let rooms = Arc::new(RoomRegistry::new());
        let bus: Arc<dyn PubSubBus> = Arc::new(FakeBus::new());
        let dispatcher = Dispatcher::new(Arc::clone(&instance), Arc::clone(&sessions), Arc::clone(&rooms), bus);
        (dispatcher, sessions, rooms)
    }

    fn make_session(id: &str, user_id: &str) -> (Arc<Session>, mpsc::Receiver<OutFrame>) {
        let (tx, rx) = mpsc::channel(crate::registry::session::WRITE_LANE_CAPACITY);
        let session =
            Arc::new(Session::new(id.to_owned(), user_id.to_owned(), 1, "name".to_owned(), tx, CancellationToken::new()));
        (session, rx)
    }

    fn msg(target: Target) -> Message {
        Message::new(MessageType::Notification, target, serde_json::json!({"text": "hi"}), iso8601_now())
    }

    #[tokio::test]
    async fn to_user_delivers_to_every_local_session() {
        let (dispatcher, sessions, _rooms) = make_dispatcher();
        let (s1, mut rx1) = make_session("s1", "u1");
        let (s2, mut rx2) = make_session("s2", "u1");
        sessions.add(s1).await.unwrap();
        sessions.add(s2).await.unwrap();

        let receipt = dispatcher.route(msg(Target::ToUser("u1".into())), false).await.unwrap();
        assert_eq!(receipt.recipients_count, 2);
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[tokio::test]
    async fn to_room_delivers_only_to_members() {
        let (dispatcher, sessions, rooms) = make_dispatcher();
        let (s1, mut rx1) = make_session("s1", "u1");
        let (s2, mut rx2) = make_session("s2", "u2");
        sessions.add(s1).await.unwrap();
        sessions.add(s2).await.unwrap();
        rooms.join("group:g1", "s1", crate::registry::room::RoomType::Group, "G1", "u1").await.unwrap();

        let receipt = dispatcher.route(msg(Target::ToRoom("group:g1".into())), false).await.unwrap();
        assert_eq!(receipt.recipients_count, 1);
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_err());
    }

    #[tokio::test]
    async fn malformed_target_is_rejected() {
        let (dispatcher, _sessions, _rooms) = make_dispatcher();
        let err = dispatcher.route(msg(Target::None), false).await;
        assert!(matches!(err, Err(CoreError::Validation(_))));
    }

    #[tokio::test]
    async fn to_user_with_no_local_sessions_is_not_an_error() {
        let (dispatcher, _sessions, _rooms) = make_dispatcher();
        let receipt = dispatcher.route(msg(Target::ToUser("ghost".into())), false).await.unwrap();
        assert_eq!(receipt.recipients_count, 0);
    }

    #[tokio::test]
    async fn room_join_emits_room_update_to_other_members_only() {
        let (dispatcher, sessions, rooms) = make_dispatcher();
        let dispatcher = Arc::new(dispatcher);
        rooms.attach_sink(Arc::downgrade(&dispatcher)).await;
        let (s1, mut rx1) = make_session("s1", "u1");
        let (s2, mut rx2) = make_session("s2", "u2");
        sessions.add(s1).await.unwrap();
        sessions.add(s2).await.unwrap();

        rooms.join("group:g1", "s1", crate::registry::room::RoomType::Group, "G1", "u1").await.unwrap();
        rooms.join("group:g1", "s2", crate::registry::room::RoomType::Group, "G1", "u2").await.unwrap();
        // Give the spawned notification task a chance to run.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        // s1 joined first with no other members, so it gets nothing for its own join.
        assert!(rx1.try_recv().is_ok(), "s1 should see s2's join");
        let _ = rx2.try_recv();
    }
}
