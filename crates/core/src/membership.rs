// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reconciles room membership with the external group directory (C4, §4.4).

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::collaborators::{GroupChangeEvent, GroupDirectory};
use crate::dispatcher::Dispatcher;
use crate::model::{group_room_id, iso8601_now, personal_room_id, Message, MessageType, Target};
use crate::registry::room::{RoomRegistry, RoomType};
use crate::registry::session::{Session, SessionRegistry};

pub struct MembershipResolver {
    rooms: Arc<RoomRegistry>,
    sessions: Arc<SessionRegistry>,
    groups: Arc<dyn GroupDirectory>,
    dispatcher: Arc<Dispatcher>,
    group_query_timeout: Duration,
}

impl MembershipResolver {
    pub fn new(
        rooms: Arc<RoomRegistry>,
        sessions: Arc<SessionRegistry>,
        groups: Arc<dyn GroupDirectory>,
        dispatcher: Arc<Dispatcher>,
        group_query_timeout: Duration,
    ) -> Self {
        Self { rooms, sessions, groups, dispatcher, group_query_timeout }
    }

    /// Joins the personal room unconditionally (fast, awaited by the
    /// caller), then reconciles group rooms in the background so the
    /// session's reader/writer loop is never blocked on the directory
    /// (§4.4, §4.5: "runs after the session is registered and the
    /// SessionLoop is already reading").
    pub async fn assign_initial(self: &Arc<Self>, session: Arc<Session>) {
        let personal = personal_room_id(&session.user_id);
        if let Err(e) =
            self.rooms.join(&personal, &session.id, RoomType::Personal, &session.user_id, &session.user_id).await
        {
            warn!(session_id = %session.id, error = %e, "failed to join personal room");
        }

        let this = Arc::clone(self);
        tokio::spawn(async move {
            let outcome =
                tokio::time::timeout(this.group_query_timeout, this.groups.groups_for_character(session.character_id))
                    .await;

            let memberships = match outcome {
                Ok(Ok(groups)) => groups,
                Ok(Err(e)) => {
                    warn!(character_id = session.character_id, error = %e, "group query failed; session keeps only its personal room");
                    return;
                }
                Err(_) => {
                    warn!(character_id = session.character_id, "group query timed out; session keeps only its personal room");
                    return;
                }
            };

            for membership in memberships {
                let room_id = group_room_id(&membership.group_id);
                if let Err(e) = this
                    .rooms
                    .join(&room_id, &session.id, RoomType::Group, &membership.group_name, &session.user_id)
                    .await
                {
                    warn!(room_id, error = %e, "failed to join group room during initial assignment");
                }
            }
        });
    }

    /// Reacts to one `(character_id, group_id, joined)` change event by
    /// joining or leaving the corresponding room on every local session for
    /// that character, then tells the client(s) about it (§4.4).
    pub async fn on_group_change(&self, event: GroupChangeEvent) {
        let room_id = group_room_id(&event.group_id);
        let sessions = self.sessions.by_character(event.character_id).await;
        if sessions.is_empty() {
            return;
        }

        let mut user_id = None;
        for session in &sessions {
            if event.joined {
                if let Err(e) =
                    self.rooms.join(&room_id, &session.id, RoomType::Group, &event.group_name, &session.user_id).await
                {
                    warn!(room_id, error = %e, "failed to join room on group-change event");
                }
            } else {
                self.rooms.leave(&room_id, &session.id).await;
            }
            user_id.get_or_insert_with(|| session.user_id.clone());
        }

        if let Some(user_id) = user_id {
            let msg = Message::new(
                MessageType::GroupMembershipChange,
                Target::ToUser(user_id),
                serde_json::json!({
                    "group_id": event.group_id,
                    "group_name": event.group_name,
                    "joined": event.joined,
                }),
                iso8601_now(),
            );
            if let Err(e) = self.dispatcher.route(msg, false).await {
                warn!(error = %e, "failed to publish group_membership_change");
            }
        }
    }

    /// Reconciles a single session's rooms against the directory's current
    /// truth, issuing the minimum set of joins/leaves (§4.4 `recompute`).
    pub async fn recompute(&self, session: &Session) {
        let current: HashSet<String> = self.rooms.rooms_of(&session.id).await.into_iter().collect();
        let personal = personal_room_id(&session.user_id);

        let memberships = match self.groups.groups_for_character(session.character_id).await {
            Ok(m) => m,
            Err(e) => {
                warn!(character_id = session.character_id, error = %e, "recompute: group query failed");
                return;
            }
        };

        let mut expected: HashSet<String> = memberships.iter().map(|m| group_room_id(&m.group_id)).collect();
        expected.insert(personal.clone());

        for room_id in expected.difference(&current) {
            let kind = if room_id == &personal { RoomType::Personal } else { RoomType::Group };
            let name = memberships
                .iter()
                .find(|m| &group_room_id(&m.group_id) == room_id)
                .map(|m| m.group_name.as_str())
                .unwrap_or(&session.user_id);
            if let Err(e) = self.rooms.join(room_id, &session.id, kind, name, &session.user_id).await {
                warn!(room_id, error = %e, "recompute: failed to join");
            }
        }
        for room_id in current.difference(&expected) {
            if room_id == &personal {
                continue;
            }
            self.rooms.leave(room_id, &session.id).await;
        }
    }
}
