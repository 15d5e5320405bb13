// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire and internal message types shared by every component.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The closed set of message types recognized on the wire (§6.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Message,
    UserProfileUpdate,
    GroupMembershipChange,
    SystemNotification,
    Presence,
    Notification,
    RoomUpdate,
    BackendStatus,
    CriticalAlert,
    ServiceRecovery,
    Heartbeat,
    Error,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::UserProfileUpdate => "user_profile_update",
            Self::GroupMembershipChange => "group_membership_change",
            Self::SystemNotification => "system_notification",
            Self::Presence => "presence",
            Self::Notification => "notification",
            Self::RoomUpdate => "room_update",
            Self::BackendStatus => "backend_status",
            Self::CriticalAlert => "critical_alert",
            Self::ServiceRecovery => "service_recovery",
            Self::Heartbeat => "heartbeat",
            Self::Error => "error",
        }
    }

    /// The set the admin broadcast surface accepts (§4.7); all wire types are
    /// admin-sendable except the two that are exclusively server-originated
    /// reactions to client state (`error`, which always addresses a single
    /// reader, and `heartbeat`, a liveness primitive not a payload carrier).
    pub fn allowed_for_admin(&self) -> bool {
        !matches!(self, Self::Error | Self::Heartbeat)
    }
}

/// A logical send target, resolved server-side rather than carried verbatim
/// on the wire (see §6.2: the wire frame carries `room`/`to`, from which the
/// target is derived contextually).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    ToSession(String),
    ToUser(String),
    ToRoom(String),
    ToAll,
    None,
}

/// The logical unit of delivery (§3).
#[derive(Debug, Clone)]
pub struct Message {
    pub id: Option<String>,
    pub kind: MessageType,
    pub target: Target,
    pub from: Option<String>,
    pub payload: Value,
    pub timestamp: String,
}

impl Message {
    pub fn new(kind: MessageType, target: Target, payload: Value, timestamp: String) -> Self {
        Self { id: None, kind, target, from: None, payload, timestamp }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    /// Render as the wire frame sent to a client.
    pub fn to_wire_frame(&self, room: Option<&str>) -> WireFrame {
        WireFrame {
            id: self.id.clone(),
            kind: self.kind,
            room: room.map(String::from),
            from: self.from.clone(),
            to: None,
            data: self.payload.clone(),
            timestamp: self.timestamp.clone(),
        }
    }
}

/// The exact shape exchanged with clients over the upgraded transport (§6.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default)]
    pub data: Value,
    pub timestamp: String,
}

/// What travels between instances over the pub/sub bus (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusEnvelope {
    pub origin_instance_id: String,
    pub message: BusMessage,
    pub enqueued_at: String,
}

/// `Message` in a form that survives JSON round-tripping across the bus;
/// `Target` is flattened into explicit optional fields since it is not
/// itself serializable as a single wire-neutral shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub target_session: Option<String>,
    pub target_user: Option<String>,
    pub target_room: Option<String>,
    pub target_all: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default)]
    pub payload: Value,
    pub timestamp: String,
}

impl From<&Message> for BusMessage {
    fn from(m: &Message) -> Self {
        let (target_session, target_user, target_room, target_all) = match &m.target {
            Target::ToSession(id) => (Some(id.clone()), None, None, false),
            Target::ToUser(id) => (None, Some(id.clone()), None, false),
            Target::ToRoom(id) => (None, None, Some(id.clone()), false),
            Target::ToAll => (None, None, None, true),
            Target::None => (None, None, None, false),
        };
        Self {
            id: m.id.clone(),
            kind: m.kind,
            target_session,
            target_user,
            target_room,
            target_all,
            from: m.from.clone(),
            payload: m.payload.clone(),
            timestamp: m.timestamp.clone(),
        }
    }
}

impl From<BusMessage> for Message {
    fn from(bm: BusMessage) -> Self {
        let target = if let Some(id) = bm.target_session {
            Target::ToSession(id)
        } else if let Some(id) = bm.target_user {
            Target::ToUser(id)
        } else if let Some(id) = bm.target_room {
            Target::ToRoom(id)
        } else if bm.target_all {
            Target::ToAll
        } else {
            Target::None
        };
        Message { id: bm.id, kind: bm.kind, target, from: bm.from, payload: bm.payload, timestamp: bm.timestamp }
    }
}

/// Current UTC time as an ISO-8601 string (e.g. `2026-02-14T01:23:45Z`).
///
/// Howard Hinnant's civil-calendar algorithm, used instead of pulling in a
/// date/time crate for a single formatting need.
pub fn iso8601_now() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let dur = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    let secs = dur.as_secs();
    let time_secs = secs % 86400;
    let hours = time_secs / 3600;
    let minutes = (time_secs % 3600) / 60;
    let seconds = time_secs % 60;
    let days = secs / 86400;
    let z = days as i64 + 719468;
    let era = if z >= 0 { z } else { z - 146096 } / 146097;
    let doe = (z - era * 146097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = if m <= 2 { y + 1 } else { y };
    format!("{y:04}-{m:02}-{d:02}T{hours:02}:{minutes:02}:{seconds:02}Z")
}

/// Build a personal room id for a user identity.
pub fn personal_room_id(user_id: &str) -> String {
    format!("user:{user_id}")
}

/// Build a group room id for a group identity.
pub fn group_room_id(group_id: &str) -> String {
    format!("group:{group_id}")
}
