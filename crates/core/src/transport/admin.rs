// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Administrative HTTP surface (C7, §4.7, §6.3): read-only inspection plus
//! privileged send operations, all mutation delegated to `Dispatcher`.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::app::App;
use crate::error::CoreError;
use crate::model::{iso8601_now, Message, MessageType, Target};
use crate::registry::room::{RoomFilter, RoomType, RoomView};
use crate::registry::session::{SessionFilter, SessionView};

#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    pub user_id: Option<String>,
    pub character_id: Option<i64>,
    pub room_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionView>,
    pub total: usize,
}

pub async fn list_sessions(State(app): State<Arc<App>>, Query(q): Query<SessionQuery>) -> Json<SessionListResponse> {
    let views: Vec<SessionView> = if let Some(ref room_id) = q.room_id {
        let mut out = Vec::new();
        for session_id in app.rooms.members(room_id).await {
            let Some(session) = app.sessions.get(&session_id).await else { continue };
            let user_matches = q.user_id.as_deref().map(|u| u == session.user_id).unwrap_or(true);
            let character_matches = q.character_id.map(|c| c == session.character_id).unwrap_or(true);
            if user_matches && character_matches {
                out.push(session.public_view());
            }
        }
        out
    } else {
        app.sessions
            .list_filtered(&SessionFilter { user_id: q.user_id.clone(), character_id: q.character_id })
            .await
            .iter()
            .map(|s| s.public_view())
            .collect()
    };

    Json(SessionListResponse { total: views.len(), sessions: views })
}

pub async fn get_session(State(app): State<Arc<App>>, Path(id): Path<String>) -> Response {
    match app.sessions.get(&id).await {
        Some(s) => Json(s.public_view()).into_response(),
        None => CoreError::NotFound(format!("no session {id}")).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct RoomQuery {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub member_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RoomListResponse {
    pub rooms: Vec<RoomView>,
    pub total: usize,
}

pub async fn list_rooms(State(app): State<Arc<App>>, Query(q): Query<RoomQuery>) -> Json<RoomListResponse> {
    let kind = match q.kind.as_deref() {
        Some("personal") => Some(RoomType::Personal),
        Some("group") => Some(RoomType::Group),
        _ => None,
    };
    let rooms = app.rooms.list_filtered(&RoomFilter { kind, member_id: q.member_id }).await;
    Json(RoomListResponse { total: rooms.len(), rooms })
}

pub async fn get_room(State(app): State<Arc<App>>, Path(id): Path<String>) -> Response {
    match app.rooms.get_view(&id).await {
        Some(r) => Json(r).into_response(),
        None => CoreError::NotFound(format!("no room {id}")).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct SendBody {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

fn parse_admin_type(raw: &str) -> Result<MessageType, CoreError> {
    let kind: MessageType = serde_json::from_value(serde_json::Value::String(raw.to_owned()))
        .map_err(|_| CoreError::Validation(format!("unknown message type: {raw}")))?;
    if !kind.allowed_for_admin() {
        return Err(CoreError::Validation(format!("message type not sendable by admin: {raw}")));
    }
    Ok(kind)
}

async fn send(app: &Arc<App>, body: SendBody, target: Target) -> Response {
    let kind = match parse_admin_type(&body.kind) {
        Ok(k) => k,
        Err(e) => return e.into_response(),
    };
    let msg = Message::new(kind, target, body.data, iso8601_now());
    match app.dispatcher.route(msg, false).await {
        Ok(receipt) => Json(receipt).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn broadcast(State(app): State<Arc<App>>, Json(body): Json<SendBody>) -> Response {
    send(&app, body, Target::ToAll).await
}

pub async fn send_to_session(State(app): State<Arc<App>>, Path(id): Path<String>, Json(body): Json<SendBody>) -> Response {
    send(&app, body, Target::ToSession(id)).await
}

pub async fn send_to_user(State(app): State<Arc<App>>, Path(user_id): Path<String>, Json(body): Json<SendBody>) -> Response {
    send(&app, body, Target::ToUser(user_id)).await
}

/// `POST /ws/rooms/{id}/message` 404s when the room is unknown *locally*,
/// even if it exists on a peer instance (§9 open question 3). Preserved
/// rather than changed to an always-publish semantics.
pub async fn send_to_room(State(app): State<Arc<App>>, Path(room_id): Path<String>, Json(body): Json<SendBody>) -> Response {
    if app.rooms.get_view(&room_id).await.is_none() {
        return CoreError::NotFound(format!("no room {room_id}")).into_response();
    }
    send(&app, body, Target::ToRoom(room_id)).await
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub instance_id: String,
    pub stats: crate::instance::StatsSnapshot,
}

/// `GET /ws/status` — public, unauthenticated (§6.3).
pub async fn status(State(app): State<Arc<App>>) -> Json<StatusResponse> {
    Json(StatusResponse { status: "healthy", instance_id: app.instance.instance_id.clone(), stats: app.instance.stats.snapshot() })
}
