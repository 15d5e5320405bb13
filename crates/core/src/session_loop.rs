// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-session reader, writer, and liveness pinger (C5, §4.5).
//!
//! The three responsibilities are realized as one task selecting over
//! read-ready, write-lane-non-empty, and ping-timer events rather than
//! three cooperating tasks (§9: either shape is acceptable, the contract
//! is one writer on the transport and a bounded idle timer).

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::app::App;
use crate::model::{iso8601_now, Message, MessageType, Target, WireFrame};
use crate::registry::session::{OutFrame, Session};

/// Drive one session's connection until it closes, then run cleanup
/// exactly once.
pub async fn run_session(app: Arc<App>, session: Arc<Session>, socket: WebSocket, mut write_rx: mpsc::Receiver<OutFrame>) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let write_deadline = app.config.write_deadline();
    let idle_timeout = app.config.idle_timeout();
    let mut ping_ticker = tokio::time::interval(app.config.ping_interval());
    ping_ticker.tick().await; // the first tick fires immediately; discard it

    loop {
        tokio::select! {
            _ = session.cancel.cancelled() => {
                break;
            }
            _ = ping_ticker.tick() => {
                if idle_elapsed(&session, idle_timeout) {
                    info!(session_id = %session.id, "liveness timeout; closing session");
                    break;
                }
                if write_ws(&mut ws_tx, WsMessage::Ping(Default::default()), write_deadline).await.is_err() {
                    break;
                }
            }
            frame = write_rx.recv() => {
                match frame {
                    Some(OutFrame::Frame(wire)) => {
                        let Ok(json) = serde_json::to_string(&wire) else { continue };
                        if write_ws(&mut ws_tx, WsMessage::Text(json.into()), write_deadline).await.is_err() {
                            break;
                        }
                    }
                    Some(OutFrame::Ping) => {
                        if write_ws(&mut ws_tx, WsMessage::Ping(Default::default()), write_deadline).await.is_err() {
                            break;
                        }
                    }
                    Some(OutFrame::Close) | None => break,
                }
            }
            incoming = ws_rx.next() => {
                match incoming {
                    Some(Ok(WsMessage::Text(text))) => {
                        session.touch();
                        handle_client_frame(&app, &session, &text).await;
                    }
                    Some(Ok(WsMessage::Pong(_))) => {
                        session.touch();
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(session_id = %session.id, error = %e, "read error; closing session");
                        break;
                    }
                }
            }
        }
    }

    let _ = ws_tx.send(WsMessage::Close(None)).await;
    close_session(&app, &session).await;
}

fn idle_elapsed(session: &Session, idle_timeout: Duration) -> bool {
    now_ms().saturating_sub(session.last_activity_ms()) > idle_timeout.as_millis() as i64
}

async fn write_ws(
    ws_tx: &mut SplitSink<WebSocket, WsMessage>,
    msg: WsMessage,
    deadline: Duration,
) -> Result<(), ()> {
    match tokio::time::timeout(deadline, ws_tx.send(msg)).await {
        Ok(Ok(())) => Ok(()),
        _ => Err(()),
    }
}

/// Handle one parsed client frame (§4.5 reader responsibilities). Unknown
/// types, and frames with no recognized handling, are logged and dropped.
async fn handle_client_frame(app: &Arc<App>, session: &Arc<Session>, text: &str) {
    let frame: WireFrame = match serde_json::from_str(text) {
        Ok(f) => f,
        Err(e) => {
            debug!(session_id = %session.id, error = %e, "dropping malformed client frame");
            return;
        }
    };

    if frame.kind == MessageType::Heartbeat {
        let reply = WireFrame {
            id: frame.id,
            kind: MessageType::Heartbeat,
            room: None,
            from: Some(session.id.clone()),
            to: None,
            data: serde_json::Value::Null,
            timestamp: iso8601_now(),
        };
        session.enqueue(OutFrame::Frame(reply));
        return;
    }

    let Some(room_id) = frame.room.clone() else {
        debug!(session_id = %session.id, kind = ?frame.kind, "dropping frame with no recognized handling");
        return;
    };

    if !app.rooms.has_member(&room_id, &session.id).await {
        let err_frame = WireFrame {
            id: None,
            kind: MessageType::Error,
            room: Some(room_id),
            from: None,
            to: None,
            data: serde_json::json!({"code": "NOT_FOUND", "message": "not a member of this room"}),
            timestamp: iso8601_now(),
        };
        session.enqueue(OutFrame::Frame(err_frame));
        return;
    }

    let msg = Message::new(frame.kind, Target::ToRoom(room_id), frame.data, iso8601_now()).with_from(session.id.clone());
    if let Err(e) = app.dispatcher.route(msg, false).await {
        warn!(session_id = %session.id, error = %e, "room dispatch failed");
    }
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Idempotent cleanup path (§4.5, §8 law 6): vacate every room, remove
/// from the session registry, and GC the personal room if this was the
/// user's last local session. Shared by the normal close path and the
/// liveness sweeper so both funnel through the same gate.
pub async fn close_session(app: &App, session: &Session) {
    if !session.mark_closed() {
        return;
    }
    session.cancel.cancel();

    for room_id in app.rooms.rooms_of(&session.id).await {
        app.rooms.leave(&room_id, &session.id).await;
    }
    app.sessions.remove(&session.id).await;
    app.rooms.gc_personal_if_empty(&session.user_id).await;
    app.instance.stats.session_closed();
    info!(session_id = %session.id, user_id = %session.user_id, "session closed");
}
