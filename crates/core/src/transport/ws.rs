// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transport upgrade endpoint (§6.1): validates origin and credential, then
//! starts the session lifecycle described in §4.5.

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use crate::app::App;
use crate::error::CoreError;
use crate::model::{iso8601_now, MessageType, WireFrame};
use crate::registry::session::{OutFrame, Session, WRITE_LANE_CAPACITY};
use crate::session_loop::run_session;
use crate::transport::auth::{extract_credential, forbidden_origin_response, origin_allowed};

/// `GET {internal_upgrade_path}` — upgrades to the persistent bidirectional
/// session transport (§6.1).
pub async fn upgrade_handler(State(app): State<Arc<App>>, headers: HeaderMap, ws: WebSocketUpgrade) -> impl IntoResponse {
    if !origin_allowed(&app.config.allowed_origins_list(), &headers) {
        return forbidden_origin_response();
    }

    let Some(token) = extract_credential(&headers, &app.config.auth_cookie_name) else {
        return CoreError::Auth("missing credential".into()).into_response();
    };

    let identity = match app.auth.validate(&token).await {
        Ok(identity) => identity,
        Err(e) => return e.into_response(),
    };

    ws.on_upgrade(move |socket| async move {
        let session_id = Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::channel(WRITE_LANE_CAPACITY);
        let session = Arc::new(Session::new(
            session_id.clone(),
            identity.user_id.clone(),
            identity.character_id,
            identity.character_name.clone(),
            tx,
            CancellationToken::new(),
        ));

        if let Err(e) = app.sessions.add(Arc::clone(&session)).await {
            tracing::warn!(session_id = %session_id, error = %e, "failed to register session");
            return;
        }
        app.instance.stats.session_opened();
        info!(session_id = %session_id, user_id = %identity.user_id, "session opened");

        let welcome = WireFrame {
            id: None,
            kind: MessageType::SystemNotification,
            room: None,
            from: None,
            to: None,
            data: serde_json::json!({"connection_id": session_id, "user_id": identity.user_id}),
            timestamp: iso8601_now(),
        };
        session.enqueue(OutFrame::Frame(welcome));

        app.membership.assign_initial(Arc::clone(&session)).await;

        run_session(Arc::clone(&app), session, socket, rx).await;
    })
    .into_response()
}
