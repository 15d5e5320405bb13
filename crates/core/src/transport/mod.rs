// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP + WebSocket transport: the upgrade endpoint (§6.1) and the
//! administrative HTTP surface (§6.3).

pub mod admin;
pub mod auth;
pub mod ws;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::app::App;

/// Build the complete axum `Router` for one instance.
pub fn build_router(app: Arc<App>) -> Router {
    let upgrade_path = app.config.internal_upgrade_path.clone();

    let admin_routes = Router::new()
        .route("/ws/sessions", get(admin::list_sessions))
        .route("/ws/sessions/{id}", get(admin::get_session))
        .route("/ws/rooms", get(admin::list_rooms))
        .route("/ws/rooms/{id}", get(admin::get_room))
        .route("/ws/broadcast", post(admin::broadcast))
        .route("/ws/sessions/{id}/message", post(admin::send_to_session))
        .route("/ws/users/{user_id}/message", post(admin::send_to_user))
        .route("/ws/rooms/{id}/message", post(admin::send_to_room))
        .layer(middleware::from_fn_with_state(Arc::clone(&app), auth::admin_auth_layer));

    Router::new()
        .route(&upgrade_path, get(ws::upgrade_handler))
        .route("/ws/status", get(admin::status))
        .merge(admin_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app)
}
