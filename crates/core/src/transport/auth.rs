// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transport-level auth helpers: client credential extraction and origin
//! checking for the upgrade endpoint (§6.1), and the privileged-caller
//! bearer check for the admin surface (§4.7).

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::app::App;
use crate::error::{CoreError, ErrorBody, ErrorResponse};

/// Constant-time comparison, to avoid a timing side channel on the admin token.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}

/// Bearer token or named cookie, in that order of preference (§6.1).
pub fn extract_credential(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    if let Some(auth) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
        if let Some(token) = auth.strip_prefix("Bearer ") {
            return Some(token.to_owned());
        }
    }
    let cookie_header = headers.get("cookie").and_then(|v| v.to_str().ok())?;
    cookie_header.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == cookie_name).then(|| value.to_owned())
    })
}

/// Origin allow-list check (§6.1, §6.4): an empty list denies everything,
/// and a missing `Origin` header is never allowed.
pub fn origin_allowed(allowed: &[String], headers: &HeaderMap) -> bool {
    match headers.get("origin").and_then(|v| v.to_str().ok()) {
        Some(origin) => allowed.iter().any(|a| a == origin),
        None => false,
    }
}

pub fn forbidden_origin_response() -> Response {
    let body = ErrorResponse { error: ErrorBody { code: "AUTH".into(), message: "origin not allowed".into() } };
    (StatusCode::FORBIDDEN, Json(body)).into_response()
}

/// Axum middleware enforcing the privileged-caller bearer token on every
/// admin route (§4.7, §6.3). `/ws/status` is the one public admin-surface
/// route and is mounted outside this layer.
pub async fn admin_auth_layer(State(app): State<Arc<App>>, req: Request, next: Next) -> Response {
    let token = req.headers().get("authorization").and_then(|v| v.to_str().ok()).and_then(|h| h.strip_prefix("Bearer "));
    match token {
        Some(t) if constant_time_eq(t, &app.config.admin_token) => next.run(req).await,
        _ => CoreError::Auth("invalid admin credential".into()).into_response(),
    }
}
