// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error taxonomy for the messaging core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoreError {
    Validation(String),
    Auth(String),
    NotFound(String),
    Bus(String),
    Transport(String),
    Invariant(String),
}

impl CoreError {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::Auth(_) => 401,
            Self::NotFound(_) => 404,
            Self::Bus(_) => 502,
            Self::Transport(_) => 500,
            Self::Invariant(_) => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION",
            Self::Auth(_) => "AUTH",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Bus(_) => "BUS",
            Self::Transport(_) => "TRANSPORT",
            Self::Invariant(_) => "INVARIANT",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Validation(m)
            | Self::Auth(m)
            | Self::NotFound(m)
            | Self::Bus(m)
            | Self::Transport(m)
            | Self::Invariant(m) => m,
        }
    }

    pub fn to_error_body(&self) -> ErrorBody {
        ErrorBody { code: self.as_str().to_owned(), message: self.message().to_owned() }
    }

    pub fn to_http_response(&self) -> (StatusCode, Json<ErrorResponse>) {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(ErrorResponse { error: self.to_error_body() }))
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.as_str(), self.message())
    }
}

impl std::error::Error for CoreError {}

impl axum::response::IntoResponse for CoreError {
    fn into_response(self) -> axum::response::Response {
        self.to_http_response().into_response()
    }
}

/// Top-level error response envelope, shared by the admin HTTP surface and
/// the `error`-typed client frame path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}
