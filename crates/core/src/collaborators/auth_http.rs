// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `AuthValidator` adapters: an HTTP point-query to an external identity
//! service, and a static double for tests that don't need one.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::CoreError;

use super::{AuthIdentity, AuthValidator};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct HttpAuthValidator {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAuthValidator {
    pub fn new(base_url: &str) -> Self {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build().unwrap_or_default();
        Self { client, base_url: base_url.trim_end_matches('/').to_owned() }
    }
}

#[derive(Debug, Deserialize)]
struct ValidateResponse {
    user_id: String,
    character_id: i64,
    character_name: String,
}

#[async_trait]
impl AuthValidator for HttpAuthValidator {
    async fn validate(&self, token: &str) -> Result<AuthIdentity, CoreError> {
        let url = format!("{}/validate", self.base_url);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| CoreError::Auth(format!("auth validator unreachable: {e}")))?;

        if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(CoreError::Auth("credential rejected".into()));
        }
        if !resp.status().is_success() {
            let status = resp.status();
            return Err(CoreError::Auth(format!("auth validator returned HTTP {status}")));
        }

        let body: ValidateResponse =
            resp.json().await.map_err(|e| CoreError::Auth(format!("malformed auth validator response: {e}")))?;
        Ok(AuthIdentity { user_id: body.user_id, character_id: body.character_id, character_name: body.character_name })
    }
}

/// Fixed token-to-identity table, for tests that exercise the upgrade path
/// without standing up an HTTP service.
#[derive(Default)]
pub struct StaticAuthValidator {
    identities: HashMap<String, AuthIdentity>,
}

impl StaticAuthValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: impl Into<String>, identity: AuthIdentity) -> Self {
        self.identities.insert(token.into(), identity);
        self
    }
}

#[async_trait]
impl AuthValidator for StaticAuthValidator {
    async fn validate(&self, token: &str) -> Result<AuthIdentity, CoreError> {
        self.identities.get(token).cloned().ok_or_else(|| CoreError::Auth("credential rejected".into()))
    }
}
