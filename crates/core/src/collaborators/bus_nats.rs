// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! NATS-backed `PubSubBus` (C3, §4.3): one subject per bus-prefix, envelopes
//! carried as JSON. Publishing is best-effort with a bounded deadline;
//! callers decide how to react to a publish failure (§7 `Bus` errors never
//! block local delivery).

use async_trait::async_trait;
use async_nats::Client;
use futures_util::StreamExt;
use tracing::warn;

use crate::error::CoreError;
use crate::model::BusEnvelope;

use super::{BusSubscription, PubSubBus};

pub struct NatsBus {
    client: Client,
    prefix: String,
    publish_timeout: std::time::Duration,
}

impl NatsBus {
    pub async fn connect(dsn: &str, prefix: &str, publish_timeout: std::time::Duration) -> Result<Self, CoreError> {
        let client = async_nats::connect(dsn)
            .await
            .map_err(|e| CoreError::Bus(format!("failed to connect to bus at {dsn}: {e}")))?;
        Ok(Self { client, prefix: prefix.to_owned(), publish_timeout })
    }

    fn subject(&self, suffix: &str) -> String {
        format!("{}.{}", self.prefix, suffix)
    }
}

#[async_trait]
impl PubSubBus for NatsBus {
    async fn publish(&self, subject_suffix: &str, envelope: &BusEnvelope) -> Result<(), CoreError> {
        let payload = serde_json::to_vec(envelope).map_err(|e| CoreError::Bus(format!("encode envelope: {e}")))?;
        let subject = self.subject(subject_suffix);
        tokio::time::timeout(self.publish_timeout, self.client.publish(subject.clone(), payload.into()))
            .await
            .map_err(|_| CoreError::Bus(format!("publish to {subject} timed out")))?
            .map_err(|e| CoreError::Bus(format!("publish to {subject} failed: {e}")))
    }

    async fn subscribe_all(&self) -> Result<Box<dyn BusSubscription>, CoreError> {
        let wildcard = format!("{}.>", self.prefix);
        let sub = self
            .client
            .subscribe(wildcard.clone())
            .await
            .map_err(|e| CoreError::Bus(format!("subscribe to {wildcard} failed: {e}")))?;
        Ok(Box::new(NatsSubscription { inner: sub }))
    }
}

struct NatsSubscription {
    inner: async_nats::Subscriber,
}

#[async_trait]
impl BusSubscription for NatsSubscription {
    async fn recv(&mut self) -> Option<BusEnvelope> {
        loop {
            let msg = self.inner.next().await?;
            match serde_json::from_slice::<BusEnvelope>(&msg.payload) {
                Ok(envelope) => return Some(envelope),
                Err(e) => {
                    warn!(subject = %msg.subject, "dropping malformed bus envelope: {e}");
                    continue;
                }
            }
        }
    }
}
