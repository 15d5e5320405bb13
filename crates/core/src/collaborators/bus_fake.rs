// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process `PubSubBus` backed by a shared `tokio::sync::broadcast`
//! channel (§9: dependency injection exists so tests can run two
//! `InstanceState`s in one process without a real NATS server, S1/S5/S9).

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::CoreError;
use crate::model::BusEnvelope;

use super::{BusSubscription, PubSubBus};

/// Clone to hand the same underlying channel to multiple fake instances.
#[derive(Clone)]
pub struct FakeBus {
    tx: broadcast::Sender<BusEnvelope>,
}

impl FakeBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(1024);
        Self { tx }
    }
}

impl Default for FakeBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PubSubBus for FakeBus {
    async fn publish(&self, _subject_suffix: &str, envelope: &BusEnvelope) -> Result<(), CoreError> {
        // No subscribers is not an error: mirrors NATS fire-and-forget semantics.
        let _ = self.tx.send(envelope.clone());
        Ok(())
    }

    async fn subscribe_all(&self) -> Result<Box<dyn BusSubscription>, CoreError> {
        Ok(Box::new(FakeSubscription { inner: self.tx.subscribe() }))
    }
}

struct FakeSubscription {
    inner: broadcast::Receiver<BusEnvelope>,
}

#[async_trait]
impl BusSubscription for FakeSubscription {
    async fn recv(&mut self) -> Option<BusEnvelope> {
        loop {
            match self.inner.recv().await {
                Ok(envelope) => return Some(envelope),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
