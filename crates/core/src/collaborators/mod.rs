// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! External collaborator traits (§1, §9): the messaging core depends on
//! these abstractly so production adapters (HTTP, NATS) and test doubles
//! (in-process fakes) can be swapped without touching the core logic.

pub mod auth_http;
pub mod bus_fake;
pub mod bus_nats;
pub mod group_http;
pub mod kv_memory;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::CoreError;
use crate::model::BusEnvelope;

pub use auth_http::{HttpAuthValidator, StaticAuthValidator};
pub use bus_fake::FakeBus;
pub use bus_nats::NatsBus;
pub use group_http::{FakeGroupDirectory, HttpGroupDirectory};
pub use kv_memory::MemoryKvStore;

/// Validates a bearer credential presented by a connecting client (§4.1, §6.1).
#[async_trait]
pub trait AuthValidator: Send + Sync {
    async fn validate(&self, token: &str) -> Result<AuthIdentity, CoreError>;
}

/// The identity a validated credential resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthIdentity {
    pub user_id: String,
    pub character_id: i64,
    pub character_name: String,
}

/// Resolves and streams group membership for a user's active character
/// (C4 `MembershipResolver` collaborator, §4.4).
#[async_trait]
pub trait GroupDirectory: Send + Sync {
    /// Point-query: groups this character currently belongs to.
    async fn groups_for_character(&self, character_id: i64) -> Result<Vec<GroupMembership>, CoreError>;

    /// Subscribe to membership change events for every character. The
    /// returned receiver is forwarded from a background task so the
    /// `MembershipResolver` never holds a direct dependency on the
    /// directory's own transport (HTTP long-poll, webhook, etc).
    fn subscribe_changes(&self) -> tokio::sync::mpsc::UnboundedReceiver<GroupChangeEvent>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMembership {
    pub group_id: String,
    pub group_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupChangeEvent {
    pub character_id: i64,
    pub group_id: String,
    pub group_name: String,
    pub joined: bool,
}

/// Cross-instance pub/sub transport (C3 `PubSubGateway` collaborator, §4.3).
#[async_trait]
pub trait PubSubBus: Send + Sync {
    async fn publish(&self, subject_suffix: &str, envelope: &BusEnvelope) -> Result<(), CoreError>;

    /// Subscribe to every subject under this bus's prefix; returns owned
    /// envelopes as they arrive. The subscription runs until the returned
    /// handle is dropped.
    async fn subscribe_all(&self) -> Result<Box<dyn BusSubscription>, CoreError>;
}

#[async_trait]
pub trait BusSubscription: Send {
    /// Await the next envelope, or `None` once the subscription ends.
    async fn recv(&mut self) -> Option<BusEnvelope>;
}

/// Best-effort observability sink (C9 `ObservabilityMirror` collaborator, §4.9).
/// The spec is explicit that losing this store has no delivery-correctness
/// impact, so a production deployment may point it anywhere cheap.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn put(&self, key: &str, value: Value, ttl_secs: Option<u64>);
    async fn get(&self, key: &str) -> Option<Value>;
}
