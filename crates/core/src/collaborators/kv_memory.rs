// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory `KvStore` (C9 collaborator, §4.9). The spec is explicit that
//! losing this store has no delivery-correctness impact, so there is no
//! production adapter here beyond this process-local map; a deployment
//! that wants a durable mirror points a different implementation of the
//! trait at whatever store it already operates.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::KvStore;

struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

#[derive(Default)]
pub struct MemoryKvStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn put(&self, key: &str, value: Value, ttl_secs: Option<u64>) {
        let expires_at = ttl_secs.map(|secs| Instant::now() + Duration::from_secs(secs));
        self.entries.write().await.insert(key.to_owned(), Entry { value, expires_at });
    }

    async fn get(&self, key: &str) -> Option<Value> {
        // Lazy-sweep on read: an expired entry is removed on the access
        // that discovers it rather than via a background task.
        let expired = {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) => entry.expires_at.map(|at| Instant::now() >= at).unwrap_or(false),
                None => return None,
            }
        };
        if expired {
            self.entries.write().await.remove(key);
            return None;
        }
        self.entries.read().await.get(key).map(|e| e.value.clone())
    }
}
