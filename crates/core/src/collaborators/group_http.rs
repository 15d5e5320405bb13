// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `GroupDirectory` adapters: an HTTP point-query service polled for
//! membership diffs, and an in-memory push-based fake for tests.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::{mpsc, Mutex};
use tracing::warn;

use crate::error::CoreError;

use super::{GroupChangeEvent, GroupDirectory, GroupMembership};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const POLL_INTERVAL: Duration = Duration::from_secs(15);

pub struct HttpGroupDirectory {
    client: reqwest::Client,
    base_url: String,
    /// Characters actively watched for membership diffs, seeded as sessions
    /// join (§4.4: the resolver only cares about characters with live sessions).
    watched: Arc<Mutex<HashSet<i64>>>,
}

#[derive(Debug, Deserialize)]
struct GroupsResponse {
    groups: Vec<GroupMembershipWire>,
}

#[derive(Debug, Deserialize)]
struct GroupMembershipWire {
    group_id: String,
    group_name: String,
}

impl HttpGroupDirectory {
    pub fn new(base_url: &str) -> Self {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build().unwrap_or_default();
        Self { client, base_url: base_url.trim_end_matches('/').to_owned(), watched: Arc::new(Mutex::new(HashSet::new())) }
    }

    pub async fn watch(&self, character_id: i64) {
        self.watched.lock().await.insert(character_id);
    }

    pub async fn unwatch(&self, character_id: i64) {
        self.watched.lock().await.remove(&character_id);
    }
}

#[async_trait]
impl GroupDirectory for HttpGroupDirectory {
    async fn groups_for_character(&self, character_id: i64) -> Result<Vec<GroupMembership>, CoreError> {
        let url = format!("{}/characters/{}/groups", self.base_url, character_id);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| CoreError::Transport(format!("group directory unreachable: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            return Err(CoreError::Transport(format!("group directory returned HTTP {status}")));
        }

        let body: GroupsResponse =
            resp.json().await.map_err(|e| CoreError::Transport(format!("malformed group directory response: {e}")))?;
        Ok(body.groups.into_iter().map(|g| GroupMembership { group_id: g.group_id, group_name: g.group_name }).collect())
    }

    fn subscribe_changes(&self) -> mpsc::UnboundedReceiver<GroupChangeEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let client = self.client.clone();
        let base_url = self.base_url.clone();
        let watched = Arc::clone(&self.watched);

        tokio::spawn(async move {
            let mut last_seen: HashMap<i64, HashSet<String>> = HashMap::new();
            loop {
                tokio::time::sleep(POLL_INTERVAL).await;
                let characters: Vec<i64> = watched.lock().await.iter().copied().collect();
                for character_id in characters {
                    let url = format!("{base_url}/characters/{character_id}/groups");
                    let current = match client.get(&url).send().await {
                        Ok(resp) if resp.status().is_success() => {
                            match resp.json::<GroupsResponse>().await {
                                Ok(body) => body.groups,
                                Err(e) => {
                                    warn!(character_id, "malformed group poll response: {e}");
                                    continue;
                                }
                            }
                        }
                        Ok(resp) => {
                            warn!(character_id, status = %resp.status(), "group poll failed");
                            continue;
                        }
                        Err(e) => {
                            warn!(character_id, "group poll unreachable: {e}");
                            continue;
                        }
                    };

                    let current_ids: HashSet<String> = current.iter().map(|g| g.group_id.clone()).collect();
                    let previous_ids = last_seen.get(&character_id).cloned().unwrap_or_default();

                    for g in &current {
                        if !previous_ids.contains(&g.group_id) {
                            let event = GroupChangeEvent {
                                character_id,
                                group_id: g.group_id.clone(),
                                group_name: g.group_name.clone(),
                                joined: true,
                            };
                            if tx.send(event).is_err() {
                                return;
                            }
                        }
                    }
                    for group_id in previous_ids.difference(&current_ids) {
                        let event = GroupChangeEvent {
                            character_id,
                            group_id: group_id.clone(),
                            group_name: String::new(),
                            joined: false,
                        };
                        if tx.send(event).is_err() {
                            return;
                        }
                    }

                    last_seen.insert(character_id, current_ids);
                }
            }
        });

        rx
    }
}

/// In-memory push-based directory for tests: `push_change` delivers an
/// event immediately rather than waiting on a poll cycle.
#[derive(Default)]
pub struct FakeGroupDirectory {
    memberships: Mutex<HashMap<i64, Vec<GroupMembership>>>,
    senders: std::sync::Mutex<Vec<mpsc::UnboundedSender<GroupChangeEvent>>>,
}

impl FakeGroupDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed(&self, character_id: i64, groups: Vec<GroupMembership>) {
        self.memberships.lock().await.insert(character_id, groups);
    }

    pub async fn push_change(&self, event: GroupChangeEvent) {
        let mut memberships = self.memberships.lock().await;
        let entry = memberships.entry(event.character_id).or_default();
        if event.joined {
            entry.push(GroupMembership { group_id: event.group_id.clone(), group_name: event.group_name.clone() });
        } else {
            entry.retain(|m| m.group_id != event.group_id);
        }
        drop(memberships);

        let senders = self.senders.lock().unwrap_or_else(|e| e.into_inner());
        for tx in senders.iter() {
            let _ = tx.send(event.clone());
        }
    }
}

#[async_trait]
impl GroupDirectory for FakeGroupDirectory {
    async fn groups_for_character(&self, character_id: i64) -> Result<Vec<GroupMembership>, CoreError> {
        Ok(self.memberships.lock().await.get(&character_id).cloned().unwrap_or_default())
    }

    fn subscribe_changes(&self) -> mpsc::UnboundedReceiver<GroupChangeEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut senders = self.senders.lock().unwrap_or_else(|e| e.into_inner());
        senders.push(tx);
        rx
    }
}
