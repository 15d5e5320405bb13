// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Best-effort asynchronous mirror of session/room/stats snapshots to the
//! KV store (C9, §4.9). Never on the data path: failures are logged and
//! otherwise invisible to callers.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::app::App;
use crate::registry::room::RoomFilter;

const MIRROR_INTERVAL: Duration = Duration::from_secs(10);
const SNAPSHOT_TTL_SECS: u64 = 3600;

pub fn spawn(app: Arc<App>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(MIRROR_INTERVAL);
        loop {
            tokio::select! {
                _ = app.shutdown.cancelled() => break,
                _ = ticker.tick() => mirror_once(&app).await,
            }
        }
    });
}

async fn mirror_once(app: &App) {
    let sessions: Vec<_> = app.sessions.all().await.iter().map(|s| s.public_view()).collect();
    let rooms = app.rooms.list_filtered(&RoomFilter::default()).await;
    let stats = app.instance.stats.snapshot();

    match serde_json::to_value(&sessions) {
        Ok(v) => app.kv.put("relaymesh:sessions", v, Some(SNAPSHOT_TTL_SECS)).await,
        Err(e) => warn!(error = %e, "failed to encode session snapshot"),
    }
    match serde_json::to_value(&rooms) {
        Ok(v) => app.kv.put("relaymesh:rooms", v, Some(SNAPSHOT_TTL_SECS)).await,
        Err(e) => warn!(error = %e, "failed to encode room snapshot"),
    }
    match serde_json::to_value(&stats) {
        Ok(v) => app.kv.put("relaymesh:stats", v, None).await,
        Err(e) => warn!(error = %e, "failed to encode stats snapshot"),
    }
}
