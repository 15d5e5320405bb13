// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-process identity and monotonic counters (§3 `InstanceState`).

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Process-wide identity and stats, threaded into every component at
/// construction time rather than held as ambient statics, so multiple
/// logical instances can share one process for tests (§9 design note).
pub struct InstanceState {
    pub instance_id: String,
    pub stats: Stats,
}

impl InstanceState {
    pub fn new() -> Self {
        Self { instance_id: Uuid::new_v4().to_string(), stats: Stats::default() }
    }
}

impl Default for InstanceState {
    fn default() -> Self {
        Self::new()
    }
}

/// Monotonic counters and gauges (§3, §5).
#[derive(Default)]
pub struct Stats {
    pub total_sessions_ever: AtomicU64,
    pub active_sessions: AtomicU64,
    pub active_rooms: AtomicU64,
    pub messages_accepted: AtomicU64,
    pub messages_fanned_out: AtomicU64,
    pub last_session_opened_at_ms: AtomicI64,
}

impl Stats {
    pub fn session_opened(&self) {
        self.total_sessions_ever.fetch_add(1, Ordering::Relaxed);
        self.active_sessions.fetch_add(1, Ordering::Relaxed);
        self.last_session_opened_at_ms.store(now_ms(), Ordering::Relaxed);
    }

    pub fn session_closed(&self) {
        self.active_sessions.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn room_created(&self) {
        self.active_rooms.fetch_add(1, Ordering::Relaxed);
    }

    pub fn room_removed(&self) {
        self.active_rooms.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn message_accepted(&self) {
        self.messages_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_fanned_out(&self, count: u64) {
        self.messages_fanned_out.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_sessions_ever: self.total_sessions_ever.load(Ordering::Relaxed),
            active_sessions: self.active_sessions.load(Ordering::Relaxed),
            active_rooms: self.active_rooms.load(Ordering::Relaxed),
            messages_accepted: self.messages_accepted.load(Ordering::Relaxed),
            messages_fanned_out: self.messages_fanned_out.load(Ordering::Relaxed),
            last_session_opened_at_ms: self.last_session_opened_at_ms.load(Ordering::Relaxed),
        }
    }
}

/// Serializable snapshot of `Stats`, for the admin status endpoint and the
/// observability mirror.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub total_sessions_ever: u64,
    pub active_sessions: u64,
    pub active_rooms: u64,
    pub messages_accepted: u64,
    pub messages_fanned_out: u64,
    pub last_session_opened_at_ms: i64,
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_ids_are_unique() {
        let a = InstanceState::new();
        let b = InstanceState::new();
        assert_ne!(a.instance_id, b.instance_id);
    }

    #[test]
    fn stats_track_session_cardinality() {
        let stats = Stats::default();
        stats.session_opened();
        stats.session_opened();
        stats.session_closed();
        let snap = stats.snapshot();
        assert_eq!(snap.total_sessions_ever, 2);
        assert_eq!(snap.active_sessions, 1);
    }
}
