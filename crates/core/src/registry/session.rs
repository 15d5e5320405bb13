// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session directory (C1, §4.1): authoritative in-memory directory of
//! sessions live on this instance.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::CoreError;
use crate::model::WireFrame;

/// Capacity of a session's write lane (§5 back-pressure). A session whose
/// client reads slower than the server writes fills this queue; the send
/// that overflows it closes the session instead of growing without bound.
pub const WRITE_LANE_CAPACITY: usize = 256;

/// A frame queued on a session's write lane. `Ping` and `Close` are
/// transport-level controls; `Frame` carries an application message.
#[derive(Debug, Clone)]
pub enum OutFrame {
    Frame(WireFrame),
    Ping,
    Close,
}

/// A live bidirectional session to one client (§3).
///
/// Room membership is not tracked here: `RoomRegistry` owns the
/// authoritative session-to-rooms reverse index (`rooms_of`/`has_member`),
/// so callers that need a session's rooms go through the registry rather
/// than a copy kept on the session itself.
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub character_id: i64,
    pub character_name: String,
    pub created_at_ms: i64,
    last_activity_ms: AtomicI64,
    closed: AtomicBool,
    write_lane: mpsc::Sender<OutFrame>,
    /// Cancelled exactly once, when the session's cleanup path runs.
    pub cancel: CancellationToken,
}

impl Session {
    pub fn new(
        id: String,
        user_id: String,
        character_id: i64,
        character_name: String,
        write_lane: mpsc::Sender<OutFrame>,
        cancel: CancellationToken,
    ) -> Self {
        let now = now_ms();
        Self {
            id,
            user_id,
            character_id,
            character_name,
            created_at_ms: now,
            last_activity_ms: AtomicI64::new(now),
            closed: AtomicBool::new(false),
            write_lane,
            cancel,
        }
    }

    pub fn touch(&self) {
        self.last_activity_ms.store(now_ms(), Ordering::Relaxed);
    }

    pub fn last_activity_ms(&self) -> i64 {
        self.last_activity_ms.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }

    /// Mark closed, returning `true` the first time (for idempotent cleanup).
    pub fn mark_closed(&self) -> bool {
        !self.closed.swap(true, Ordering::SeqCst)
    }

    /// Enqueue a frame on the write lane. Non-blocking: a full lane means
    /// the client is reading slower than we're writing, and the session is
    /// closed rather than left to grow an unbounded backlog (§5). A closed
    /// lane means the session's writer already exited; both cases drop the
    /// frame and report failure.
    pub fn enqueue(&self, frame: OutFrame) -> bool {
        match self.write_lane.try_send(frame) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(session_id = %self.id, "write lane overflowed, closing session");
                self.cancel.cancel();
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    pub fn public_view(&self) -> SessionView {
        SessionView {
            id: self.id.clone(),
            user_id: self.user_id.clone(),
            character_id: self.character_id,
            character_name: self.character_name.clone(),
            created_at_ms: self.created_at_ms,
            last_activity_ms: self.last_activity_ms(),
        }
    }
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Public, transport-free view of a session for the admin surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionView {
    pub id: String,
    pub user_id: String,
    pub character_id: i64,
    pub character_name: String,
    pub created_at_ms: i64,
    pub last_activity_ms: i64,
}

/// Filter parameters for `list sessions` (§6.3).
#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    pub user_id: Option<String>,
    pub character_id: Option<i64>,
}

#[derive(Default)]
pub struct SessionRegistry {
    by_id: RwLock<HashMap<String, Arc<Session>>>,
    by_user: RwLock<HashMap<String, HashSet<String>>>,
    by_character: RwLock<HashMap<i64, HashSet<String>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a session by id, updating reverse indexes atomically with the
    /// primary index. Fails with `ConflictErr`-equivalent if the id is
    /// already present (should not happen: ids are freshly generated).
    pub async fn add(&self, session: Arc<Session>) -> Result<(), CoreError> {
        let mut by_id = self.by_id.write().await;
        if by_id.contains_key(&session.id) {
            return Err(CoreError::Invariant(format!("session id already registered: {}", session.id)));
        }
        self.by_user.write().await.entry(session.user_id.clone()).or_default().insert(session.id.clone());
        self.by_character
            .write()
            .await
            .entry(session.character_id)
            .or_default()
            .insert(session.id.clone());
        by_id.insert(session.id.clone(), session);
        Ok(())
    }

    /// Remove a session from all indexes. Idempotent: returns `None` if
    /// already absent.
    pub async fn remove(&self, id: &str) -> Option<Arc<Session>> {
        let removed = self.by_id.write().await.remove(id)?;

        let mut by_user = self.by_user.write().await;
        if let Some(set) = by_user.get_mut(&removed.user_id) {
            set.remove(id);
            if set.is_empty() {
                by_user.remove(&removed.user_id);
            }
        }
        drop(by_user);

        let mut by_character = self.by_character.write().await;
        if let Some(set) = by_character.get_mut(&removed.character_id) {
            set.remove(id);
            if set.is_empty() {
                by_character.remove(&removed.character_id);
            }
        }

        Some(removed)
    }

    pub async fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.by_id.read().await.get(id).cloned()
    }

    pub async fn by_user(&self, user_id: &str) -> Vec<Arc<Session>> {
        let Some(ids) = self.by_user.read().await.get(user_id).cloned() else {
            return Vec::new();
        };
        let by_id = self.by_id.read().await;
        ids.iter().filter_map(|id| by_id.get(id).cloned()).collect()
    }

    pub async fn by_character(&self, character_id: i64) -> Vec<Arc<Session>> {
        let Some(ids) = self.by_character.read().await.get(&character_id).cloned() else {
            return Vec::new();
        };
        let by_id = self.by_id.read().await;
        ids.iter().filter_map(|id| by_id.get(id).cloned()).collect()
    }

    pub async fn all(&self) -> Vec<Arc<Session>> {
        self.by_id.read().await.values().cloned().collect()
    }

    pub async fn active_count(&self) -> usize {
        self.by_id.read().await.len()
    }

    pub async fn list_filtered(&self, filter: &SessionFilter) -> Vec<Arc<Session>> {
        if let Some(ref uid) = filter.user_id {
            let mut sessions = self.by_user(uid).await;
            if let Some(cid) = filter.character_id {
                sessions.retain(|s| s.character_id == cid);
            }
            return sessions;
        }
        if let Some(cid) = filter.character_id {
            return self.by_character(cid).await;
        }
        self.all().await
    }

    /// Best-effort send to one session. Returns 1 if delivered, 0 if the
    /// session is absent locally.
    pub async fn send(&self, id: &str, frame: &WireFrame) -> usize {
        match self.get(id).await {
            Some(session) => {
                if session.enqueue(OutFrame::Frame(frame.clone())) {
                    1
                } else {
                    warn!(session_id = %id, "write lane closed, dropping frame");
                    0
                }
            }
            None => 0,
        }
    }

    /// Best-effort send to every local session of a user. A zero-session
    /// user is not an error (§4.1 edge case); it simply returns 0.
    pub async fn send_user(&self, user_id: &str, frame: &WireFrame) -> usize {
        let sessions = self.by_user(user_id).await;
        let mut delivered = 0;
        for session in sessions {
            if session.enqueue(OutFrame::Frame(frame.clone())) {
                delivered += 1;
            }
        }
        delivered
    }

    pub async fn send_all(&self, frame: &WireFrame) -> usize {
        let sessions = self.all().await;
        let mut delivered = 0;
        for session in sessions {
            if session.enqueue(OutFrame::Frame(frame.clone())) {
                delivered += 1;
            }
        }
        delivered
    }
}
