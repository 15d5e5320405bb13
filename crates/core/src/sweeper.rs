// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Backstop liveness sweep (C8, §4.8). The per-session Pinger is the
//! primary liveness mechanism; this periodically catches anything it
//! missed and reuses the same idempotent cleanup path as a normal close.

use std::sync::Arc;

use tracing::debug;

use crate::app::App;
use crate::session_loop::close_session;

pub fn spawn(app: Arc<App>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(app.config.sweeper_interval());
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = app.shutdown.cancelled() => break,
                _ = ticker.tick() => sweep(&app).await,
            }
        }
    });
}

async fn sweep(app: &App) {
    let idle_ms = app.config.idle_timeout().as_millis() as i64;
    let now = now_ms();
    let mut reaped = 0usize;
    for session in app.sessions.all().await {
        if now.saturating_sub(session.last_activity_ms()) > idle_ms {
            close_session(app, &session).await;
            reaped += 1;
        }
    }
    if reaped > 0 {
        debug!(reaped, "liveness sweep reaped idle sessions");
    }
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
