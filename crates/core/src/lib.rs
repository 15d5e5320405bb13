// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Relaymesh: real-time messaging core for a multi-instance WebSocket deployment.

pub mod app;
pub mod collaborators;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod instance;
pub mod membership;
pub mod model;
pub mod observability;
pub mod registry;
pub mod session_loop;
pub mod sweeper;
pub mod transport;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::app::App;
use crate::collaborators::{
    AuthValidator, FakeBus, FakeGroupDirectory, GroupDirectory, HttpAuthValidator, HttpGroupDirectory, MemoryKvStore,
    NatsBus, PubSubBus,
};
use crate::config::Config;
use crate::model::Message;
use crate::transport::build_router;

/// Run the messaging core until shutdown.
pub async fn run(config: Config) -> anyhow::Result<()> {
    if config.allowed_origins_list().is_empty() {
        warn!("RELAYMESH_ALLOWED_ORIGINS is empty; every WebSocket upgrade will be rejected (§6.4)");
    }

    let addr = format!("{}:{}", config.host, config.port);
    let shutdown = CancellationToken::new();

    let auth: Arc<dyn AuthValidator> = match &config.auth_validator_url {
        Some(url) => Arc::new(HttpAuthValidator::new(url)),
        None => {
            warn!("no auth validator URL configured; falling back to a static (no-op) validator");
            Arc::new(crate::collaborators::StaticAuthValidator::new())
        }
    };

    let groups: Arc<dyn GroupDirectory> = match &config.group_directory_url {
        Some(url) => Arc::new(HttpGroupDirectory::new(url)),
        None => {
            warn!("no group directory URL configured; group rooms will never be populated");
            Arc::new(FakeGroupDirectory::new())
        }
    };

    let bus: Arc<dyn PubSubBus> = if config.bus_dsn.is_empty() {
        warn!("no bus DSN configured; running single-instance with an in-process bus");
        Arc::new(FakeBus::new())
    } else {
        Arc::new(NatsBus::connect(&config.bus_dsn, &config.bus_prefix, config.bus_publish_timeout()).await?)
    };

    let kv = Arc::new(MemoryKvStore::new());

    let app = App::new(config, auth, groups, bus, kv, shutdown.clone()).await;

    spawn_bus_listener(Arc::clone(&app));
    spawn_group_change_listener(Arc::clone(&app));
    sweeper::spawn(Arc::clone(&app));
    observability::spawn(Arc::clone(&app));

    info!(instance_id = %app.instance.instance_id, %addr, "relaymesh listening");

    let router = build_router(Arc::clone(&app));
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;

    Ok(())
}

/// Drain the bus, re-dispatching every envelope not originated by this
/// instance locally only (§4.3: cross-instance delivery never re-publishes).
fn spawn_bus_listener(app: Arc<App>) {
    tokio::spawn(async move {
        let mut sub = match app.bus.subscribe_all().await {
            Ok(sub) => sub,
            Err(e) => {
                warn!(error = %e, "failed to subscribe to bus; cross-instance delivery is disabled");
                return;
            }
        };

        loop {
            tokio::select! {
                _ = app.shutdown.cancelled() => break,
                envelope = sub.recv() => {
                    let Some(envelope) = envelope else { break };
                    if envelope.origin_instance_id == app.instance.instance_id {
                        continue;
                    }
                    let msg = Message::from(envelope.message);
                    if let Err(e) = app.dispatcher.route(msg, true).await {
                        warn!(error = %e, "failed to route inbound bus envelope");
                    }
                }
            }
        }
    });
}

/// Drain group-change events and reconcile local sessions for the affected
/// character (§4.4).
fn spawn_group_change_listener(app: Arc<App>) {
    let mut rx = app.groups.subscribe_changes();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = app.shutdown.cancelled() => break,
                event = rx.recv() => {
                    let Some(event) = event else { break };
                    app.membership.on_group_change(event).await;
                }
            }
        }
    });
}
