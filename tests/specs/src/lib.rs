// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end integration tests against the real
//! `relaymesh` HTTP/WebSocket surface.
//!
//! Rather than spawning a subprocess, each test builds a complete `App` +
//! axum router in-process and binds it to an ephemeral loopback port. This
//! keeps multi-instance scenarios (two `App`s sharing one bus) cheap to set
//! up while still exercising the real wire transport.

use std::sync::Arc;

use clap::Parser;
use relaymesh::app::App;
use relaymesh::collaborators::{AuthIdentity, FakeBus, FakeGroupDirectory, MemoryKvStore, PubSubBus, StaticAuthValidator};
use relaymesh::config::Config;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_util::sync::CancellationToken;

pub const TEST_ORIGIN: &str = "http://relaymesh.test";
pub const ADMIN_TOKEN: &str = "test-admin-token";

/// One running `relaymesh` instance, bound to an ephemeral port in this
/// process, torn down via cancellation on drop.
pub struct TestInstance {
    pub app: Arc<App>,
    pub addr: std::net::SocketAddr,
    shutdown: CancellationToken,
}

impl TestInstance {
    /// Start an instance with the given pre-seeded identities, sharing
    /// `bus` and `groups` with any other instance constructed the same way
    /// (pass clones of the same `FakeBus`/`Arc<FakeGroupDirectory>` to model
    /// a two-instance deployment).
    pub async fn start(identities: Vec<(&str, AuthIdentity)>, groups: Arc<FakeGroupDirectory>, bus: FakeBus) -> Self {
        Self::start_with_timing(identities, groups, bus, 30, 60).await
    }

    /// Like `start`, but with an overridden ping interval and idle timeout,
    /// for exercising the liveness sweep without waiting out realistic
    /// production timings.
    pub async fn start_with_timing(
        identities: Vec<(&str, AuthIdentity)>,
        groups: Arc<FakeGroupDirectory>,
        bus: FakeBus,
        ping_interval_secs: u64,
        idle_timeout_secs: u64,
    ) -> Self {
        let shutdown = CancellationToken::new();
        let config = Config::parse_from([
            "relaymesh",
            "--admin-token",
            ADMIN_TOKEN,
            "--allowed-origins",
            TEST_ORIGIN,
            "--ping-interval-secs",
            &ping_interval_secs.to_string(),
            "--idle-timeout-secs",
            &idle_timeout_secs.to_string(),
            "--sweeper-interval-secs",
            "3600",
        ]);

        let mut auth = StaticAuthValidator::new();
        for (token, identity) in identities {
            auth = auth.with_token(token, identity);
        }

        let app = App::new(
            config,
            Arc::new(auth),
            groups,
            Arc::new(bus) as Arc<dyn PubSubBus>,
            Arc::new(MemoryKvStore::new()),
            shutdown.clone(),
        )
        .await;

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind ephemeral port");
        let addr = listener.local_addr().expect("local addr");
        let router = relaymesh::transport::build_router(Arc::clone(&app));
        let serve_shutdown = shutdown.clone();
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).with_graceful_shutdown(serve_shutdown.cancelled_owned()).await;
        });

        Self { app, addr, shutdown }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    /// Open a WebSocket connection authenticated as `token`, with the
    /// allowed test origin attached.
    pub async fn connect(&self, token: &str) -> tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>> {
        let mut request = self.ws_url().into_client_request().expect("valid ws request");
        request.headers_mut().insert("origin", HeaderValue::from_str(TEST_ORIGIN).expect("valid origin header"));
        request.headers_mut().insert("authorization", HeaderValue::from_str(&format!("Bearer {token}")).expect("valid bearer header"));
        let (ws, _resp) = tokio_tungstenite::connect_async(request).await.expect("ws connect");
        ws
    }

    pub fn admin_client(&self) -> reqwest::Client {
        reqwest::Client::new()
    }
}

impl Drop for TestInstance {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Read the next text frame off a WebSocket, parsed as JSON, skipping
/// control frames other than close.
pub async fn next_json_frame(
    ws: &mut tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
) -> Option<serde_json::Value> {
    use futures_util::StreamExt;
    loop {
        match ws.next().await? {
            Ok(tokio_tungstenite::tungstenite::Message::Text(t)) => {
                return serde_json::from_str(&t).ok();
            }
            Ok(tokio_tungstenite::tungstenite::Message::Close(_)) => return None,
            Ok(_) => continue,
            Err(_) => return None,
        }
    }
}
