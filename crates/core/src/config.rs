// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

/// Configuration for one messaging-core instance.
#[derive(Debug, Clone, clap::Parser)]
pub struct Config {
    /// Host to bind on.
    #[arg(long, default_value = "127.0.0.1", env = "RELAYMESH_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 8900, env = "RELAYMESH_PORT")]
    pub port: u16,

    /// Advertised upgrade URL, for discovery endpoints only; does not affect routing.
    #[arg(long, env = "RELAYMESH_PUBLIC_UPGRADE_URL")]
    pub public_upgrade_url: Option<String>,

    /// HTTP path that performs the WebSocket upgrade.
    #[arg(long, default_value = "/ws", env = "RELAYMESH_UPGRADE_PATH")]
    pub internal_upgrade_path: String,

    /// Name of the auth cookie accepted as an alternative to the `Authorization` header.
    #[arg(long, default_value = "relaymesh_session", env = "RELAYMESH_AUTH_COOKIE_NAME")]
    pub auth_cookie_name: String,

    /// Comma-separated list of allowed WebSocket origins. Empty means deny-all.
    #[arg(long, default_value = "", env = "RELAYMESH_ALLOWED_ORIGINS")]
    pub allowed_origins: String,

    /// Pub/sub bus connection string (a NATS server URL).
    #[arg(long, default_value = "nats://127.0.0.1:4222", env = "RELAYMESH_BUS_DSN")]
    pub bus_dsn: String,

    /// Subject prefix used when addressing the pub/sub bus.
    #[arg(long, default_value = "relaymesh", env = "RELAYMESH_BUS_PREFIX")]
    pub bus_prefix: String,

    /// KV store DSN for observability snapshots. The in-memory adapter ignores this value.
    #[arg(long, default_value = "memory://", env = "RELAYMESH_OBSERVABILITY_STORE_DSN")]
    pub observability_store_dsn: String,

    /// Base URL of the HTTP service that validates bearer credentials.
    #[arg(long, env = "RELAYMESH_AUTH_VALIDATOR_URL")]
    pub auth_validator_url: Option<String>,

    /// Base URL of the HTTP service that serves group membership.
    #[arg(long, env = "RELAYMESH_GROUP_DIRECTORY_URL")]
    pub group_directory_url: Option<String>,

    /// Bearer token required of privileged (admin surface) callers.
    #[arg(long, env = "RELAYMESH_ADMIN_TOKEN")]
    pub admin_token: String,

    /// Ping interval, seconds.
    #[arg(long, default_value_t = 30, env = "RELAYMESH_PING_INTERVAL_SECS")]
    pub ping_interval_secs: u64,

    /// Idle timeout, seconds; a session with no observed activity for this long is closed.
    #[arg(long, default_value_t = 60, env = "RELAYMESH_IDLE_TIMEOUT_SECS")]
    pub idle_timeout_secs: u64,

    /// Per-write deadline, seconds.
    #[arg(long, default_value_t = 10, env = "RELAYMESH_WRITE_DEADLINE_SECS")]
    pub write_deadline_secs: u64,

    /// Deadline for GroupDirectory queries during initial room assignment, seconds.
    #[arg(long, default_value_t = 5, env = "RELAYMESH_GROUP_QUERY_TIMEOUT_SECS")]
    pub group_query_timeout_secs: u64,

    /// Bus publish deadline, seconds.
    #[arg(long, default_value_t = 30, env = "RELAYMESH_BUS_PUBLISH_TIMEOUT_SECS")]
    pub bus_publish_timeout_secs: u64,

    /// LivenessSweeper interval, seconds.
    #[arg(long, default_value_t = 300, env = "RELAYMESH_SWEEPER_INTERVAL_SECS")]
    pub sweeper_interval_secs: u64,

    /// Emit structured logs as JSON instead of the default human-readable format.
    #[arg(long, env = "RELAYMESH_LOG_JSON")]
    pub log_json: bool,
}

impl Config {
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn write_deadline(&self) -> Duration {
        Duration::from_secs(self.write_deadline_secs)
    }

    pub fn group_query_timeout(&self) -> Duration {
        Duration::from_secs(self.group_query_timeout_secs)
    }

    pub fn bus_publish_timeout(&self) -> Duration {
        Duration::from_secs(self.bus_publish_timeout_secs)
    }

    pub fn sweeper_interval(&self) -> Duration {
        Duration::from_secs(self.sweeper_interval_secs)
    }

    /// Parsed origin allow-list. Empty input means deny-all, per §6.4.
    pub fn allowed_origins_list(&self) -> Vec<String> {
        self.allowed_origins
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    }
}
