// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tracing::error;

use relaymesh::config::Config;

#[tokio::main]
async fn main() -> std::process::ExitCode {
    if let Err(e) = rustls::crypto::ring::default_provider().install_default() {
        eprintln!("failed to install rustls crypto provider: {e:?}");
        return std::process::ExitCode::FAILURE;
    }

    let config = Config::parse();

    let subscriber = tracing_subscriber::fmt().with_env_filter(
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
    );
    if config.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    match relaymesh::run(config).await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            error!("fatal: {e:#}");
            std::process::ExitCode::FAILURE
        }
    }
}
