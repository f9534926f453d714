// Copyright 2026 The Lemonade Stand Project
// SPDX-License-Identifier: Apache-2.0

use clap::Parser;
use lemonade_stand::config;
use lemonade_stand::metrics::MetricsAggregator;
use lemonade_stand::orchestrator;
use lemonade_stand::server;

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lemonade-stand", about = "Streaming content-moderation chat relay")]
struct Cli {
    /// Path to a relay config YAML. The built-in config is used when absent.
    #[arg(long, env = "LEMONADE_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(long, default_value_t = 8080, env = "LEMONADE_PORT")]
    port: u16,

    /// Address to bind
    #[arg(long, default_value = "0.0.0.0", env = "LEMONADE_BIND")]
    bind: IpAddr,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .json()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let addr = SocketAddr::new(cli.bind, cli.port);
    tracing::info!(%addr, "lemonade-stand starting");

    let loaded = match &cli.config {
        Some(path) => config::load_config(&config::FileSource { path: path.clone() }),
        None => config::load_config(&config::EmbeddedSource),
    };
    let config = match loaded {
        Ok(c) => Arc::new(c),
        Err(e) => {
            tracing::error!("failed to load config: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        source = %cli.config.as_deref().map_or("embedded".into(), |p| p.display().to_string()),
        endpoint = %config.upstream.endpoint(),
        model = %config.upstream.model,
        verify_tls = config.upstream.verify_tls,
        authenticated = config.upstream.api_key.is_some(),
        rules = config.rules.len(),
        rules_hash = %config.rules_hash,
        "config loaded"
    );

    let metrics = Arc::new(MetricsAggregator::new());
    let orchestrator = match orchestrator::build_orchestrator(config.clone(), metrics.clone()) {
        Ok(o) => o,
        Err(e) => {
            tracing::error!("failed to build upstream client: {e}");
            std::process::exit(1);
        }
    };
    tracing::info!(
        endpoint = orchestrator.endpoint(),
        detector_rules = orchestrator.detectors().rule_count(),
        "upstream client ready"
    );
    let chat: Arc<dyn server::ChatService> = Arc::new(orchestrator);

    let app = server::build_router(server::AppState {
        chat,
        metrics,
        max_message_chars: config.streaming.max_message_chars,
    });

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(%addr, "failed to bind: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(%addr, "lemonade-stand listening");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!("server error: {e}");
        std::process::exit(1);
    }
    tracing::info!("lemonade-stand stopped");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
