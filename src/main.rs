//! Report service admission edge.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ Recover ─▶ Security Headers ─▶ Telemetry ─▶ CORS ─▶ Rate Limit ─▶ Validators ─▶ upstream
//!                                                                            │
//!                                                                            ▼
//!                                                                     CounterStore
//!                                                               (in-process or Redis, fail-open)
//!
//!     /health /ready /version   ─▶ Recover ─▶ Security Headers ─▶ Telemetry ─▶ handler
//!     /swagger/doc.json         ─▶ Recover ─▶ Security Headers ─▶ Telemetry ─▶ configurator ─▶ handler
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;

use report_edge::config::{self, EdgeConfig};
use report_edge::lifecycle::{signals, Shutdown};
use report_edge::observability::{logging, metrics};
use report_edge::store::{CounterStore, KvClient, MemoryStore, RedisKv, SharedStore, StoreError};
use report_edge::HttpServer;

#[derive(Parser)]
#[command(name = "report-edge", version, about = "HTTP admission edge for the report service")]
struct Cli {
    /// Path to a TOML configuration file. Defaults apply when omitted.
    #[arg(short, long, env = "EDGE_CONFIG")]
    config: Option<PathBuf>,
}

async fn build_store(config: &EdgeConfig) -> Arc<dyn CounterStore> {
    let Some(url) = config.store.redis_url.as_deref() else {
        let store = MemoryStore::new();
        store.spawn_sweeper(Duration::from_secs(config.store.sweep_interval_secs.max(1)));
        tracing::info!("Using in-process counter store");
        return Arc::new(store);
    };

    let timeout = Duration::from_millis(config.store.op_timeout_ms);
    match RedisKv::connect(url).await {
        Ok(client) => Arc::new(SharedStore::new(Arc::new(client)).with_timeout(timeout)),
        Err(e) => {
            // Fail open: run with an unreachable store rather than refuse to start.
            tracing::error!(error = %e, "Counter store unreachable, rate limiting will admit all traffic");
            let url = url.to_string();
            let store = SharedStore::reconnecting(
                move || {
                    let url = url.clone();
                    async move {
                        let client = RedisKv::connect(&url).await?;
                        Ok::<Arc<dyn KvClient>, StoreError>(Arc::new(client))
                    }
                },
                Duration::from_secs(config.store.reconnect_interval_secs.max(1)),
            );
            Arc::new(store.with_timeout(timeout))
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = config::load(cli.config.as_deref())?;

    logging::init(&config.observability);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "report-edge starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.base_url,
        rate_limit_enabled = config.rate_limit.enabled,
        routes = config.routes.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let store = build_store(&config).await;
    let server = HttpServer::new(&config, store.clone())?;

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    signals::spawn_signal_listener(shutdown.clone());
    server.run(listener, shutdown.wait()).await?;

    store.close().await;
    tracing::info!("Shutdown complete");
    Ok(())
}
