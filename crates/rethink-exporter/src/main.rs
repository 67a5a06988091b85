//! rethink-exporter — Prometheus exporter for RethinkDB.
//!
//! Wires the pieces together: configuration, logging, the database
//! session, the collector, and the HTTP server.
//!
//! # Usage
//!
//! ```text
//! rethink-exporter --db-address localhost:28015 --table-estimates
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use prometheus::Registry;
use tracing::info;

use rethink_exporter_core::{RethinkdbCollector, ScrapeOptions};
use rethink_exporter_db::{ConnectConfig, RethinkSource};

mod config;
mod server;

use config::{Cli, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(&cli)?;

    init_logging(&config);

    // ── Database session ───────────────────────────────────────
    let (host, port) = config.db_host_port()?;
    let source = RethinkSource::connect(&ConnectConfig {
        host,
        port,
        username: config.db.username.clone(),
        password: config.db.password.clone(),
    })
    .await?;

    // ── Collector and registry ─────────────────────────────────
    let options = ScrapeOptions {
        table_rows: config.stats.table_estimates,
        max_table_lookups: config.stats.max_table_lookups,
        scrape_timeout: config.stats.scrape_timeout_secs.map(Duration::from_secs),
    };
    let collector = RethinkdbCollector::new(Arc::new(source), options)?;

    let registry = Registry::new();
    registry
        .register(Box::new(collector.clone()))
        .context("failed to register rethinkdb collector")?;

    // ── HTTP server ────────────────────────────────────────────
    let state = server::AppState::new(collector, registry, config.web.telemetry_path.clone());
    let router = server::build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.web.listen_address)
        .await
        .with_context(|| format!("failed to bind {}", config.web.listen_address))?;
    info!(
        address = %config.web.listen_address,
        path = %config.web.telemetry_path,
        "listening"
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c()
                .await
                .expect("failed to install CTRL+C handler");
            info!("shutdown signal received");
        })
        .await?;

    Ok(())
}

fn init_logging(config: &Config) {
    let default_directive = if config.log.debug { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_directive.parse().unwrap());

    if config.log.json_output {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
