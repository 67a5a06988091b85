//! Exporter configuration: TOML file plus command line overrides.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use serde::Deserialize;

/// Command line interface, mirroring the exporter's historical flag set.
#[derive(Debug, Parser)]
#[command(
    name = "rethink-exporter",
    about = "Prometheus exporter for RethinkDB cluster statistics"
)]
pub struct Cli {
    /// Path to a TOML config file.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Verbose debug logs.
    #[arg(long)]
    pub log_debug: bool,

    /// Use JSON output for logs.
    #[arg(long)]
    pub log_json: bool,

    /// Address of a rethinkdb node, as host:port.
    #[arg(long)]
    pub db_address: Option<String>,

    /// Username of the rethinkdb user.
    #[arg(long, env = "DB_USERNAME")]
    pub db_username: Option<String>,

    /// Password of the rethinkdb user.
    #[arg(long, env = "DB_PASSWORD")]
    pub db_password: Option<String>,

    /// Address to listen on for the web interface and telemetry.
    #[arg(long)]
    pub listen_address: Option<String>,

    /// Path under which to expose metrics.
    #[arg(long)]
    pub telemetry_path: Option<String>,

    /// Collect document count estimates for each table.
    #[arg(long)]
    pub table_estimates: bool,

    /// Upper bound on concurrent table info lookups per scrape.
    #[arg(long)]
    pub max_table_lookups: Option<usize>,

    /// Per-scrape deadline in seconds; unset leaves scrapes unbounded.
    #[arg(long)]
    pub scrape_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log: LogConfig,
    pub db: DbConfig,
    pub web: WebConfig,
    pub stats: StatsConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub debug: bool,
    pub json_output: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    /// Seed node as `host:port`.
    pub address: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            address: "localhost:28015".to_string(),
            username: None,
            password: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    pub listen_address: String,
    pub telemetry_path: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0:9055".to_string(),
            telemetry_path: "/metrics".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Collect per-table document count estimates.
    pub table_estimates: bool,
    /// Concurrent table info lookups per scrape.
    pub max_table_lookups: usize,
    /// Per-scrape deadline in seconds.
    pub scrape_timeout_secs: Option<u64>,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            table_estimates: false,
            max_table_lookups: 16,
            scrape_timeout_secs: None,
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    /// Resolve the effective configuration: file values, then CLI overrides.
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let mut config = match &cli.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        if cli.log_debug {
            config.log.debug = true;
        }
        if cli.log_json {
            config.log.json_output = true;
        }
        if let Some(address) = &cli.db_address {
            config.db.address = address.clone();
        }
        if cli.db_username.is_some() {
            config.db.username = cli.db_username.clone();
        }
        if cli.db_password.is_some() {
            config.db.password = cli.db_password.clone();
        }
        if let Some(listen) = &cli.listen_address {
            config.web.listen_address = listen.clone();
        }
        if let Some(path) = &cli.telemetry_path {
            config.web.telemetry_path = path.clone();
        }
        if cli.table_estimates {
            config.stats.table_estimates = true;
        }
        if let Some(limit) = cli.max_table_lookups {
            config.stats.max_table_lookups = limit;
        }
        if cli.scrape_timeout_secs.is_some() {
            config.stats.scrape_timeout_secs = cli.scrape_timeout_secs;
        }

        Ok(config)
    }

    /// Split `db.address` into host and port, defaulting the port.
    pub fn db_host_port(&self) -> anyhow::Result<(String, u16)> {
        match self.db.address.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse()
                    .with_context(|| format!("invalid port in db address '{}'", self.db.address))?;
                Ok((host.to_string(), port))
            }
            None => Ok((self.db.address.clone(), 28015)),
        }
    }
}
