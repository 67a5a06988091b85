//! RethinkDB driver binding for the exporter.
//!
//! Implements [`StatsSource`] over a `reql` session: the base query streams
//! the `rethinkdb.stats` system table and the enrichment lookup reads
//! `doc_count_estimates` from `table(..).info()`. The session multiplexes
//! queries over one connection, so a single source serves the streaming
//! loop and every concurrent table lookup.

use anyhow::{Context, Result};
use futures::future::BoxFuture;
use futures::{StreamExt, TryStreamExt};
use reql::cmd::connect::Options;
use reql::{Session, r};
use serde::Deserialize;
use tracing::info;

use rethink_exporter_core::source::{DocStream, StatsSource};

/// Name of the system database.
const SYSTEM_DB: &str = "rethinkdb";
/// Name of the statistics system table.
const STATS_TABLE: &str = "stats";

/// Connection parameters for one cluster seed node.
#[derive(Debug, Clone)]
pub struct ConnectConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ConnectConfig {
    fn options(&self) -> Options {
        let mut options = Options::new().host(self.host.clone()).port(self.port);
        if let Some(username) = &self.username {
            options = options.user(username.clone());
        }
        if let Some(password) = &self.password {
            options = options.password(password.clone());
        }
        options
    }
}

/// A [`StatsSource`] backed by a live RethinkDB session.
pub struct RethinkSource {
    session: Session,
}

impl RethinkSource {
    /// Connect to the configured seed node.
    pub async fn connect(config: &ConnectConfig) -> Result<Self> {
        let session = r
            .connect(config.options())
            .await
            .with_context(|| format!("failed to connect to {}:{}", config.host, config.port))?;
        info!(host = %config.host, port = config.port, "connected to rethinkdb");
        Ok(Self { session })
    }
}

/// The slice of `table(..).info()` the enrichment lookup cares about.
#[derive(Debug, Deserialize)]
struct TableInfo {
    doc_count_estimates: Vec<f64>,
}

impl StatsSource for RethinkSource {
    fn open_stats(&self) -> BoxFuture<'_, Result<DocStream<'_>>> {
        Box::pin(async move {
            let stream = r
                .db(SYSTEM_DB)
                .table(STATS_TABLE)
                .run::<_, serde_json::Value>(&self.session);
            Ok(stream.map_err(anyhow::Error::from).boxed())
        })
    }

    fn table_estimates<'a>(
        &'a self,
        db: &'a str,
        table: &'a str,
    ) -> BoxFuture<'a, Result<Vec<f64>>> {
        Box::pin(async move {
            let mut query = r.db(db).table(table).info().run::<_, TableInfo>(&self.session);
            let table_info = query
                .try_next()
                .await
                .with_context(|| format!("failed to fetch info for table '{db}.{table}'"))?
                .with_context(|| format!("table '{db}.{table}' info returned no document"))?;
            Ok(table_info.doc_count_estimates)
        })
    }
}
