//! The database collaborator boundary.
//!
//! The pipeline consumes two operations from the underlying driver: a
//! streaming query over the cluster statistics feed and a point lookup for
//! one table's document-count estimates. Both are modeled as a trait so the
//! orchestrator can run against the real driver or an in-memory fake.

use anyhow::Result;
use futures::future::BoxFuture;
use futures::stream::BoxStream;

/// Raw documents from the statistics feed, in cursor order.
///
/// An `Err` item is a cursor/transport failure; the consumer stops reading
/// the stream for the rest of the cycle when it sees one.
pub type DocStream<'a> = BoxStream<'a, Result<serde_json::Value>>;

/// Read access to the statistics of one RethinkDB cluster.
///
/// Transport and query failures are reported uniformly through
/// `anyhow::Error`; the pipeline treats every one of them as a recoverable
/// per-operation failure.
pub trait StatsSource: Send + Sync {
    /// Open the base query over the `stats` system table.
    fn open_stats(&self) -> BoxFuture<'_, Result<DocStream<'_>>>;

    /// Fetch the per-shard-replica document-count estimates for one table.
    fn table_estimates<'a>(
        &'a self,
        db: &'a str,
        table: &'a str,
    ) -> BoxFuture<'a, Result<Vec<f64>>>;
}
