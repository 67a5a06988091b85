//! Record classification and metric emission.
//!
//! Dispatch is driven entirely by the first element of the identity tuple.
//! Every field a kind needs is checked before the first sample for that
//! record goes out, so a rejected record emits nothing at all.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::warn;

use crate::collect::{CycleCounters, RethinkdbCollector};
use crate::desc;
use crate::emit::SampleSink;
use crate::error::ClassifyError;
use crate::stat::StatRecord;

fn require<T>(
    value: Option<T>,
    kind: &'static str,
    field: &'static str,
) -> Result<T, ClassifyError> {
    value.ok_or(ClassifyError::MissingField { kind, field })
}

impl RethinkdbCollector {
    /// Classify one record by its identity kind and emit its metric subset.
    ///
    /// A `table` record may additionally enqueue one row-count lookup; the
    /// streaming loop is never blocked on its completion.
    pub(crate) fn classify(
        &self,
        stat: StatRecord,
        sink: &SampleSink,
        lookups: &mut JoinSet<()>,
        limit: &Arc<Semaphore>,
        counters: &Arc<CycleCounters>,
    ) -> Result<(), ClassifyError> {
        let Some(kind) = stat.kind() else {
            return Err(ClassifyError::EmptyId);
        };
        match kind {
            "cluster" => self.emit_cluster(&stat, sink),
            "server" => self.emit_server(&stat, sink),
            "table" => self.emit_table(&stat, sink, lookups, limit, counters),
            "table_server" => self.emit_table_server(&stat, sink),
            other => Err(ClassifyError::UnknownKind(other.to_string())),
        }
    }

    fn emit_cluster(&self, stat: &StatRecord, sink: &SampleSink) -> Result<(), ClassifyError> {
        const KIND: &str = "cluster";
        let qe = require(stat.query_engine.as_ref(), KIND, "query_engine")?;
        let connections = require(qe.client_connections, KIND, "query_engine.client_connections")?;
        let read = require(qe.read_docs_per_sec, KIND, "query_engine.read_docs_per_sec")?;
        let written = require(qe.written_docs_per_sec, KIND, "query_engine.written_docs_per_sec")?;

        sink.emit(&desc::CLUSTER_CLIENT_CONNECTIONS, connections, &[]);
        sink.emit(&desc::CLUSTER_DOCS_PER_SEC, read, &[desc::OPERATION_READ]);
        sink.emit(&desc::CLUSTER_DOCS_PER_SEC, written, &[desc::OPERATION_WRITTEN]);
        Ok(())
    }

    fn emit_server(&self, stat: &StatRecord, sink: &SampleSink) -> Result<(), ClassifyError> {
        const KIND: &str = "server";
        let server = require(stat.server.as_deref(), KIND, "server")?;
        let qe = require(stat.query_engine.as_ref(), KIND, "query_engine")?;
        let connections = require(qe.client_connections, KIND, "query_engine.client_connections")?;
        let queries = require(qe.queries_per_sec, KIND, "query_engine.queries_per_sec")?;
        let read = require(qe.read_docs_per_sec, KIND, "query_engine.read_docs_per_sec")?;
        let written = require(qe.written_docs_per_sec, KIND, "query_engine.written_docs_per_sec")?;

        sink.emit(&desc::SERVER_CLIENT_CONNECTIONS, connections, &[server]);
        sink.emit(&desc::SERVER_QUERIES_PER_SEC, queries, &[server]);
        sink.emit(
            &desc::SERVER_DOCS_PER_SEC,
            read,
            &[server, desc::OPERATION_READ],
        );
        sink.emit(
            &desc::SERVER_DOCS_PER_SEC,
            written,
            &[server, desc::OPERATION_WRITTEN],
        );
        Ok(())
    }

    fn emit_table(
        &self,
        stat: &StatRecord,
        sink: &SampleSink,
        lookups: &mut JoinSet<()>,
        limit: &Arc<Semaphore>,
        counters: &Arc<CycleCounters>,
    ) -> Result<(), ClassifyError> {
        const KIND: &str = "table";
        let database = require(stat.database.as_deref(), KIND, "db")?;
        let table = require(stat.table.as_deref(), KIND, "table")?;
        let qe = require(stat.query_engine.as_ref(), KIND, "query_engine")?;
        let read = require(qe.read_docs_per_sec, KIND, "query_engine.read_docs_per_sec")?;
        let written = require(qe.written_docs_per_sec, KIND, "query_engine.written_docs_per_sec")?;

        sink.emit(
            &desc::TABLE_DOCS_PER_SEC,
            read,
            &[database, table, desc::OPERATION_READ],
        );
        sink.emit(
            &desc::TABLE_DOCS_PER_SEC,
            written,
            &[database, table, desc::OPERATION_WRITTEN],
        );

        if self.options.table_rows {
            self.spawn_table_lookup(
                database.to_string(),
                table.to_string(),
                sink,
                lookups,
                limit,
                counters,
            );
        }
        Ok(())
    }

    fn emit_table_server(&self, stat: &StatRecord, sink: &SampleSink) -> Result<(), ClassifyError> {
        const KIND: &str = "table_server";
        let database = require(stat.database.as_deref(), KIND, "db")?;
        let table = require(stat.table.as_deref(), KIND, "table")?;
        let server = require(stat.server.as_deref(), KIND, "server")?;
        let qe = require(stat.query_engine.as_ref(), KIND, "query_engine")?;
        let read = require(qe.read_docs_per_sec, KIND, "query_engine.read_docs_per_sec")?;
        let written = require(qe.written_docs_per_sec, KIND, "query_engine.written_docs_per_sec")?;
        let se = require(stat.storage_engine.as_ref(), KIND, "storage_engine")?;

        sink.emit(
            &desc::TABLE_REPLICA_DOCS_PER_SEC,
            read,
            &[database, table, server, desc::OPERATION_READ],
        );
        sink.emit(
            &desc::TABLE_REPLICA_DOCS_PER_SEC,
            written,
            &[database, table, server, desc::OPERATION_WRITTEN],
        );
        sink.emit(
            &desc::TABLE_REPLICA_CACHE_BYTES,
            se.cache.in_use_bytes,
            &[database, table, server],
        );
        sink.emit(
            &desc::TABLE_REPLICA_IO_BYTES_PER_SEC,
            se.disk.read_bytes_per_sec,
            &[database, table, server, desc::OPERATION_READ],
        );
        sink.emit(
            &desc::TABLE_REPLICA_IO_BYTES_PER_SEC,
            se.disk.written_bytes_per_sec,
            &[database, table, server, desc::OPERATION_WRITTEN],
        );
        sink.emit(
            &desc::TABLE_REPLICA_DATA_BYTES,
            se.disk.space_usage.data_bytes,
            &[database, table, server],
        );
        Ok(())
    }

    /// Fire one row-count lookup for `database`.`table` without blocking
    /// the streaming loop. The semaphore bounds lookup concurrency across
    /// the cycle.
    fn spawn_table_lookup(
        &self,
        database: String,
        table: String,
        sink: &SampleSink,
        lookups: &mut JoinSet<()>,
        limit: &Arc<Semaphore>,
        counters: &Arc<CycleCounters>,
    ) {
        let source = Arc::clone(&self.source);
        let sink = sink.clone();
        let limit = Arc::clone(limit);
        let counters = Arc::clone(counters);

        counters.lookup_spawned();
        lookups.spawn(async move {
            let Ok(_permit) = limit.acquire_owned().await else {
                counters.lookup_finished();
                return;
            };
            match source.table_estimates(&database, &table).await {
                Ok(estimates) => {
                    let rows: f64 = estimates.iter().sum();
                    sink.emit(&desc::TABLE_ROWS_COUNT, rows, &[&database, &table]);
                }
                Err(e) => {
                    warn!(db = %database, table = %table, error = %e, "failed to fetch table info");
                    counters.record_error();
                }
            }
            counters.lookup_finished();
        });
    }
}
