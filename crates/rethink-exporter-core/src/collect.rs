//! Scrape orchestration.
//!
//! One collector instance owns the descriptor catalog, the database handle,
//! and the snapshot of the most recent scrape cycle. [`RethinkdbCollector::collect_cycle`]
//! runs one full cycle; the [`prometheus::core::Collector`] impl hands the
//! registry the catalog and the latest snapshot.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use futures::StreamExt;
use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use crate::desc::{self, DescriptorSet};
use crate::emit::{SampleSink, assemble};
use crate::source::StatsSource;
use crate::stat::StatRecord;

/// Tuning knobs for one collector instance, fixed at construction.
#[derive(Debug, Clone)]
pub struct ScrapeOptions {
    /// Collect per-table row-count estimates (one extra lookup per table
    /// record).
    pub table_rows: bool,
    /// Upper bound on concurrent row-count lookups within a cycle.
    pub max_table_lookups: usize,
    /// Wall-clock budget for one cycle; `None` leaves the cycle unbounded.
    pub scrape_timeout: Option<Duration>,
}

impl Default for ScrapeOptions {
    fn default() -> Self {
        Self {
            table_rows: false,
            max_table_lookups: 16,
            scrape_timeout: None,
        }
    }
}

/// Error and lookup accounting for one scrape cycle.
///
/// Shared by the streaming loop and the enrichment tasks; lives outside the
/// cycle future so the deadline path can still read it after an abort.
#[derive(Default)]
pub(crate) struct CycleCounters {
    errors: AtomicU64,
    lookups_spawned: AtomicU64,
    lookups_finished: AtomicU64,
}

impl CycleCounters {
    pub(crate) fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn lookup_spawned(&self) {
        self.lookups_spawned.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn lookup_finished(&self) {
        self.lookups_finished.fetch_add(1, Ordering::Relaxed);
    }

    fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Lookups spawned this cycle that never ran to completion.
    fn abandoned_lookups(&self) -> u64 {
        self.lookups_spawned
            .load(Ordering::Relaxed)
            .saturating_sub(self.lookups_finished.load(Ordering::Relaxed))
    }
}

/// Prometheus collector for one RethinkDB cluster.
///
/// Construct once, register explicitly into a `prometheus::Registry`, and
/// drive one scrape cycle per collection request. All failures inside a
/// cycle are absorbed into the `scrape_errors` count; `collect_cycle`
/// itself never fails.
#[derive(Clone)]
pub struct RethinkdbCollector {
    pub(crate) source: Arc<dyn StatsSource>,
    pub(crate) descs: Arc<DescriptorSet>,
    pub(crate) options: ScrapeOptions,
    snapshot: Arc<Mutex<Vec<MetricFamily>>>,
}

impl RethinkdbCollector {
    pub fn new(source: Arc<dyn StatsSource>, options: ScrapeOptions) -> prometheus::Result<Self> {
        let descs = DescriptorSet::new(options.table_rows)?;
        Ok(Self {
            source,
            descs: Arc::new(descs),
            options,
            snapshot: Arc::new(Mutex::new(Vec::new())),
        })
    }

    /// Run one full scrape cycle and publish its snapshot.
    pub async fn collect_cycle(&self) {
        let start = Instant::now();
        let counters = Arc::new(CycleCounters::default());
        let sink = SampleSink::new();

        let cycle = self.collect_stats(&sink, &counters);
        match self.options.scrape_timeout {
            Some(limit) => {
                if tokio::time::timeout(limit, cycle).await.is_err() {
                    // The cycle future is gone: the cursor is closed and
                    // every in-flight lookup task aborted along with it.
                    let abandoned = counters.abandoned_lookups();
                    counters.record_error();
                    for _ in 0..abandoned {
                        counters.record_error();
                    }
                    warn!(
                        timeout = ?limit,
                        abandoned, "scrape deadline exceeded, cycle aborted"
                    );
                }
            }
            None => cycle.await,
        }

        let errors = counters.errors();
        sink.emit(&desc::SCRAPE_ERRORS, errors as f64, &[]);
        sink.emit(
            &desc::SCRAPE_DURATION_SECONDS,
            start.elapsed().as_secs_f64(),
            &[],
        );

        let families = assemble(&self.descs, sink.drain());
        *self.snapshot.lock().unwrap_or_else(PoisonError::into_inner) = families;

        debug!(errors, duration = ?start.elapsed(), "scrape cycle finished");
    }

    async fn collect_stats(&self, sink: &SampleSink, counters: &Arc<CycleCounters>) {
        let mut stream = match self.source.open_stats().await {
            Ok(stream) => stream,
            Err(e) => {
                error!(error = %e, "failed to query the stats system table");
                counters.record_error();
                return;
            }
        };

        let mut lookups = JoinSet::new();
        let limit = Arc::new(Semaphore::new(self.options.max_table_lookups));

        while let Some(item) = stream.next().await {
            let doc = match item {
                Ok(doc) => doc,
                Err(e) => {
                    // Cursor failure: stop consuming this cycle's stream,
                    // but still wait out the lookups already in flight.
                    error!(error = %e, "stats cursor failed mid-stream");
                    counters.record_error();
                    break;
                }
            };
            match StatRecord::decode(doc) {
                Ok(stat) => {
                    if let Err(e) = self.classify(stat, sink, &mut lookups, &limit, counters) {
                        warn!(error = %e, "skipping statistics record");
                        counters.record_error();
                    }
                }
                Err(e) => {
                    warn!(error = %e, "failed to decode statistics record");
                    counters.record_error();
                }
            }
        }
        // Release the cursor before waiting on enrichment.
        drop(stream);

        while let Some(joined) = lookups.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "table lookup task failed");
                counters.record_error();
            }
        }
    }
}

impl Collector for RethinkdbCollector {
    fn desc(&self) -> Vec<&Desc> {
        self.descs.prometheus_descs()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        self.snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
