//! End-to-end scrape cycle tests.
//!
//! Drives `collect_cycle` over an in-memory stats source and checks the
//! emitted families: per-kind emission sets, error accounting, enrichment
//! isolation, deadline behavior, and snapshot determinism.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};
use prometheus::Encoder;
use prometheus::core::Collector;
use prometheus::proto::MetricFamily;
use serde_json::{Value, json};

use rethink_exporter_core::source::{DocStream, StatsSource};
use rethink_exporter_core::{RethinkdbCollector, ScrapeOptions};

#[derive(Default)]
struct MockSource {
    docs: Vec<Value>,
    fail_open: bool,
    /// Inject a cursor error after this many documents.
    fail_after: Option<usize>,
    hang_stream: bool,
    /// Estimates keyed by `db.table`.
    estimates: HashMap<String, Vec<f64>>,
    fail_tables: HashSet<String>,
    hang_lookups: bool,
}

impl StatsSource for MockSource {
    fn open_stats(&self) -> BoxFuture<'_, Result<DocStream<'_>>> {
        Box::pin(async move {
            if self.fail_open {
                return Err(anyhow!("connection refused"));
            }
            if self.hang_stream {
                return Ok(stream::pending().boxed());
            }
            let mut items: Vec<Result<Value>> = Vec::new();
            match self.fail_after {
                Some(n) => {
                    for doc in &self.docs[..n] {
                        items.push(Ok(doc.clone()));
                    }
                    items.push(Err(anyhow!("cursor torn down")));
                    for doc in &self.docs[n..] {
                        items.push(Ok(doc.clone()));
                    }
                }
                None => {
                    for doc in &self.docs {
                        items.push(Ok(doc.clone()));
                    }
                }
            }
            Ok(stream::iter(items).boxed())
        })
    }

    fn table_estimates<'a>(
        &'a self,
        db: &'a str,
        table: &'a str,
    ) -> BoxFuture<'a, Result<Vec<f64>>> {
        Box::pin(async move {
            if self.hang_lookups {
                futures::future::pending::<()>().await;
            }
            if self.fail_tables.contains(table) {
                return Err(anyhow!("info query failed for '{db}.{table}'"));
            }
            self.estimates
                .get(&format!("{db}.{table}"))
                .cloned()
                .ok_or_else(|| anyhow!("no such table '{db}.{table}'"))
        })
    }
}

fn collector(source: MockSource, options: ScrapeOptions) -> RethinkdbCollector {
    RethinkdbCollector::new(Arc::new(source), options).unwrap()
}

fn cluster_doc() -> Value {
    json!({
        "id": ["cluster"],
        "query_engine": {
            "client_connections": 12.0,
            "clients_active": 3.0,
            "queries_per_sec": 140.5,
            "read_docs_per_sec": 401.0,
            "written_docs_per_sec": 5.0
        }
    })
}

fn server_doc(server: &str) -> Value {
    json!({
        "id": ["server", server],
        "server": server,
        "query_engine": {
            "client_connections": 4.0,
            "clients_active": 1.0,
            "queries_per_sec": 70.0,
            "read_docs_per_sec": 200.0,
            "written_docs_per_sec": 2.5
        }
    })
}

fn table_doc(db: &str, table: &str) -> Value {
    json!({
        "id": ["table", format!("{db}-{table}-uuid")],
        "db": db,
        "table": table,
        "query_engine": {
            "read_docs_per_sec": 10.0,
            "written_docs_per_sec": 1.0
        }
    })
}

fn table_server_doc(db: &str, table: &str, server: &str) -> Value {
    json!({
        "id": ["table_server", format!("{db}-{table}-uuid"), server],
        "server": server,
        "db": db,
        "table": table,
        "query_engine": {
            "read_docs_per_sec": 8.0,
            "written_docs_per_sec": 0.5
        },
        "storage_engine": {
            "cache": { "in_use_bytes": 4096.0 },
            "disk": {
                "read_bytes_per_sec": 100.0,
                "written_bytes_per_sec": 50.0,
                "space_usage": { "data_bytes": 8_000_000.0 }
            }
        }
    })
}

fn family<'a>(families: &'a [MetricFamily], name: &str) -> Option<&'a MetricFamily> {
    families.iter().find(|f| f.get_name() == name)
}

fn single_value(families: &[MetricFamily], name: &str) -> f64 {
    let f = family(families, name).unwrap_or_else(|| panic!("family '{name}' missing"));
    assert_eq!(f.get_metric().len(), 1, "family '{name}' is not a singleton");
    f.get_metric()[0].get_gauge().get_value()
}

fn labels(family: &MetricFamily, index: usize) -> Vec<(String, String)> {
    family.get_metric()[index]
        .get_label()
        .iter()
        .map(|p| (p.get_name().to_string(), p.get_value().to_string()))
        .collect()
}

#[tokio::test]
async fn cluster_record_emits_cluster_families() {
    let c = collector(
        MockSource {
            docs: vec![cluster_doc()],
            ..Default::default()
        },
        ScrapeOptions::default(),
    );
    c.collect_cycle().await;
    let families = c.collect();

    assert_eq!(single_value(&families, "cluster_client_connections"), 12.0);
    assert!(family(&families, "cluster_client_connections").unwrap().get_metric()[0]
        .get_label()
        .is_empty());

    let docs = family(&families, "cluster_docs_per_sec").unwrap();
    assert_eq!(docs.get_metric().len(), 2);
    assert_eq!(labels(docs, 0), vec![("operation".to_string(), "read".to_string())]);
    assert_eq!(
        labels(docs, 1),
        vec![("operation".to_string(), "written".to_string())]
    );
    assert_eq!(docs.get_metric()[0].get_gauge().get_value(), 401.0);
    assert_eq!(docs.get_metric()[1].get_gauge().get_value(), 5.0);

    // Nothing server- or table-scoped came out of a cluster record.
    assert!(families.iter().all(|f| !f.get_name().starts_with("server_")));
    assert!(families.iter().all(|f| !f.get_name().starts_with("table_")));
    assert_eq!(single_value(&families, "scrape_errors"), 0.0);
}

#[tokio::test]
async fn server_record_emits_server_families() {
    let c = collector(
        MockSource {
            docs: vec![server_doc("srv1")],
            ..Default::default()
        },
        ScrapeOptions::default(),
    );
    c.collect_cycle().await;
    let families = c.collect();

    assert_eq!(single_value(&families, "server_client_connections"), 4.0);
    assert_eq!(single_value(&families, "server_queries_per_sec"), 70.0);

    let docs = family(&families, "server_docs_per_sec").unwrap();
    assert_eq!(docs.get_metric().len(), 2);
    assert_eq!(
        labels(docs, 0),
        vec![
            ("server".to_string(), "srv1".to_string()),
            ("operation".to_string(), "read".to_string())
        ]
    );
    assert_eq!(single_value(&families, "scrape_errors"), 0.0);
}

#[tokio::test]
async fn table_server_record_emits_replica_families() {
    let c = collector(
        MockSource {
            docs: vec![table_server_doc("app", "users", "srv1")],
            ..Default::default()
        },
        ScrapeOptions::default(),
    );
    c.collect_cycle().await;
    let families = c.collect();

    assert_eq!(
        family(&families, "table_replica_docs_per_sec").unwrap().get_metric().len(),
        2
    );
    assert_eq!(single_value(&families, "table_replica_cache_bytes"), 4096.0);
    assert_eq!(single_value(&families, "table_replica_data_bytes"), 8_000_000.0);

    let io = family(&families, "table_replica_io_bytes_per_sec").unwrap();
    assert_eq!(io.get_metric().len(), 2);
    assert_eq!(
        labels(io, 0),
        vec![
            ("database".to_string(), "app".to_string()),
            ("table".to_string(), "users".to_string()),
            ("server".to_string(), "srv1".to_string()),
            ("operation".to_string(), "read".to_string())
        ]
    );
    assert_eq!(io.get_metric()[0].get_gauge().get_value(), 100.0);
    assert_eq!(io.get_metric()[1].get_gauge().get_value(), 50.0);
}

#[tokio::test]
async fn empty_identity_tuple_is_recoverable() {
    let c = collector(
        MockSource {
            docs: vec![json!({ "id": [] }), cluster_doc()],
            ..Default::default()
        },
        ScrapeOptions::default(),
    );
    c.collect_cycle().await;
    let families = c.collect();

    // The bad record is counted, the good one still lands.
    assert_eq!(single_value(&families, "scrape_errors"), 1.0);
    assert_eq!(single_value(&families, "cluster_client_connections"), 12.0);
}

#[tokio::test]
async fn unrecognized_kind_counts_one_error_and_emits_nothing() {
    let c = collector(
        MockSource {
            docs: vec![json!({
                "id": ["bogus", "x"],
                "query_engine": { "read_docs_per_sec": 1.0, "written_docs_per_sec": 1.0 }
            })],
            ..Default::default()
        },
        ScrapeOptions::default(),
    );
    c.collect_cycle().await;
    let families = c.collect();

    assert_eq!(single_value(&families, "scrape_errors"), 1.0);
    assert_eq!(families.len(), 2, "only the meta-metrics should be present");
}

#[tokio::test]
async fn record_missing_required_field_is_rejected_whole() {
    // A server record without queries_per_sec emits none of its samples.
    let c = collector(
        MockSource {
            docs: vec![json!({
                "id": ["server", "srv1"],
                "server": "srv1",
                "query_engine": {
                    "client_connections": 4.0,
                    "read_docs_per_sec": 200.0,
                    "written_docs_per_sec": 2.5
                }
            })],
            ..Default::default()
        },
        ScrapeOptions::default(),
    );
    c.collect_cycle().await;
    let families = c.collect();

    assert_eq!(single_value(&families, "scrape_errors"), 1.0);
    assert!(family(&families, "server_client_connections").is_none());
    assert!(family(&families, "server_docs_per_sec").is_none());
}

#[tokio::test]
async fn table_rows_count_sums_estimates() {
    let c = collector(
        MockSource {
            docs: vec![table_doc("app", "users")],
            estimates: HashMap::from([("app.users".to_string(), vec![3.0, 5.0, 4.0])]),
            ..Default::default()
        },
        ScrapeOptions {
            table_rows: true,
            ..Default::default()
        },
    );
    c.collect_cycle().await;
    let families = c.collect();

    let rows = family(&families, "table_rows_count").unwrap();
    assert_eq!(rows.get_metric().len(), 1);
    assert_eq!(rows.get_metric()[0].get_gauge().get_value(), 12.0);
    assert_eq!(
        labels(rows, 0),
        vec![
            ("database".to_string(), "app".to_string()),
            ("table".to_string(), "users".to_string())
        ]
    );
    assert_eq!(single_value(&families, "scrape_errors"), 0.0);
}

#[tokio::test]
async fn table_rows_disabled_spawns_no_lookup() {
    // No estimates configured: a lookup would fail and count an error.
    let c = collector(
        MockSource {
            docs: vec![table_doc("app", "users")],
            ..Default::default()
        },
        ScrapeOptions::default(),
    );
    c.collect_cycle().await;
    let families = c.collect();

    assert!(family(&families, "table_rows_count").is_none());
    assert_eq!(single_value(&families, "scrape_errors"), 0.0);
}

#[tokio::test]
async fn failed_lookup_is_isolated_to_its_table() {
    let c = collector(
        MockSource {
            docs: vec![
                table_doc("app", "t1"),
                table_doc("app", "t2"),
                table_doc("app", "t3"),
            ],
            estimates: HashMap::from([
                ("app.t1".to_string(), vec![1.0, 2.0]),
                ("app.t3".to_string(), vec![4.0]),
            ]),
            fail_tables: HashSet::from(["t2".to_string()]),
            ..Default::default()
        },
        ScrapeOptions {
            table_rows: true,
            ..Default::default()
        },
    );
    c.collect_cycle().await;
    let families = c.collect();

    let rows = family(&families, "table_rows_count").unwrap();
    assert_eq!(rows.get_metric().len(), 2);
    assert_eq!(rows.get_metric()[0].get_gauge().get_value(), 3.0);
    assert_eq!(rows.get_metric()[1].get_gauge().get_value(), 4.0);

    // All three tables still produced their docs/sec samples.
    assert_eq!(family(&families, "table_docs_per_sec").unwrap().get_metric().len(), 6);
    assert_eq!(single_value(&families, "scrape_errors"), 1.0);
}

#[tokio::test]
async fn empty_feed_still_emits_meta_metrics() {
    let c = collector(MockSource::default(), ScrapeOptions::default());
    c.collect_cycle().await;
    let families = c.collect();

    assert_eq!(families.len(), 2);
    assert_eq!(single_value(&families, "scrape_errors"), 0.0);
    assert!(single_value(&families, "scrape_duration_seconds") >= 0.0);
}

#[tokio::test]
async fn failed_open_emits_only_meta_metrics() {
    let c = collector(
        MockSource {
            docs: vec![cluster_doc()],
            fail_open: true,
            ..Default::default()
        },
        ScrapeOptions::default(),
    );
    c.collect_cycle().await;
    let families = c.collect();

    assert_eq!(families.len(), 2);
    assert_eq!(single_value(&families, "scrape_errors"), 1.0);
}

#[tokio::test]
async fn cursor_error_stops_the_stream_but_not_the_cycle() {
    let c = collector(
        MockSource {
            docs: vec![cluster_doc(), server_doc("srv1")],
            fail_after: Some(1),
            ..Default::default()
        },
        ScrapeOptions::default(),
    );
    c.collect_cycle().await;
    let families = c.collect();

    // The record before the cursor error made it out, the one after did not.
    assert_eq!(single_value(&families, "cluster_client_connections"), 12.0);
    assert!(family(&families, "server_client_connections").is_none());
    assert_eq!(single_value(&families, "scrape_errors"), 1.0);
}

#[tokio::test]
async fn identical_data_yields_identical_snapshots() {
    let c = collector(
        MockSource {
            docs: vec![
                cluster_doc(),
                server_doc("srv1"),
                server_doc("srv2"),
                table_server_doc("app", "users", "srv1"),
            ],
            ..Default::default()
        },
        ScrapeOptions::default(),
    );

    c.collect_cycle().await;
    let first: Vec<MetricFamily> = c
        .collect()
        .into_iter()
        .filter(|f| f.get_name() != "scrape_duration_seconds")
        .collect();

    c.collect_cycle().await;
    let second: Vec<MetricFamily> = c
        .collect()
        .into_iter()
        .filter(|f| f.get_name() != "scrape_duration_seconds")
        .collect();

    assert_eq!(first, second);
}

#[tokio::test]
async fn deadline_aborts_a_hung_base_query() {
    let c = collector(
        MockSource {
            hang_stream: true,
            ..Default::default()
        },
        ScrapeOptions {
            scrape_timeout: Some(Duration::from_millis(50)),
            ..Default::default()
        },
    );
    c.collect_cycle().await;
    let families = c.collect();

    assert_eq!(families.len(), 2);
    assert!(single_value(&families, "scrape_errors") >= 1.0);
}

#[tokio::test]
async fn deadline_counts_abandoned_lookups() {
    let c = collector(
        MockSource {
            docs: vec![table_doc("app", "t1"), table_doc("app", "t2")],
            hang_lookups: true,
            ..Default::default()
        },
        ScrapeOptions {
            table_rows: true,
            scrape_timeout: Some(Duration::from_millis(100)),
            ..Default::default()
        },
    );
    c.collect_cycle().await;
    let families = c.collect();

    // One deadline error plus one per abandoned in-flight lookup.
    assert_eq!(single_value(&families, "scrape_errors"), 3.0);
    // Samples emitted before the deadline are kept.
    assert_eq!(family(&families, "table_docs_per_sec").unwrap().get_metric().len(), 4);
    assert!(family(&families, "table_rows_count").is_none());
}

#[tokio::test]
async fn registry_round_trip_encodes_the_snapshot() {
    let c = collector(
        MockSource {
            docs: vec![cluster_doc()],
            ..Default::default()
        },
        ScrapeOptions::default(),
    );

    let registry = prometheus::Registry::new();
    registry.register(Box::new(c.clone())).unwrap();

    c.collect_cycle().await;

    let mut buffer = Vec::new();
    prometheus::TextEncoder::new()
        .encode(&registry.gather(), &mut buffer)
        .unwrap();
    let text = String::from_utf8(buffer).unwrap();

    assert!(text.contains("# TYPE cluster_docs_per_sec gauge"));
    assert!(text.contains("cluster_docs_per_sec{operation=\"read\"} 401"));
    assert!(text.contains("scrape_errors 0"));
    assert!(text.contains("scrape_duration_seconds"));
}
