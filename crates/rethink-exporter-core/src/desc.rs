//! Static catalog of every metric family the exporter can emit.
//!
//! The names and label sets here are the stable contract dashboards and
//! alerts depend on; changing them breaks downstream tooling.

use std::collections::HashMap;

use prometheus::core::Desc;

/// Value of the `operation` label for read-side counters.
pub const OPERATION_READ: &str = "read";
/// Value of the `operation` label for write-side counters.
pub const OPERATION_WRITTEN: &str = "written";

/// Name, help text, and ordered label names for one metric family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FamilyDesc {
    pub name: &'static str,
    pub help: &'static str,
    pub labels: &'static [&'static str],
}

pub const CLUSTER_CLIENT_CONNECTIONS: FamilyDesc = FamilyDesc {
    name: "cluster_client_connections",
    help: "Number of client connections to the cluster",
    labels: &[],
};

pub const CLUSTER_DOCS_PER_SEC: FamilyDesc = FamilyDesc {
    name: "cluster_docs_per_sec",
    help: "Documents processed per second by the cluster",
    labels: &["operation"],
};

pub const SERVER_CLIENT_CONNECTIONS: FamilyDesc = FamilyDesc {
    name: "server_client_connections",
    help: "Number of client connections to the server",
    labels: &["server"],
};

pub const SERVER_QUERIES_PER_SEC: FamilyDesc = FamilyDesc {
    name: "server_queries_per_sec",
    help: "Queries processed per second by the server",
    labels: &["server"],
};

pub const SERVER_DOCS_PER_SEC: FamilyDesc = FamilyDesc {
    name: "server_docs_per_sec",
    help: "Documents processed per second by the server",
    labels: &["server", "operation"],
};

pub const TABLE_DOCS_PER_SEC: FamilyDesc = FamilyDesc {
    name: "table_docs_per_sec",
    help: "Documents processed per second in the table",
    labels: &["database", "table", "operation"],
};

pub const TABLE_ROWS_COUNT: FamilyDesc = FamilyDesc {
    name: "table_rows_count",
    help: "Estimated number of rows in the table",
    labels: &["database", "table"],
};

pub const TABLE_REPLICA_DOCS_PER_SEC: FamilyDesc = FamilyDesc {
    name: "table_replica_docs_per_sec",
    help: "Documents processed per second in the table replica",
    labels: &["database", "table", "server", "operation"],
};

pub const TABLE_REPLICA_CACHE_BYTES: FamilyDesc = FamilyDesc {
    name: "table_replica_cache_bytes",
    help: "Table replica cache bytes in use",
    labels: &["database", "table", "server"],
};

pub const TABLE_REPLICA_IO_BYTES_PER_SEC: FamilyDesc = FamilyDesc {
    name: "table_replica_io_bytes_per_sec",
    help: "Table replica disk bytes processed per second",
    labels: &["database", "table", "server", "operation"],
};

pub const TABLE_REPLICA_DATA_BYTES: FamilyDesc = FamilyDesc {
    name: "table_replica_data_bytes",
    help: "Table replica data bytes on disk",
    labels: &["database", "table", "server"],
};

pub const SCRAPE_ERRORS: FamilyDesc = FamilyDesc {
    name: "scrape_errors",
    help: "Number of errors during the last scrape",
    labels: &[],
};

pub const SCRAPE_DURATION_SECONDS: FamilyDesc = FamilyDesc {
    name: "scrape_duration_seconds",
    help: "Wall-clock duration of the last scrape",
    labels: &[],
};

/// The descriptor catalog, fixed at construction time.
///
/// `table_rows_count` is part of the catalog only when row-count collection
/// is enabled; the advertised metric set never changes afterwards.
pub struct DescriptorSet {
    families: Vec<FamilyDesc>,
    descs: Vec<Desc>,
}

impl DescriptorSet {
    pub fn new(table_rows: bool) -> prometheus::Result<Self> {
        let mut families = vec![
            CLUSTER_CLIENT_CONNECTIONS,
            CLUSTER_DOCS_PER_SEC,
            SERVER_CLIENT_CONNECTIONS,
            SERVER_QUERIES_PER_SEC,
            SERVER_DOCS_PER_SEC,
            TABLE_DOCS_PER_SEC,
        ];
        if table_rows {
            families.push(TABLE_ROWS_COUNT);
        }
        families.extend([
            TABLE_REPLICA_DOCS_PER_SEC,
            TABLE_REPLICA_CACHE_BYTES,
            TABLE_REPLICA_IO_BYTES_PER_SEC,
            TABLE_REPLICA_DATA_BYTES,
            SCRAPE_ERRORS,
            SCRAPE_DURATION_SECONDS,
        ]);

        let descs = families
            .iter()
            .map(|family| {
                Desc::new(
                    family.name.to_string(),
                    family.help.to_string(),
                    family.labels.iter().map(|label| label.to_string()).collect(),
                    HashMap::new(),
                )
            })
            .collect::<prometheus::Result<Vec<_>>>()?;

        Ok(Self { families, descs })
    }

    /// Every family in the catalog, in emission order.
    pub fn families(&self) -> &[FamilyDesc] {
        &self.families
    }

    /// Prometheus descriptors for registry registration.
    pub fn prometheus_descs(&self) -> Vec<&Desc> {
        self.descs.iter().collect()
    }
}
