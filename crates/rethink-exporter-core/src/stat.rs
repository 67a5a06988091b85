//! Decoded shape of one row from the `stats` system table.
//!
//! Records are constructed fresh per scrape and dropped after emission.
//! Fields that only appear for some identity kinds stay `Option` so an
//! absent field never silently decodes as a zero counter; the classifier
//! enforces presence per kind.

use serde::Deserialize;

/// One statistics record, straight off the base query.
#[derive(Debug, Clone, Deserialize)]
pub struct StatRecord {
    /// Identity tuple; element 0 is the kind discriminator.
    pub id: Vec<String>,
    pub server: Option<String>,
    #[serde(rename = "db")]
    pub database: Option<String>,
    pub table: Option<String>,
    pub query_engine: Option<QueryEngine>,
    pub storage_engine: Option<StorageEngine>,
}

/// Query-engine counters. All instantaneous rates, non-negative.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryEngine {
    pub client_connections: Option<f64>,
    pub queries_per_sec: Option<f64>,
    pub read_docs_per_sec: Option<f64>,
    pub written_docs_per_sec: Option<f64>,
}

/// Storage-engine counters, present on `table_server` records.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageEngine {
    pub cache: Cache,
    pub disk: Disk,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Cache {
    pub in_use_bytes: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Disk {
    pub read_bytes_per_sec: f64,
    pub written_bytes_per_sec: f64,
    pub space_usage: SpaceUsage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpaceUsage {
    pub data_bytes: f64,
}

impl StatRecord {
    /// Decode one raw document from the base query.
    pub fn decode(doc: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(doc)
    }

    /// Identity kind, i.e. the first element of the identity tuple.
    pub fn kind(&self) -> Option<&str> {
        self.id.first().map(String::as_str)
    }
}
