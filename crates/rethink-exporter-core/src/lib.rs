//! Scrape-and-classify pipeline for RethinkDB cluster statistics.
//!
//! One [`RethinkdbCollector`] owns the metric descriptor catalog and turns
//! the cluster's `stats` system table into labeled gauge samples, one
//! snapshot per scrape cycle. The database driver sits behind the
//! [`StatsSource`] trait so the pipeline can be exercised without a live
//! cluster; the HTTP/exposition surface lives in the binary crate.

mod classify;
pub mod collect;
pub mod desc;
pub mod emit;
pub mod error;
pub mod source;
pub mod stat;

pub use collect::{RethinkdbCollector, ScrapeOptions};
pub use error::ClassifyError;
pub use source::{DocStream, StatsSource};
pub use stat::StatRecord;
