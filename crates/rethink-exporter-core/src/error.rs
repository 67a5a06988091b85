//! Error types for the scrape pipeline.

use thiserror::Error;

/// Why one statistics record was rejected by the classifier.
///
/// These are recoverable: the record is skipped, the scrape error count
/// goes up by one, and the cycle moves on to the next record.
#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("statistics record has an empty id")]
    EmptyId,

    #[error("unrecognized statistics kind '{0}'")]
    UnknownKind(String),

    #[error("'{kind}' record is missing field '{field}'")]
    MissingField {
        kind: &'static str,
        field: &'static str,
    },
}
