use chrono::NaiveDateTime;
use thiserror::Error;

use crate::source_kind::SourceKind;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("invalid interval '{0}': expected a positive number followed by ms, s, m, h or d")]
    Interval(String),
}

/// Failure of a single window's aggregation. Sibling windows are unaffected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AggregationError {
    #[error("{kind} record at {timestamp} has invalid {field}: {value}")]
    InvalidValue {
        kind: SourceKind,
        timestamp: NaiveDateTime,
        field: &'static str,
        value: f64,
    },
    #[error("worker panicked: {0}")]
    Panicked(String),
}
