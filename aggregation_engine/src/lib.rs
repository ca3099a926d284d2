//! Interval bucketing and aggregation of blockchain transactions and
//! exchange trades into one aligned time series.

pub mod aggregate;
pub mod assign;
pub mod averages;
pub mod blocks;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod interval;
pub mod medians;
pub mod merge;
pub mod record;
pub mod returns;
pub mod source_kind;

pub use crate::aggregate::{
    aggregate_blockchain, aggregate_exchange, to_coin, BlockchainAggregate, ExchangeAggregate,
    Stat, SENTINEL,
};
pub use crate::assign::assign;
pub use crate::averages::{resample_averages, WindowAverages};
pub use crate::blocks::{with_mining_times, BlockchainBlock, MinedBlock};
pub use crate::config::{parse_interval_ms, AggregationConfig, WindowBasis};
pub use crate::dispatch::{DispatchOutcome, WindowFailure};
pub use crate::engine::{AggregationEngine, RunReport};
pub use crate::error::{AggregationError, ConfigError};
pub use crate::interval::{covering, generate, Window};
pub use crate::medians::{resample_medians, MedianSummary};
pub use crate::merge::{merge, CompositeRecord};
pub use crate::record::{BlockchainEvent, EventSources, ExchangeEvent, ExchangeSource, Timestamped};
pub use crate::returns::fill_returns;
pub use crate::source_kind::SourceKind;
