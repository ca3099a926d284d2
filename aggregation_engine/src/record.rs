use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::config::WindowBasis;

/// Anything that carries a single, immutable event time.
pub trait Timestamped {
    fn timestamp(&self) -> NaiveDateTime;
}

/// One on-chain transaction. Fee and value fields are integer base units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockchainEvent {
    pub timestamp: NaiveDateTime,
    pub block_height: u64,
    pub size_bytes: u64,
    pub is_coinbase: bool,
    pub lock_time: u32,
    pub fee: i64,
    pub input_count: u32,
    pub input_value: i64,
    pub output_count: u32,
    pub output_value: i64,
    /// `None` when no change output was detected for the transaction.
    pub change_output: Option<i64>,
}

impl BlockchainEvent {
    /// Output value with the detected change output removed.
    pub fn adjusted_output(&self) -> i64 {
        match self.change_output {
            Some(change) => self.output_value - change,
            None => self.output_value,
        }
    }
}

impl Timestamped for BlockchainEvent {
    fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }
}

/// One exchange trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeEvent {
    pub source: String,
    pub timestamp: NaiveDateTime,
    pub price: f64,
    pub amount: f64,
}

impl Timestamped for ExchangeEvent {
    fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }
}

/// All trades of one named exchange, sorted by time.
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeSource {
    pub name: String,
    pub events: Vec<ExchangeEvent>,
}

impl ExchangeSource {
    pub fn new(name: impl Into<String>, mut events: Vec<ExchangeEvent>) -> Self {
        // stable: equal timestamps keep their input order
        events.sort_by_key(|e| e.timestamp);
        Self {
            name: name.into(),
            events,
        }
    }
}

/// Fully materialized, time-sorted inputs of one aggregation run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EventSources {
    pub blockchain: Vec<BlockchainEvent>,
    pub exchanges: Vec<ExchangeSource>,
}

impl EventSources {
    pub fn new(mut blockchain: Vec<BlockchainEvent>, exchanges: Vec<ExchangeSource>) -> Self {
        blockchain.sort_by_key(|e| e.timestamp);
        Self {
            blockchain,
            exchanges,
        }
    }

    /// First and last event time the windows have to cover.
    ///
    /// `Blockchain` spans the transaction stream only, `Union` spans every
    /// source. Returns `None` when the chosen streams hold no events.
    pub fn span(&self, basis: WindowBasis) -> Option<(NaiveDateTime, NaiveDateTime)> {
        let mut span = bounds(&self.blockchain);
        if basis == WindowBasis::Union {
            for source in &self.exchanges {
                span = widen(span, bounds(&source.events));
            }
        }
        span
    }

    pub fn exchange_names(&self) -> Vec<&str> {
        self.exchanges.iter().map(|s| s.name.as_str()).collect()
    }
}

fn bounds<E: Timestamped>(sorted: &[E]) -> Option<(NaiveDateTime, NaiveDateTime)> {
    Some((sorted.first()?.timestamp(), sorted.last()?.timestamp()))
}

fn widen(
    a: Option<(NaiveDateTime, NaiveDateTime)>,
    b: Option<(NaiveDateTime, NaiveDateTime)>,
) -> Option<(NaiveDateTime, NaiveDateTime)> {
    match (a, b) {
        (Some((a0, a1)), Some((b0, b1))) => Some((a0.min(b0), a1.max(b1))),
        (Some(x), None) | (None, Some(x)) => Some(x),
        (None, None) => None,
    }
}
