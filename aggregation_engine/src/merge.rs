use serde::Serialize;

use crate::aggregate::{BlockchainAggregate, ExchangeAggregate, SENTINEL};
use crate::interval::Window;

/// Per-window join of the blockchain aggregate with every exchange aggregate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompositeRecord {
    pub window: Window,
    pub blockchain: BlockchainAggregate,
    /// One entry per exchange source, in source order.
    pub exchanges: Vec<ExchangeAggregate>,
    pub sum_cumulated_exchange_amount: f64,
    /// Only defined with exactly two exchange sources, both with a positive close.
    pub close_price_ratio: Option<f64>,
}

impl CompositeRecord {
    pub fn exchange(&self, source: &str) -> Option<&ExchangeAggregate> {
        self.exchanges.iter().find(|e| e.source == source)
    }

    pub fn transactions_per_block(&self) -> Option<f64> {
        self.blockchain.transactions_per_block()
    }
}

pub fn merge(
    window: Window,
    blockchain: BlockchainAggregate,
    exchanges: Vec<ExchangeAggregate>,
) -> CompositeRecord {
    let sum_cumulated_exchange_amount = sum_cumulated_amount(&exchanges);
    let close_price_ratio = match exchanges.as_slice() {
        [first, second] => match (first.valid_close(), second.valid_close()) {
            (Some(a), Some(b)) => Some(a / b),
            _ => None,
        },
        _ => None,
    };

    CompositeRecord {
        window,
        blockchain,
        exchanges,
        sum_cumulated_exchange_amount,
        close_price_ratio,
    }
}

fn sum_cumulated_amount(exchanges: &[ExchangeAggregate]) -> f64 {
    let mut with_data = exchanges.iter().filter(|e| e.has_data()).peekable();
    if with_data.peek().is_none() {
        return SENTINEL;
    }
    with_data.map(|e| e.cumulated_amount).sum()
}
