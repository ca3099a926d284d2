use chrono::NaiveDateTime;
use serde::Serialize;

use crate::aggregate::BASE_UNITS_PER_COIN;
use crate::assign::assign;
use crate::interval::Window;
use crate::record::{BlockchainEvent, ExchangeEvent};

/// Mean trade and transaction values of one window.
///
/// Blockchain values and the exchange amount are base units.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowAverages {
    /// Timestamp of the middle transaction of the window.
    pub timestamp: NaiveDateTime,
    /// `None` when the exchange had no trades in the window.
    pub avg_price: Option<f64>,
    pub avg_amount_exchange: Option<f64>,
    pub avg_amount_blockchain: f64,
    pub avg_fee: f64,
}

impl WindowAverages {
    /// Round every value to the nearest unit, ties to even.
    pub fn rounded(&self) -> Self {
        Self {
            timestamp: self.timestamp,
            avg_price: self.avg_price.map(f64::round_ties_even),
            avg_amount_exchange: self.avg_amount_exchange.map(f64::round_ties_even),
            avg_amount_blockchain: self.avg_amount_blockchain.round_ties_even(),
            avg_fee: self.avg_fee.round_ties_even(),
        }
    }
}

fn mean(values: impl ExactSizeIterator<Item = f64>) -> Option<f64> {
    let n = values.len();
    (n > 0).then(|| values.sum::<f64>() / n as f64)
}

/// `None` for a window without transactions.
pub fn average_window(
    transactions: &[BlockchainEvent],
    trades: &[ExchangeEvent],
) -> Option<WindowAverages> {
    let middle = transactions.get(transactions.len() / 2)?;
    Some(WindowAverages {
        timestamp: middle.timestamp,
        avg_price: mean(trades.iter().map(|t| t.price)),
        avg_amount_exchange: mean(trades.iter().map(|t| t.amount)).map(|a| a * BASE_UNITS_PER_COIN),
        avg_amount_blockchain: mean(transactions.iter().map(|t| t.adjusted_output() as f64))?,
        avg_fee: mean(transactions.iter().map(|t| t.fee as f64))?,
    })
}

/// One row per window holding transactions, in window order.
pub fn resample_averages(
    sorted_transactions: &[BlockchainEvent],
    sorted_trades: &[ExchangeEvent],
    windows: &[Window],
) -> Vec<WindowAverages> {
    windows
        .iter()
        .filter_map(|w| average_window(assign(sorted_transactions, w), assign(sorted_trades, w)))
        .collect()
}
