use std::collections::HashSet;

use serde::Serialize;

use crate::error::AggregationError;
use crate::record::{BlockchainEvent, ExchangeEvent};
use crate::source_kind::SourceKind;

/// Value of any statistic computed over zero records.
pub const SENTINEL: f64 = -1.0;

/// Base units (satoshi) per displayed coin.
pub const BASE_UNITS_PER_COIN: f64 = 100_000_000.0;

/// Convert an aggregated base-unit value to display units. Sentinels pass through.
pub fn to_coin(base_units: f64) -> f64 {
    if base_units == SENTINEL {
        base_units
    } else {
        base_units / BASE_UNITS_PER_COIN
    }
}

/// Sum and mean of one field over the records of a window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Stat {
    pub sum: f64,
    pub mean: f64,
}

impl Stat {
    pub const SENTINEL: Stat = Stat {
        sum: SENTINEL,
        mean: SENTINEL,
    };
}

#[derive(Debug, Default)]
struct Running {
    sum: i128,
    count: usize,
}

impl Running {
    fn push(&mut self, value: i64) {
        self.sum += i128::from(value);
        self.count += 1;
    }

    fn stat(&self) -> Stat {
        if self.count == 0 {
            return Stat::SENTINEL;
        }
        let sum = self.sum as f64;
        Stat {
            sum,
            mean: sum / self.count as f64,
        }
    }
}

/// Blockchain statistics of one window. Fee and value stats are base units.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockchainAggregate {
    pub transaction_count: usize,
    pub block_count: usize,
    pub fee: Stat,
    pub input_count: Stat,
    pub input_value: Stat,
    pub output_count: Stat,
    pub output_value: Stat,
    pub adjusted_output: Stat,
    pub adjusted_output_ex_coinbase: Stat,
    pub size_bytes: Stat,
}

impl BlockchainAggregate {
    pub fn empty() -> Self {
        Self {
            transaction_count: 0,
            block_count: 0,
            fee: Stat::SENTINEL,
            input_count: Stat::SENTINEL,
            input_value: Stat::SENTINEL,
            output_count: Stat::SENTINEL,
            output_value: Stat::SENTINEL,
            adjusted_output: Stat::SENTINEL,
            adjusted_output_ex_coinbase: Stat::SENTINEL,
            size_bytes: Stat::SENTINEL,
        }
    }

    pub fn has_data(&self) -> bool {
        self.transaction_count > 0
    }

    /// `None` when the window touched no block.
    pub fn transactions_per_block(&self) -> Option<f64> {
        if self.block_count == 0 {
            return None;
        }
        Some(self.transaction_count as f64 / self.block_count as f64)
    }
}

/// Reduce the transactions of one window in a single pass.
pub fn aggregate_blockchain(
    events: &[BlockchainEvent],
) -> Result<BlockchainAggregate, AggregationError> {
    if events.is_empty() {
        return Ok(BlockchainAggregate::empty());
    }

    let mut heights = HashSet::new();
    let mut fee = Running::default();
    let mut input_count = Running::default();
    let mut input_value = Running::default();
    let mut output_count = Running::default();
    let mut output_value = Running::default();
    let mut adjusted = Running::default();
    let mut adjusted_ex_coinbase = Running::default();
    let mut size = Running::default();

    for e in events {
        let adjusted_output = e.adjusted_output();
        for (field, value) in [
            ("fee", e.fee),
            ("input_value", e.input_value),
            ("output_value", e.output_value),
            ("adjusted_output", adjusted_output),
        ] {
            if value < 0 {
                return Err(AggregationError::InvalidValue {
                    kind: SourceKind::Blockchain,
                    timestamp: e.timestamp,
                    field,
                    value: value as f64,
                });
            }
        }

        heights.insert(e.block_height);
        fee.push(e.fee);
        input_count.push(i64::from(e.input_count));
        input_value.push(e.input_value);
        output_count.push(i64::from(e.output_count));
        output_value.push(e.output_value);
        adjusted.push(adjusted_output);
        if !e.is_coinbase {
            adjusted_ex_coinbase.push(adjusted_output);
        }
        size.push(i64::try_from(e.size_bytes).unwrap_or(i64::MAX));
    }

    Ok(BlockchainAggregate {
        transaction_count: events.len(),
        block_count: heights.len(),
        fee: fee.stat(),
        input_count: input_count.stat(),
        input_value: input_value.stat(),
        output_count: output_count.stat(),
        output_value: output_value.stat(),
        adjusted_output: adjusted.stat(),
        adjusted_output_ex_coinbase: adjusted_ex_coinbase.stat(),
        size_bytes: size.stat(),
    })
}

/// OHLC summary of one exchange's trades in one window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExchangeAggregate {
    pub source: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub cumulated_amount: f64,
    pub trade_count: usize,
    /// Filled by the sequential return pass; `None` means undefined.
    pub period_return: Option<f64>,
}

impl ExchangeAggregate {
    pub fn empty(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            open: SENTINEL,
            high: SENTINEL,
            low: SENTINEL,
            close: SENTINEL,
            cumulated_amount: SENTINEL,
            trade_count: 0,
            period_return: None,
        }
    }

    pub fn has_data(&self) -> bool {
        self.trade_count > 0
    }

    /// Close usable as the reference of a later window's return.
    pub fn valid_close(&self) -> Option<f64> {
        (self.has_data() && self.close > 0.0).then_some(self.close)
    }

    /// `close / previous_close - 1`, undefined without a positive reference
    /// or when this window has no positive close.
    pub fn return_against(&self, previous_close: Option<f64>) -> Option<f64> {
        let previous = previous_close.filter(|p| *p > 0.0)?;
        let close = self.valid_close()?;
        Some(close / previous - 1.0)
    }
}

/// Reduce the time-ordered trades of one exchange in one window.
///
/// The return is left undefined here; it depends on earlier windows and is
/// filled by [`crate::returns::fill_returns`].
pub fn aggregate_exchange(
    source: &str,
    events: &[ExchangeEvent],
) -> Result<ExchangeAggregate, AggregationError> {
    let Some(first) = events.first() else {
        return Ok(ExchangeAggregate::empty(source));
    };

    let mut agg = ExchangeAggregate {
        source: source.to_string(),
        open: first.price,
        high: first.price,
        low: first.price,
        close: first.price,
        cumulated_amount: 0.0,
        trade_count: events.len(),
        period_return: None,
    };

    for e in events {
        for (field, value) in [("price", e.price), ("amount", e.amount)] {
            if !value.is_finite() || value < 0.0 {
                return Err(AggregationError::InvalidValue {
                    kind: SourceKind::Exchange,
                    timestamp: e.timestamp,
                    field,
                    value,
                });
            }
        }

        agg.high = agg.high.max(e.price);
        agg.low = agg.low.min(e.price);
        agg.close = e.price;
        agg.cumulated_amount += e.amount;
    }

    Ok(agg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::fixtures::{at, trade, tx};

    #[test]
    fn mean_fee_over_window_transactions() {
        let events = vec![
            tx(at(0, 0), 500_000, 10),
            tx(at(1, 0), 500_000, 20),
            tx(at(29, 0), 500_001, 30),
        ];
        let agg = aggregate_blockchain(&events).unwrap();
        assert_eq!(agg.transaction_count, 3);
        assert_eq!(agg.block_count, 2);
        assert_eq!(agg.fee.mean, 20.0);
        assert_eq!(agg.fee.sum, 60.0);
        assert_eq!(agg.transactions_per_block(), Some(1.5));
    }

    #[test]
    fn coinbase_is_excluded_from_ex_coinbase_stats() {
        let mut coinbase = tx(at(0, 0), 1, 0);
        coinbase.is_coinbase = true;
        coinbase.output_value = 1_250_000_000;
        let mut spend = tx(at(1, 0), 1, 100);
        spend.output_value = 5_000;
        spend.change_output = Some(1_000);

        let agg = aggregate_blockchain(&[coinbase, spend]).unwrap();
        assert_eq!(agg.adjusted_output.sum, 1_250_004_000.0);
        assert_eq!(agg.adjusted_output_ex_coinbase.sum, 4_000.0);
        assert_eq!(agg.adjusted_output_ex_coinbase.mean, 4_000.0);
        assert_eq!(to_coin(agg.adjusted_output.sum), 12.50004);
    }

    #[test]
    fn empty_window_yields_sentinels() {
        let agg = aggregate_blockchain(&[]).unwrap();
        assert_eq!(agg.transaction_count, 0);
        assert_eq!(agg.fee, Stat::SENTINEL);
        assert_eq!(agg.size_bytes.mean, SENTINEL);
        assert_eq!(agg.transactions_per_block(), None);
        assert_eq!(to_coin(agg.fee.mean), SENTINEL);

        let ex = aggregate_exchange("Bitstamp", &[]).unwrap();
        assert_eq!(ex.trade_count, 0);
        assert_eq!(ex.source, "Bitstamp");
        assert_eq!((ex.open, ex.high, ex.low, ex.close), (-1.0, -1.0, -1.0, -1.0));
        assert_eq!(ex.cumulated_amount, SENTINEL);
        assert_eq!(ex.period_return, None);
    }

    #[test]
    fn ohlc_follows_trade_order() {
        let events: Vec<_> = [100.0, 105.0, 95.0, 102.0]
            .iter()
            .enumerate()
            .map(|(i, p)| trade("Coinbase", at(i as u32, 0), *p, 0.5))
            .collect();
        let agg = aggregate_exchange("Coinbase", &events).unwrap();
        assert_eq!((agg.open, agg.high, agg.low, agg.close), (100.0, 105.0, 95.0, 102.0));
        assert_eq!(agg.cumulated_amount, 2.0);
        assert_eq!(agg.trade_count, 4);
    }

    #[test]
    fn negative_values_fail_the_window() {
        let mut bad = tx(at(0, 0), 1, 10);
        bad.change_output = Some(bad.output_value + 1);
        let err = aggregate_blockchain(&[bad]).unwrap_err();
        assert!(matches!(err, AggregationError::InvalidValue { field: "adjusted_output", .. }));

        let err = aggregate_exchange("Coinbase", &[trade("Coinbase", at(0, 0), f64::NAN, 1.0)])
            .unwrap_err();
        assert!(matches!(err, AggregationError::InvalidValue { field: "price", .. }));
    }

    #[test]
    fn return_requires_positive_closes() {
        let mut agg = ExchangeAggregate::empty("Coinbase");
        assert_eq!(agg.return_against(Some(100.0)), None);

        agg.trade_count = 1;
        agg.close = 110.0;
        assert_eq!(agg.return_against(None), None);
        assert_eq!(agg.return_against(Some(0.0)), None);
        assert!((agg.return_against(Some(100.0)).unwrap() - 0.1).abs() < 1e-12);
    }
}
