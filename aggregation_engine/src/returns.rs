use std::collections::HashMap;

use crate::dispatch::WindowFailure;
use crate::interval::Window;
use crate::merge::CompositeRecord;

/// Fill every exchange aggregate's return, walking records in window order.
///
/// Each source is compared with its own most recent window that had a
/// positive close; empty or invalid windows in between are skipped.
/// Failed windows still count: a close they computed becomes the reference,
/// and a source they could not aggregate has no reference until its next
/// valid close. Both slices must be sorted by window start.
pub fn fill_returns(records: &mut [CompositeRecord], failures: &[WindowFailure]) {
    let mut last_close: HashMap<String, f64> = HashMap::new();
    let mut failures = failures.iter().peekable();

    for record in records.iter_mut() {
        while let Some(failure) = failures.next_if(|f| order(&f.window) < order(&record.window)) {
            last_close.retain(|source, _| failure.exchanges.iter().any(|a| &a.source == source));
            for agg in &failure.exchanges {
                if let Some(close) = agg.valid_close() {
                    last_close.insert(agg.source.clone(), close);
                }
            }
        }

        for agg in record.exchanges.iter_mut() {
            agg.period_return = agg.return_against(last_close.get(&agg.source).copied());
            if let Some(close) = agg.valid_close() {
                last_close.insert(agg.source.clone(), close);
            }
        }
    }
}

fn order(window: &Window) -> (chrono::NaiveDateTime, usize) {
    (window.start, window.index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{aggregate_exchange, BlockchainAggregate, ExchangeAggregate};
    use crate::error::AggregationError;
    use crate::interval::generate;
    use crate::merge::merge;
    use crate::record::fixtures::{at, trade};
    use chrono::TimeDelta;

    fn records(closes: &[(&str, Option<f64>)]) -> Vec<CompositeRecord> {
        let windows = generate(at(0, 0), at(closes.len() as u32, 0), TimeDelta::minutes(1));
        windows
            .iter()
            .zip(closes)
            .map(|(w, (source, close))| {
                let agg = match close {
                    Some(c) => {
                        aggregate_exchange(source, &[trade(source, w.start, *c, 1.0)]).unwrap()
                    }
                    None => ExchangeAggregate::empty(*source),
                };
                merge(*w, BlockchainAggregate::empty(), vec![agg])
            })
            .collect()
    }

    fn returns(records: &[CompositeRecord]) -> Vec<Option<f64>> {
        records.iter().map(|r| r.exchanges[0].period_return).collect()
    }

    #[test]
    fn skips_empty_windows_when_looking_back() {
        let mut recs = records(&[
            ("Coinbase", Some(100.0)),
            ("Coinbase", Some(110.0)),
            ("Coinbase", None),
            ("Coinbase", Some(121.0)),
        ]);
        fill_returns(&mut recs, &[]);
        let r = returns(&recs);

        assert_eq!(r[0], None);
        assert!((r[1].unwrap() - 0.10).abs() < 1e-9);
        assert_eq!(r[2], None);
        assert!((r[3].unwrap() - 0.10).abs() < 1e-9);
    }

    #[test]
    fn zero_close_is_not_a_reference() {
        let mut recs = records(&[
            ("Coinbase", Some(50.0)),
            ("Coinbase", Some(0.0)),
            ("Coinbase", Some(75.0)),
        ]);
        fill_returns(&mut recs, &[]);
        let r = returns(&recs);
        assert_eq!(r[1], None);
        assert!((r[2].unwrap() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn failed_window_close_stays_the_reference() {
        let mut recs = records(&[
            ("Coinbase", Some(100.0)),
            ("Coinbase", Some(110.0)),
            ("Coinbase", Some(121.0)),
        ]);
        let failed = recs.remove(1);
        let failures = vec![WindowFailure {
            window: failed.window,
            error: AggregationError::Panicked("blockchain".to_string()),
            exchanges: failed.exchanges,
        }];
        fill_returns(&mut recs, &failures);
        let r = returns(&recs);

        assert_eq!(r[0], None);
        assert!((r[1].unwrap() - 0.10).abs() < 1e-9);
    }

    #[test]
    fn source_missing_from_failed_window_loses_its_reference() {
        let mut recs = records(&[
            ("Coinbase", Some(100.0)),
            ("Coinbase", Some(110.0)),
            ("Coinbase", Some(121.0)),
            ("Coinbase", Some(133.1)),
        ]);
        let failed = recs.remove(1);
        let failures = vec![WindowFailure {
            window: failed.window,
            error: AggregationError::Panicked("worker".to_string()),
            exchanges: Vec::new(),
        }];
        fill_returns(&mut recs, &failures);
        let r = returns(&recs);

        assert_eq!(r[1], None);
        assert!((r[2].unwrap() - 0.10).abs() < 1e-9);
    }

    #[test]
    fn sources_do_not_share_references() {
        let windows = generate(at(0, 0), at(2, 0), TimeDelta::minutes(1));
        let a0 = aggregate_exchange("A", &[trade("A", at(0, 0), 100.0, 1.0)]).unwrap();
        let b0 = ExchangeAggregate::empty("B");
        let a1 = aggregate_exchange("A", &[trade("A", at(1, 0), 120.0, 1.0)]).unwrap();
        let b1 = aggregate_exchange("B", &[trade("B", at(1, 0), 90.0, 1.0)]).unwrap();

        let mut recs = vec![
            merge(windows[0], BlockchainAggregate::empty(), vec![a0, b0]),
            merge(windows[1], BlockchainAggregate::empty(), vec![a1, b1]),
        ];
        fill_returns(&mut recs, &[]);

        assert!((recs[1].exchanges[0].period_return.unwrap() - 0.2).abs() < 1e-9);
        assert_eq!(recs[1].exchanges[1].period_return, None);
    }
}
