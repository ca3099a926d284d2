use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::thread;

use crossbeam_channel::{bounded, unbounded};
use tracing::{debug, warn};

use crate::aggregate::{aggregate_blockchain, aggregate_exchange, ExchangeAggregate};
use crate::assign::assign;
use crate::error::AggregationError;
use crate::interval::Window;
use crate::merge::{merge, CompositeRecord};
use crate::record::EventSources;

/// A window whose aggregation did not produce a record.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowFailure {
    pub window: Window,
    pub error: AggregationError,
    /// Exchange aggregates that were still computable, in source order.
    /// A source missing here has no usable close for this window.
    pub exchanges: Vec<ExchangeAggregate>,
}

impl fmt::Display for WindowFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "window {}: {}", self.window, self.error)
    }
}

/// Everything the worker pool produced, sorted by window start.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DispatchOutcome {
    pub records: Vec<CompositeRecord>,
    pub failures: Vec<WindowFailure>,
}

impl DispatchOutcome {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Aggregate one window across every source.
///
/// On failure the exchange aggregates that did succeed are kept, so the
/// return pass still sees this window's closes.
pub fn process_window(
    window: &Window,
    sources: &EventSources,
) -> Result<CompositeRecord, WindowFailure> {
    let mut exchanges = Vec::with_capacity(sources.exchanges.len());
    let mut exchange_error = None;
    for source in &sources.exchanges {
        match aggregate_exchange(&source.name, assign(&source.events, window)) {
            Ok(agg) => exchanges.push(agg),
            Err(err) => {
                exchange_error.get_or_insert(err);
            }
        }
    }

    match (aggregate_blockchain(assign(&sources.blockchain, window)), exchange_error) {
        (Ok(blockchain), None) => Ok(merge(*window, blockchain, exchanges)),
        (Err(error), _) | (Ok(_), Some(error)) => Err(WindowFailure {
            window: *window,
            error,
            exchanges,
        }),
    }
}

/// Aggregate every window on a pool of at most `max_parallelism` workers.
///
/// Workers pull windows from a bounded queue and run each to completion.
/// A failing or panicking window is recorded and never stops its siblings.
/// Returns once every window has been handled.
pub fn run(windows: &[Window], sources: &EventSources, max_parallelism: usize) -> DispatchOutcome {
    run_with(windows, max_parallelism, |window| process_window(window, sources))
}

pub(crate) fn run_with<F>(windows: &[Window], max_parallelism: usize, work: F) -> DispatchOutcome
where
    F: Fn(&Window) -> Result<CompositeRecord, WindowFailure> + Sync,
{
    if windows.is_empty() {
        return DispatchOutcome::default();
    }

    let workers = max_parallelism.clamp(1, windows.len());
    let (job_tx, job_rx) = bounded::<Window>(workers);
    let (result_tx, result_rx) = unbounded();

    debug!(windows = windows.len(), workers, "dispatching windows");

    thread::scope(|scope| {
        for worker in 0..workers {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            let work = &work;
            scope.spawn(move || {
                for window in job_rx.iter() {
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| work(&window)))
                        .unwrap_or_else(|payload| {
                            Err(WindowFailure {
                                window,
                                error: AggregationError::Panicked(panic_message(payload)),
                                exchanges: Vec::new(),
                            })
                        });
                    if result_tx.send(outcome).is_err() {
                        break;
                    }
                }
                debug!(worker, "worker drained");
            });
        }
        drop(job_rx);
        drop(result_tx);

        for window in windows {
            // blocks while every worker is busy and the queue is full
            if job_tx.send(*window).is_err() {
                break;
            }
        }
        drop(job_tx);
    });

    let mut outcome = DispatchOutcome::default();
    for result in result_rx.iter() {
        match result {
            Ok(record) => outcome.records.push(record),
            Err(failure) => {
                warn!(
                    window = %failure.window,
                    error = %failure.error,
                    "window aggregation failed"
                );
                outcome.failures.push(failure);
            }
        }
    }

    outcome.records.sort_by_key(|r| (r.window.start, r.window.index));
    outcome.failures.sort_by_key(|f| (f.window.start, f.window.index));
    outcome
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interval::covering;
    use crate::record::fixtures::{at, trade, tx};
    use crate::aggregate::BlockchainAggregate;
    use crate::record::{BlockchainEvent, ExchangeSource};
    use chrono::TimeDelta;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn sample_sources() -> EventSources {
        let blockchain: Vec<BlockchainEvent> = (0..240u32)
            .map(|i| tx(at(i * 3 / 2, i % 60), u64::from(500_000 + i / 7), i64::from(i % 13) * 100))
            .collect();
        let coinbase = (0..300u32)
            .map(|i| trade("Coinbase", at(i, (i * 7) % 60), 10_000.0 + f64::from(i % 17), 0.25))
            .collect();
        let bitstamp = (0..150u32)
            .map(|i| trade("Bitstamp", at(i * 2, 30), 10_010.0 - f64::from(i % 11), 0.5))
            .collect();
        EventSources::new(
            blockchain,
            vec![
                ExchangeSource::new("Coinbase", coinbase),
                ExchangeSource::new("Bitstamp", bitstamp),
            ],
        )
    }

    #[test]
    fn output_does_not_depend_on_worker_count() {
        let sources = sample_sources();
        let (first, last) = sources.span(crate::config::WindowBasis::Union).unwrap();
        let windows = covering(first, last, TimeDelta::minutes(30));

        let sequential = run(&windows, &sources, 1);
        assert!(sequential.is_complete());
        assert_eq!(sequential.records.len(), windows.len());
        for workers in [2, 3, 8, 64] {
            assert_eq!(run(&windows, &sources, workers), sequential);
        }
    }

    #[test]
    fn records_come_back_sorted_by_window_start() {
        let sources = sample_sources();
        let (first, last) = sources.span(crate::config::WindowBasis::Blockchain).unwrap();
        let windows = covering(first, last, TimeDelta::minutes(7));
        let outcome = run(&windows, &sources, 4);

        let starts: Vec<_> = outcome.records.iter().map(|r| r.window.start).collect();
        let mut sorted = starts.clone();
        sorted.sort();
        assert_eq!(starts, sorted);
        assert_eq!(outcome.records[0].window, windows[0]);
    }

    #[test]
    fn failing_window_does_not_abort_siblings() {
        let mut bad = tx(at(45, 0), 1, 10);
        bad.fee = -5;
        let sources = EventSources::new(
            vec![tx(at(0, 0), 1, 10), bad, tx(at(75, 0), 2, 10)],
            vec![ExchangeSource::new("Coinbase", vec![trade("Coinbase", at(10, 0), 1.0, 1.0)])],
        );
        let windows = covering(at(0, 0), at(75, 0), TimeDelta::minutes(30));
        let outcome = run(&windows, &sources, 2);

        assert!(!outcome.is_complete());
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].window, windows[1]);
        assert_eq!(outcome.records.len(), 2);
        assert!(outcome.failures[0].to_string().contains("fee"));
    }

    #[test]
    fn failed_window_keeps_its_exchange_aggregates() {
        let mut bad = tx(at(5, 0), 1, 10);
        bad.output_value = -1;
        let sources = EventSources::new(
            vec![bad],
            vec![ExchangeSource::new("Coinbase", vec![trade("Coinbase", at(10, 0), 110.0, 1.0)])],
        );
        let windows = covering(at(0, 0), at(5, 0), TimeDelta::minutes(30));
        let failure = process_window(&windows[0], &sources).unwrap_err();

        assert_eq!(failure.exchanges.len(), 1);
        assert_eq!(failure.exchanges[0].close, 110.0);
    }

    #[test]
    fn never_more_than_max_parallelism_in_flight() {
        let windows = covering(at(0, 0), at(119, 0), TimeDelta::minutes(5));
        let in_flight = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);

        let outcome = run_with(&windows, 3, |window| {
            let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(5));
            in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(merge(*window, BlockchainAggregate::empty(), Vec::new()))
        });

        assert_eq!(outcome.records.len(), windows.len());
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn panicking_window_is_recorded_and_siblings_complete() {
        let windows = covering(at(0, 0), at(59, 0), TimeDelta::minutes(10));
        let outcome = run_with(&windows, 2, |window| {
            if window.index == 2 {
                panic!("bad window");
            }
            Ok(merge(*window, BlockchainAggregate::empty(), Vec::new()))
        });

        assert_eq!(outcome.records.len(), windows.len() - 1);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].window, windows[2]);
        assert_eq!(
            outcome.failures[0].error,
            AggregationError::Panicked("bad window".to_string())
        );
        assert!(outcome.failures[0].exchanges.is_empty());
    }

    #[test]
    fn no_windows_no_work() {
        let outcome = run(&[], &EventSources::default(), 8);
        assert!(outcome.records.is_empty());
        assert!(outcome.is_complete());
    }
}
