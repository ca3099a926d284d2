use tracing::{error, info};

use crate::config::AggregationConfig;
use crate::dispatch::{self, WindowFailure};
use crate::error::ConfigError;
use crate::interval::{covering, Window};
use crate::merge::CompositeRecord;
use crate::record::EventSources;
use crate::returns::fill_returns;

/// Result of one aggregation run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RunReport {
    pub window_count: usize,
    /// Successful windows, sorted by start, returns filled in.
    pub records: Vec<CompositeRecord>,
    pub failures: Vec<WindowFailure>,
}

impl RunReport {
    /// A run with any failed window counts as failed, though its records are still usable.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failed_windows(&self) -> Vec<Window> {
        self.failures.iter().map(|f| f.window).collect()
    }
}

pub struct AggregationEngine {
    config: AggregationConfig,
}

impl AggregationEngine {
    pub fn new(config: AggregationConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(AggregationEngine { config })
    }

    pub fn config(&self) -> &AggregationConfig {
        &self.config
    }

    /// Windows tiling the configured span of `sources`.
    pub fn plan_windows(&self, sources: &EventSources) -> Result<Vec<Window>, ConfigError> {
        let width = self.config.interval_width()?;
        Ok(match sources.span(self.config.window_basis) {
            Some((first, last)) => covering(first, last, width),
            None => Vec::new(),
        })
    }

    pub fn run(&self, sources: &EventSources) -> Result<RunReport, ConfigError> {
        let windows = self.plan_windows(sources)?;
        if let (Some(first), Some(last)) = (windows.first(), windows.last()) {
            info!(
                windows = windows.len(),
                start = %first.start,
                end = %last.end,
                exchanges = ?sources.exchange_names(),
                "aggregating"
            );
        }

        let outcome = dispatch::run(&windows, sources, self.config.max_parallelism);
        let mut records = outcome.records;
        fill_returns(&mut records, &outcome.failures);

        for failure in &outcome.failures {
            error!(%failure, "window missing from output");
        }
        info!(
            records = records.len(),
            failed = outcome.failures.len(),
            "aggregation finished"
        );

        Ok(RunReport {
            window_count: windows.len(),
            records,
            failures: outcome.failures,
        })
    }
}
