use std::env;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const ENV_INTERVAL_WIDTH_MS: &str = "AGG_INTERVAL_WIDTH_MS";
pub const ENV_MAX_PARALLELISM: &str = "AGG_MAX_PARALLELISM";

/// Which streams decide the first and last window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowBasis {
    /// Span of the blockchain transactions only.
    #[default]
    Blockchain,
    /// Span of every source.
    Union,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// Width of each aggregation window in milliseconds.
    pub interval_width_ms: i64,
    /// Upper bound on windows aggregated concurrently.
    pub max_parallelism: usize,
    pub window_basis: WindowBasis,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            interval_width_ms: 30 * 60 * 1000,
            max_parallelism: 50,
            window_basis: WindowBasis::Blockchain,
        }
    }
}

impl AggregationConfig {
    /// Apply `AGG_INTERVAL_WIDTH_MS` and `AGG_MAX_PARALLELISM` when set.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| env::var(key).ok())
    }

    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_INTERVAL_WIDTH_MS) {
            self.interval_width_ms = raw.trim().parse().map_err(|_| {
                ConfigError::Validation(format!("{ENV_INTERVAL_WIDTH_MS} is not an integer: {raw}"))
            })?;
        }
        if let Some(raw) = lookup(ENV_MAX_PARALLELISM) {
            self.max_parallelism = raw.trim().parse().map_err(|_| {
                ConfigError::Validation(format!("{ENV_MAX_PARALLELISM} is not an integer: {raw}"))
            })?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_width_ms <= 0 {
            return Err(ConfigError::Validation(format!(
                "interval_width_ms must be positive, got {}",
                self.interval_width_ms
            )));
        }
        if self.max_parallelism == 0 {
            return Err(ConfigError::Validation(
                "max_parallelism must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn interval_width(&self) -> Result<TimeDelta, ConfigError> {
        TimeDelta::try_milliseconds(self.interval_width_ms)
            .filter(|w| *w > TimeDelta::zero())
            .ok_or_else(|| {
                ConfigError::Validation(format!(
                    "interval_width_ms out of range: {}",
                    self.interval_width_ms
                ))
            })
    }
}

/// Parse a human interval such as `500ms`, `30s`, `10m`, `1h` or `1d` into
/// milliseconds. A bare number is taken as minutes.
pub fn parse_interval_ms(raw: &str) -> Result<i64, ConfigError> {
    let s = raw.trim().to_ascii_lowercase();
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (digits, unit) = s.split_at(split);

    let amount: i64 = digits
        .parse()
        .map_err(|_| ConfigError::Interval(raw.to_string()))?;
    let factor = match unit.trim() {
        "ms" => 1,
        "s" | "sec" => 1_000,
        "" | "m" | "min" => 60_000,
        "h" => 3_600_000,
        "d" => 86_400_000,
        _ => return Err(ConfigError::Interval(raw.to_string())),
    };

    match amount.checked_mul(factor) {
        Some(ms) if ms > 0 => Ok(ms),
        _ => Err(ConfigError::Interval(raw.to_string())),
    }
}
