use chrono::NaiveDateTime;
use serde::Serialize;

use crate::assign::assign;
use crate::interval::Window;
use crate::record::ExchangeEvent;

/// Median resample of one exchange window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MedianSummary {
    /// Timestamp of the middle trade of the window.
    pub timestamp: NaiveDateTime,
    pub price: f64,
    pub amount: f64,
}

impl MedianSummary {
    /// Round price and amount to the nearest unit.
    pub fn rounded(&self) -> Self {
        Self {
            timestamp: self.timestamp,
            price: self.price.round(),
            amount: self.amount.round(),
        }
    }
}

/// Upper median: element `len / 2` of the sorted values.
pub fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    Some(values[values.len() / 2])
}

pub fn summarize_medians(events: &[ExchangeEvent]) -> Option<MedianSummary> {
    let middle = events.get(events.len() / 2)?;
    let mut prices: Vec<f64> = events.iter().map(|e| e.price).collect();
    let mut amounts: Vec<f64> = events.iter().map(|e| e.amount).collect();
    Some(MedianSummary {
        timestamp: middle.timestamp,
        price: median(&mut prices)?,
        amount: median(&mut amounts)?,
    })
}

/// One summary per non-empty window, in window order.
pub fn resample_medians(sorted_events: &[ExchangeEvent], windows: &[Window]) -> Vec<MedianSummary> {
    windows
        .iter()
        .filter_map(|w| summarize_medians(assign(sorted_events, w)))
        .collect()
}
