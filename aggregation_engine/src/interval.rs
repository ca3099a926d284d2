use std::fmt;

use chrono::{NaiveDateTime, TimeDelta};
use serde::Serialize;

/// Half-open aggregation interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Window {
    /// Position in generation order.
    pub index: usize,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl Window {
    pub fn contains(&self, ts: NaiveDateTime) -> bool {
        self.start <= ts && ts < self.end
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} [{} - {})", self.index, self.start, self.end)
    }
}

/// Tile `[start, end)` with windows of `width`.
///
/// The last window may reach past `end`. Yields nothing when `start >= end`
/// or when `width` is not positive.
pub fn generate(start: NaiveDateTime, end: NaiveDateTime, width: TimeDelta) -> Vec<Window> {
    let mut windows = Vec::new();
    if width <= TimeDelta::zero() {
        return windows;
    }

    let mut cursor = start;
    while cursor < end {
        let Some(next) = cursor.checked_add_signed(width) else {
            break;
        };
        windows.push(Window {
            index: windows.len(),
            start: cursor,
            end: next,
        });
        cursor = next;
    }
    windows
}

/// Tile the closed event span `[first, last]`.
///
/// An event sitting exactly on `last` still lands in a window, and a span
/// holding a single instant yields one window.
pub fn covering(first: NaiveDateTime, last: NaiveDateTime, width: TimeDelta) -> Vec<Window> {
    let end = last
        .checked_add_signed(TimeDelta::nanoseconds(1))
        .unwrap_or(last);
    generate(first, end, width)
}
