use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Format used for every timestamp written to output files.
pub const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Wall clock the parsed unix timestamps are expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeMode {
    #[default]
    Utc,
    Local,
}

/// Unix seconds (fractional allowed, millisecond precision) to a naive timestamp.
pub fn unix_to_naive(seconds: f64, mode: TimeMode) -> Option<NaiveDateTime> {
    if !seconds.is_finite() {
        return None;
    }
    let millis = (seconds * 1000.0).round();
    if millis.abs() > i64::MAX as f64 {
        return None;
    }
    let utc = DateTime::from_timestamp_millis(millis as i64)?;
    Some(match mode {
        TimeMode::Utc => utc.naive_utc(),
        TimeMode::Local => utc.with_timezone(&Local).naive_local(),
    })
}

/// Parse either unix seconds or a calendar timestamp.
pub fn parse_timestamp(raw: &str, mode: TimeMode) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if let Ok(seconds) = s.parse::<f64>() {
        return unix_to_naive(seconds, mode);
    }
    parse_ts_to_naive(s)
}

pub fn parse_ts_to_naive(ts: &str) -> Option<NaiveDateTime> {
    let s = ts.trim();

    let fmts = [
        "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f",
        "%Y.%m.%dT%H:%M:%S", "%Y.%m.%d %H:%M:%S",
        "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M",
    ];
    for f in &fmts {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, f) {
            return Some(dt);
        }
    }

    for f in ["%Y-%m-%d", "%Y.%m.%d"] {
        if let Ok(d) = NaiveDate::parse_from_str(s, f) {
            return d.and_hms_opt(0, 0, 0);
        }
    }

    None
}

pub fn format_ts(ts: &NaiveDateTime) -> String {
    ts.format(DISPLAY_FORMAT).to_string()
}
