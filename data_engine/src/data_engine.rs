use std::fs::File;
use std::path::Path;

use aggregation_engine::{BlockchainBlock, BlockchainEvent, ExchangeEvent};
use csv::{ReaderBuilder, StringRecord, Trim};
use tracing::{debug, info, warn};

use crate::error::{DataError, RecordError};
use crate::timestamps::{parse_timestamp, TimeMode};

pub const BLOCKCHAIN_FIELDS: usize = 11;
pub const BLOCK_FIELDS: usize = 13;

/// Column positions of one exchange trade file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExchangeFileLayout {
    pub fields: usize,
    pub timestamp: usize,
    pub price: usize,
    pub amount: usize,
}

impl ExchangeFileLayout {
    /// Raw trade dumps: timestamp, price, amount, then five unused columns.
    pub const TRADES: Self = Self { fields: 8, timestamp: 0, price: 1, amount: 2 };
    /// Trade history exports carrying the amount in column 5 and price in column 7.
    pub const HISTORY: Self = Self { fields: 8, timestamp: 0, price: 7, amount: 5 };
    /// Files produced by `merge-timestamps`.
    pub const MERGED: Self = Self { fields: 3, timestamp: 0, price: 1, amount: 2 };
}

impl Default for ExchangeFileLayout {
    fn default() -> Self {
        Self::TRADES
    }
}

pub struct DataEngine {
    time_mode: TimeMode,
}

impl DataEngine {
    pub fn new(time_mode: TimeMode) -> Self {
        DataEngine { time_mode }
    }

    /// Read every transaction row of `paths`, in file order.
    pub fn fetch_blockchain_transactions<P: AsRef<Path>>(
        &self,
        paths: &[P],
        delimiter: u8,
    ) -> Result<Vec<BlockchainEvent>, DataError> {
        let mut events = Vec::new();
        for path in paths {
            let path = path.as_ref();
            let before = events.len();
            read_rows(path, delimiter, true, &mut events, |row| self.parse_transaction(row))?;
            info!(
                path = %path.display(),
                transactions = events.len() - before,
                "blockchain file read"
            );
        }
        Ok(events)
    }

    pub fn fetch_blocks<P: AsRef<Path>>(
        &self,
        paths: &[P],
        delimiter: u8,
    ) -> Result<Vec<BlockchainBlock>, DataError> {
        let mut blocks = Vec::new();
        for path in paths {
            let path = path.as_ref();
            let before = blocks.len();
            read_rows(path, delimiter, true, &mut blocks, |row| self.parse_block(row))?;
            info!(path = %path.display(), blocks = blocks.len() - before, "block file read");
        }
        Ok(blocks)
    }

    /// Read a headerless trade file. Rows holding a `nan` cell are skipped.
    pub fn fetch_exchange_trades(
        &self,
        source: &str,
        path: &Path,
        delimiter: u8,
        layout: ExchangeFileLayout,
    ) -> Result<Vec<ExchangeEvent>, DataError> {
        let mut trades = Vec::new();
        read_rows(path, delimiter, false, &mut trades, |row| {
            self.parse_trade(source, row, layout)
        })?;
        info!(path = %path.display(), source, trades = trades.len(), "exchange file read");
        Ok(trades)
    }

    /// Zip a file of unix timestamps (one per line) with a `price,amount`
    /// file, row by row.
    pub fn fetch_exchange_trades_split(
        &self,
        source: &str,
        timestamps_path: &Path,
        data_path: &Path,
    ) -> Result<Vec<ExchangeEvent>, DataError> {
        let mut stamps: Vec<Option<chrono::NaiveDateTime>> = Vec::new();
        read_rows(timestamps_path, b',', false, &mut stamps, |row| {
            Ok(row.get(0).and_then(|raw| parse_timestamp(raw, self.time_mode)))
        })?;

        let mut data: Vec<Option<(f64, f64)>> = Vec::new();
        read_rows(data_path, b',', false, &mut data, |row| {
            // a row without exactly two fields is dropped and does not take a
            // timestamp; unparsable values stay as gaps to keep the alignment
            expect_fields(row, 2)?;
            let pair = || -> Result<(f64, f64), RecordError> {
                Ok((parse_f64(row, 0, "price")?, parse_f64(row, 1, "amount")?))
            };
            Ok(pair().ok())
        })?;

        if stamps.len() != data.len() {
            warn!(
                timestamps = stamps.len(),
                rows = data.len(),
                "timestamp and data files differ in length, extra rows dropped"
            );
        }

        let trades: Vec<ExchangeEvent> = stamps
            .into_iter()
            .zip(data)
            .filter_map(|(ts, row)| {
                let (price, amount) = row?;
                Some(ExchangeEvent {
                    source: source.to_string(),
                    timestamp: ts?,
                    price,
                    amount,
                })
            })
            .collect();
        info!(source, trades = trades.len(), "split exchange files merged");
        Ok(trades)
    }

    fn timestamp(
        &self,
        row: &StringRecord,
        idx: usize,
    ) -> Result<chrono::NaiveDateTime, RecordError> {
        let raw = field(row, idx)?;
        parse_timestamp(raw, self.time_mode).ok_or_else(|| RecordError::InvalidField {
            field: "timestamp",
            value: raw.to_string(),
        })
    }

    fn parse_transaction(&self, row: &StringRecord) -> Result<BlockchainEvent, RecordError> {
        expect_fields(row, BLOCKCHAIN_FIELDS)?;
        Ok(BlockchainEvent {
            timestamp: self.timestamp(row, 0)?,
            block_height: parse_num(row, 1, "block_height")?,
            size_bytes: parse_num(row, 2, "size_bytes")?,
            is_coinbase: parse_bool(row, 3, "is_coinbase")?,
            lock_time: parse_num(row, 4, "lock_time")?,
            fee: parse_base_units(row, 5, "fee")?,
            input_count: parse_num(row, 6, "input_count")?,
            input_value: parse_base_units(row, 7, "input_value")?,
            output_count: parse_num(row, 8, "output_count")?,
            output_value: parse_base_units(row, 9, "output_value")?,
            change_output: parse_change_output(row, 10)?,
        })
    }

    fn parse_block(&self, row: &StringRecord) -> Result<BlockchainBlock, RecordError> {
        expect_fields(row, BLOCK_FIELDS)?;
        Ok(BlockchainBlock {
            timestamp: self.timestamp(row, 0)?,
            height: parse_num(row, 1, "height")?,
            version: parse_num(row, 2, "version")?,
            nbits: parse_f64(row, 3, "nbits")?,
            total_size: parse_num(row, 4, "total_size")?,
            tx_count: parse_num(row, 5, "tx_count")?,
            fee: parse_base_units(row, 6, "fee")?,
            input_count: parse_num(row, 7, "input_count")?,
            input_value: parse_base_units(row, 8, "input_value")?,
            output_count: parse_num(row, 9, "output_count")?,
            output_value: parse_base_units(row, 10, "output_value")?,
            miner: field(row, 11)?.to_string(),
            miner_revenue: parse_f64(row, 12, "miner_revenue")?,
        })
    }

    fn parse_trade(
        &self,
        source: &str,
        row: &StringRecord,
        layout: ExchangeFileLayout,
    ) -> Result<ExchangeEvent, RecordError> {
        if row.iter().any(|cell| cell.eq_ignore_ascii_case("nan")) {
            return Err(RecordError::NotANumber);
        }
        expect_fields(row, layout.fields)?;
        Ok(ExchangeEvent {
            source: source.to_string(),
            timestamp: self.timestamp(row, layout.timestamp)?,
            price: parse_f64(row, layout.price, "price")?,
            amount: parse_f64(row, layout.amount, "amount")?,
        })
    }
}

/// Parse each row of `path` with `parse`, pushing successes onto `out`.
/// Rows that fail to parse are logged and skipped.
fn read_rows<T, F>(
    path: &Path,
    delimiter: u8,
    has_headers: bool,
    out: &mut Vec<T>,
    mut parse: F,
) -> Result<(), DataError>
where
    F: FnMut(&StringRecord) -> Result<T, RecordError>,
{
    let file = File::open(path).map_err(|e| DataError::io(path, e))?;
    let mut rdr = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(has_headers)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(file);

    let mut skipped = 0usize;
    for (line, result) in rdr.records().enumerate() {
        let row = result.map_err(|e| DataError::csv(path, e))?;
        if row.iter().all(str::is_empty) {
            continue;
        }
        match parse(&row) {
            Ok(value) => out.push(value),
            Err(err) => {
                skipped += 1;
                debug!(path = %path.display(), line = line + 1, %err, "malformed record skipped");
            }
        }
    }
    if skipped > 0 {
        warn!(path = %path.display(), skipped, "malformed records skipped");
    }
    Ok(())
}

fn expect_fields(row: &StringRecord, expected: usize) -> Result<(), RecordError> {
    if row.len() != expected {
        return Err(RecordError::FieldCount { expected, found: row.len() });
    }
    Ok(())
}

fn field(row: &StringRecord, idx: usize) -> Result<&str, RecordError> {
    row.get(idx).ok_or(RecordError::FieldCount {
        expected: idx + 1,
        found: row.len(),
    })
}

fn invalid(field: &'static str, value: &str) -> RecordError {
    RecordError::InvalidField { field, value: value.to_string() }
}

fn parse_num<T: std::str::FromStr>(
    row: &StringRecord,
    idx: usize,
    name: &'static str,
) -> Result<T, RecordError> {
    let raw = field(row, idx)?;
    raw.parse().map_err(|_| invalid(name, raw))
}

fn parse_f64(row: &StringRecord, idx: usize, name: &'static str) -> Result<f64, RecordError> {
    let raw = field(row, idx)?;
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(invalid(name, raw)),
    }
}

fn parse_bool(row: &StringRecord, idx: usize, name: &'static str) -> Result<bool, RecordError> {
    let raw = field(row, idx)?;
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(invalid(name, raw)),
    }
}

/// Integer base units. Exports sometimes write them as `123.0`.
fn parse_base_units(
    row: &StringRecord,
    idx: usize,
    name: &'static str,
) -> Result<i64, RecordError> {
    let raw = field(row, idx)?;
    if let Ok(v) = raw.parse::<i64>() {
        return Ok(v);
    }
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() && v.fract() == 0.0 && v.abs() < i64::MAX as f64 => Ok(v as i64),
        _ => Err(invalid(name, raw)),
    }
}

/// `-1` marks a transaction without a detected change output.
fn parse_change_output(row: &StringRecord, idx: usize) -> Result<Option<i64>, RecordError> {
    let raw = field(row, idx)?;
    if raw.is_empty() {
        return Ok(None);
    }
    let value = parse_base_units(row, idx, "change_output")?;
    Ok((value != -1).then_some(value))
}
