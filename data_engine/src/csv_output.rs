use std::fs::{File, OpenOptions};
use std::path::Path;

use aggregation_engine::{
    to_coin, BlockchainAggregate, CompositeRecord, ExchangeAggregate, ExchangeEvent, MedianSummary,
    MinedBlock, WindowAverages,
};
use csv::WriterBuilder;
use tracing::info;

use crate::error::DataError;
use crate::timestamps::format_ts;

/// A row type with an explicitly declared, ordered column list.
pub trait CsvRecord: std::fmt::Debug {
    fn headers(&self) -> Vec<String>;
    fn record(&self) -> Vec<String>;
}

/// Column name plus accessor.
pub type Field<T> = (&'static str, fn(&T) -> String);

fn num(v: f64) -> String {
    format!("{}", v)
}

/// Undefined derived values are written as an empty cell.
fn opt(v: Option<f64>) -> String {
    v.map(num).unwrap_or_default()
}

pub const BLOCKCHAIN_FIELDS: &[Field<BlockchainAggregate>] = &[
    ("CumulatedAmountBlockchain", |a| num(to_coin(a.adjusted_output.sum))),
    ("CumulatedAmountBlockchainExCoinbase", |a| num(to_coin(a.adjusted_output_ex_coinbase.sum))),
    ("AverageAdjustedOutput", |a| num(to_coin(a.adjusted_output.mean))),
    ("SumFee", |a| num(to_coin(a.fee.sum))),
    ("AverageFee", |a| num(to_coin(a.fee.mean))),
    ("SumInputCount", |a| num(a.input_count.sum)),
    ("AverageInputCount", |a| num(a.input_count.mean)),
    ("SumInputValue", |a| num(to_coin(a.input_value.sum))),
    ("AverageInputValue", |a| num(to_coin(a.input_value.mean))),
    ("SumOutputCount", |a| num(a.output_count.sum)),
    ("AverageOutputCount", |a| num(a.output_count.mean)),
    ("SumOutputValue", |a| num(to_coin(a.output_value.sum))),
    ("AverageOutputValue", |a| num(to_coin(a.output_value.mean))),
    ("AverageSizeInBytes", |a| num(a.size_bytes.mean)),
    ("NumberOfBlocks", |a| a.block_count.to_string()),
    ("NumberOfTransactions", |a| a.transaction_count.to_string()),
    ("TransactionsPerBlock", |a| opt(a.transactions_per_block())),
];

/// Prefixed with the upper-cased exchange name, e.g. `COINBASE_PriceOpen`.
pub const EXCHANGE_FIELDS: &[Field<ExchangeAggregate>] = &[
    ("PriceOpen", |e| num(e.open)),
    ("PriceHigh", |e| num(e.high)),
    ("PriceLow", |e| num(e.low)),
    ("PriceClose", |e| num(e.close)),
    ("CumulatedAmount", |e| num(e.cumulated_amount)),
    ("Return", |e| opt(e.period_return)),
    ("NumberOfTransactions", |e| e.trade_count.to_string()),
];

pub const BLOCK_FIELDS: &[Field<MinedBlock>] = &[
    ("Timestamp", |m| format_ts(&m.block.timestamp)),
    ("Height", |m| m.block.height.to_string()),
    ("Version", |m| m.block.version.to_string()),
    ("NBits", |m| num(m.block.nbits)),
    ("TotalSize", |m| m.block.total_size.to_string()),
    ("TxCount", |m| m.block.tx_count.to_string()),
    ("Fee", |m| num(to_coin(m.block.fee as f64))),
    ("InputCount", |m| m.block.input_count.to_string()),
    ("InputValue", |m| num(to_coin(m.block.input_value as f64))),
    ("OutputCount", |m| m.block.output_count.to_string()),
    ("OutputValue", |m| num(to_coin(m.block.output_value as f64))),
    ("Miner", |m| m.block.miner.clone()),
    ("MinerRevenue", |m| num(to_coin(m.block.miner_revenue))),
    ("FeeShareOnRevenue", |m| opt(m.block.fee_share_on_revenue())),
    ("MiningTimeMinutes", |m| opt(m.mining_time_minutes)),
];

fn names<T>(fields: &[Field<T>]) -> Vec<String> {
    fields.iter().map(|(name, _)| name.to_string()).collect()
}

fn values<T>(fields: &[Field<T>], row: &T) -> Vec<String> {
    fields.iter().map(|(_, get)| get(row)).collect()
}

impl CsvRecord for CompositeRecord {
    fn headers(&self) -> Vec<String> {
        let mut h = vec!["StartTime".to_string(), "EndTime".to_string()];
        h.extend(names(BLOCKCHAIN_FIELDS));
        for exchange in &self.exchanges {
            let prefix = exchange.source.to_uppercase();
            h.extend(EXCHANGE_FIELDS.iter().map(|(name, _)| format!("{prefix}_{name}")));
        }
        h.push("SumCumulatedExchangeAmount".to_string());
        h.push("ClosePriceRatio".to_string());
        h
    }

    fn record(&self) -> Vec<String> {
        let mut r = vec![format_ts(&self.window.start), format_ts(&self.window.end)];
        r.extend(values(BLOCKCHAIN_FIELDS, &self.blockchain));
        for exchange in &self.exchanges {
            r.extend(values(EXCHANGE_FIELDS, exchange));
        }
        r.push(num(self.sum_cumulated_exchange_amount));
        r.push(opt(self.close_price_ratio));
        r
    }
}

impl CsvRecord for MinedBlock {
    fn headers(&self) -> Vec<String> {
        names(BLOCK_FIELDS)
    }

    fn record(&self) -> Vec<String> {
        values(BLOCK_FIELDS, self)
    }
}

impl CsvRecord for MedianSummary {
    fn headers(&self) -> Vec<String> {
        vec!["Date".to_string(), "Price".to_string(), "Amount".to_string()]
    }

    fn record(&self) -> Vec<String> {
        vec![format_ts(&self.timestamp), num(self.price), num(self.amount)]
    }
}

pub const AVERAGE_FIELDS: &[Field<WindowAverages>] = &[
    ("Date", |a| format_ts(&a.timestamp)),
    ("AvgPrice", |a| opt(a.avg_price)),
    ("AvgAmountExchange", |a| opt(a.avg_amount_exchange)),
    ("AvgAmountBlockchain", |a| num(a.avg_amount_blockchain)),
    ("AvgFee", |a| num(a.avg_fee)),
];

impl CsvRecord for WindowAverages {
    fn headers(&self) -> Vec<String> {
        names(AVERAGE_FIELDS)
    }

    fn record(&self) -> Vec<String> {
        values(AVERAGE_FIELDS, self)
    }
}

impl CsvRecord for ExchangeEvent {
    fn headers(&self) -> Vec<String> {
        vec!["Timestamp".to_string(), "Price".to_string(), "Amount".to_string()]
    }

    fn record(&self) -> Vec<String> {
        vec![format_ts(&self.timestamp), num(self.price), num(self.amount)]
    }
}

/// Create or truncate `path` and write a header row followed by `records`.
pub fn write_csv<T: CsvRecord>(records: &[T], path: &Path, delimiter: u8) -> Result<(), DataError> {
    let file = File::create(path).map_err(|e| DataError::io(path, e))?;
    write_rows(file, records, path, delimiter, true)
}

/// Append `records` to `path`, creating it if needed. The header row is only
/// written when `with_header` is set.
pub fn append_csv<T: CsvRecord>(
    records: &[T],
    path: &Path,
    delimiter: u8,
    with_header: bool,
) -> Result<(), DataError> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| DataError::io(path, e))?;
    write_rows(file, records, path, delimiter, with_header)
}

fn write_rows<T: CsvRecord>(
    file: File,
    records: &[T],
    path: &Path,
    delimiter: u8,
    with_header: bool,
) -> Result<(), DataError> {
    let mut writer = WriterBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .from_writer(file);

    if with_header {
        if let Some(first) = records.first() {
            writer.write_record(first.headers()).map_err(|e| DataError::csv(path, e))?;
        }
    }
    for record in records {
        writer.write_record(record.record()).map_err(|e| DataError::csv(path, e))?;
    }
    writer.flush().map_err(|e| DataError::io(path, e))?;

    info!(path = %path.display(), rows = records.len(), "csv written");
    Ok(())
}
