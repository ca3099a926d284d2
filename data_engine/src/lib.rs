//! File adapters: reading transaction, block and trade files, and writing
//! aggregated rows back out as CSV.

pub mod csv_output;
pub mod data_engine;
pub mod discovery;
pub mod error;
pub mod timestamps;

pub use crate::csv_output::{append_csv, write_csv, CsvRecord};
pub use crate::data_engine::{DataEngine, ExchangeFileLayout};
pub use crate::discovery::files_with_pattern;
pub use crate::error::{DataError, RecordError};
pub use crate::timestamps::{format_ts, parse_timestamp, unix_to_naive, TimeMode};
