mod config;
mod logging;

use std::fs::File;
use std::path::{Path, PathBuf};

use aggregation_engine::{
    covering, parse_interval_ms, resample_averages, resample_medians, with_mining_times,
    AggregationEngine, EventSources, ExchangeSource, WindowAverages, WindowBasis,
};
use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use data_engine::{append_csv, files_with_pattern, write_csv, DataEngine, TimeMode};
use tracing::{info, warn};

use crate::config::{delimiter_byte, ExchangeInput, RunConfig};
use crate::logging::setup_logging;

#[derive(Parser, Debug)]
#[command(
    name = "chain-exchange-aggregator",
    about = "Aggregate blockchain transactions and exchange trades into aligned time windows"
)]
struct Cli {
    /// JSON run configuration; missing keys fall back to defaults.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Directory holding the input files.
    #[arg(long, global = true, value_name = "DIR")]
    data_dir: Option<PathBuf>,
    /// Convert unix timestamps to local time instead of UTC.
    #[arg(long, global = true)]
    local_time: bool,
    #[arg(long, global = true, value_name = "LEVEL")]
    log_level: Option<String>,
    #[arg(long, global = true)]
    log_json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Bucket transactions and trades into windows and write one row per window.
    Aggregate {
        #[arg(long, default_value = "aggregated.csv")]
        output: PathBuf,
        /// Window width such as `30m`, `1h` or `500ms`.
        #[arg(long)]
        interval: Option<String>,
        #[arg(long)]
        max_parallelism: Option<usize>,
        /// Span windows over every source instead of the blockchain only.
        #[arg(long)]
        union_span: bool,
        /// Aggregate each transaction file on its own, appending to one output.
        #[arg(long)]
        per_file: bool,
    },
    /// List blocks with their mining time and fee share.
    Blocks {
        #[arg(long, default_value = "blocks_mining_time.csv")]
        output: PathBuf,
    },
    /// Resample one exchange's trades to per-window medians.
    Medians {
        /// Configured exchange name; defaults to the first one.
        #[arg(long)]
        exchange: Option<String>,
        #[arg(long, default_value = "1m")]
        interval: String,
        /// Round price and amount to whole units.
        #[arg(long)]
        round: bool,
        #[arg(long, default_value = "medians.csv")]
        output: PathBuf,
    },
    /// Average one exchange's trades and the transactions per window.
    Averages {
        /// Configured exchange name; defaults to the first one.
        #[arg(long)]
        exchange: Option<String>,
        #[arg(long, default_value = "1m")]
        interval: String,
        #[arg(long, default_value = "exchange_blockchain_aggregated.csv")]
        output: PathBuf,
    },
    /// Join a file of unix timestamps with a `price,amount` file.
    MergeTimestamps {
        #[arg(long)]
        timestamps: PathBuf,
        #[arg(long)]
        data: PathBuf,
        #[arg(long, default_value = "Exchange")]
        name: String,
        #[arg(long)]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = RunConfig::load(cli.config.as_deref())?;
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    if cli.local_time {
        config.time_mode = TimeMode::Local;
    }

    let level = cli.log_level.clone().unwrap_or_else(|| config.log_level.clone());
    setup_logging(&level, cli.log_json || config.log_json);
    if let Some(path) = &cli.config {
        info!(path = %path.display(), "run config loaded");
    }

    match cli.command {
        Command::Aggregate {
            output,
            interval,
            max_parallelism,
            union_span,
            per_file,
        } => {
            if let Some(raw) = interval {
                config.aggregation.interval_width_ms = parse_interval_ms(&raw)?;
            }
            if let Some(n) = max_parallelism {
                config.aggregation.max_parallelism = n;
            }
            if union_span {
                config.aggregation.window_basis = WindowBasis::Union;
            }
            config.validate()?;
            aggregate(&config, &output, per_file)
        }
        Command::Blocks { output } => blocks(&config, &output),
        Command::Medians {
            exchange,
            interval,
            round,
            output,
        } => medians(&config, exchange.as_deref(), &interval, round, &output),
        Command::Averages {
            exchange,
            interval,
            output,
        } => averages(&config, exchange.as_deref(), &interval, &output),
        Command::MergeTimestamps {
            timestamps,
            data,
            name,
            output,
        } => merge_timestamps(&config, &name, &timestamps, &data, &output),
    }
}

fn load_exchange(
    engine: &DataEngine,
    config: &RunConfig,
    input: &ExchangeInput,
) -> Result<ExchangeSource> {
    let files = files_with_pattern(&config.data_dir, &input.pattern)?;
    if files.is_empty() {
        warn!(exchange = %input.name, pattern = %input.pattern, "no trade files found");
    }
    let delimiter = delimiter_byte(config.exchange_delimiter)?;
    let mut trades = Vec::new();
    for file in &files {
        trades.extend(
            engine
                .fetch_exchange_trades(&input.name, file, delimiter, input.layout.layout())
                .with_context(|| format!("reading trades of {}", input.name))?,
        );
    }
    Ok(ExchangeSource::new(input.name.clone(), trades))
}

fn aggregate(config: &RunConfig, output: &Path, per_file: bool) -> Result<()> {
    let data = DataEngine::new(config.time_mode);
    let engine = AggregationEngine::new(config.aggregation.clone())?;

    let tx_files = files_with_pattern(&config.data_dir, &config.blockchain_pattern)?;
    if tx_files.is_empty() {
        bail!(
            "no files matching '{}' in {}",
            config.blockchain_pattern,
            config.data_dir.display()
        );
    }
    let exchanges = config
        .exchanges
        .iter()
        .map(|input| load_exchange(&data, config, input))
        .collect::<Result<Vec<_>>>()?;

    let delimiter = delimiter_byte(config.blockchain_delimiter)?;
    let out_delimiter = delimiter_byte(config.output_delimiter)?;
    let batches: Vec<Vec<PathBuf>> = if per_file {
        tx_files.into_iter().map(|f| vec![f]).collect()
    } else {
        vec![tx_files]
    };

    File::create(output).with_context(|| format!("creating {}", output.display()))?;
    let mut header_written = false;
    let mut failed = Vec::new();
    for batch in &batches {
        let blockchain = data
            .fetch_blockchain_transactions(batch, delimiter)
            .context("reading blockchain transactions")?;
        let sources = EventSources::new(blockchain, exchanges.clone());
        let report = engine.run(&sources)?;
        failed.extend(report.failed_windows());

        if report.records.is_empty() {
            continue;
        }
        append_csv(&report.records, output, out_delimiter, !header_written)
            .with_context(|| format!("writing {}", output.display()))?;
        header_written = true;
    }

    if !failed.is_empty() {
        let list: Vec<String> = failed.iter().map(|w| w.to_string()).collect();
        bail!(
            "{} window(s) failed, output written without them: {}",
            failed.len(),
            list.join(", ")
        );
    }
    Ok(())
}

fn blocks(config: &RunConfig, output: &Path) -> Result<()> {
    let data = DataEngine::new(config.time_mode);
    let files = files_with_pattern(&config.data_dir, &config.block_pattern)?;
    let blocks = data
        .fetch_blocks(&files, delimiter_byte(config.blockchain_delimiter)?)
        .context("reading block files")?;
    let mined = with_mining_times(blocks);
    write_csv(&mined, output, delimiter_byte(config.output_delimiter)?)
        .with_context(|| format!("writing {}", output.display()))?;
    Ok(())
}

/// The named exchange, or the first configured one.
fn select_exchange<'a>(config: &'a RunConfig, exchange: Option<&str>) -> Result<&'a ExchangeInput> {
    match exchange {
        Some(name) => config
            .exchanges
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| anyhow!("exchange '{name}' is not configured")),
        None => config
            .exchanges
            .first()
            .ok_or_else(|| anyhow!("no exchanges configured")),
    }
}

fn interval_delta(interval: &str) -> Result<chrono::TimeDelta> {
    chrono::TimeDelta::try_milliseconds(parse_interval_ms(interval)?)
        .ok_or_else(|| anyhow!("interval out of range: {interval}"))
}

fn medians(
    config: &RunConfig,
    exchange: Option<&str>,
    interval: &str,
    round: bool,
    output: &Path,
) -> Result<()> {
    let input = select_exchange(config, exchange)?;
    let width = interval_delta(interval)?;

    let data = DataEngine::new(config.time_mode);
    let source = load_exchange(&data, config, input)?;
    let windows = match (source.events.first(), source.events.last()) {
        (Some(first), Some(last)) => covering(first.timestamp, last.timestamp, width),
        _ => Vec::new(),
    };

    let mut summaries = resample_medians(&source.events, &windows);
    if round {
        summaries = summaries.iter().map(|s| s.rounded()).collect();
    }
    info!(
        exchange = %input.name,
        windows = windows.len(),
        rows = summaries.len(),
        "medians resampled"
    );
    write_csv(&summaries, output, delimiter_byte(config.output_delimiter)?)
        .with_context(|| format!("writing {}", output.display()))?;
    Ok(())
}

/// Round to whole units and drop rows priced below one.
fn finalize_averages(rows: Vec<WindowAverages>) -> Vec<WindowAverages> {
    rows.iter()
        .map(WindowAverages::rounded)
        .filter(|row| row.avg_price.is_some_and(|p| p >= 1.0))
        .collect()
}

fn averages(
    config: &RunConfig,
    exchange: Option<&str>,
    interval: &str,
    output: &Path,
) -> Result<()> {
    let input = select_exchange(config, exchange)?;
    let width = interval_delta(interval)?;

    let data = DataEngine::new(config.time_mode);
    let tx_files = files_with_pattern(&config.data_dir, &config.blockchain_pattern)?;
    let blockchain = data
        .fetch_blockchain_transactions(&tx_files, delimiter_byte(config.blockchain_delimiter)?)
        .context("reading blockchain transactions")?;
    let source = load_exchange(&data, config, input)?;
    let sources = EventSources::new(blockchain, vec![source]);

    let windows = match sources.span(WindowBasis::Blockchain) {
        Some((first, last)) => covering(first, last, width),
        None => Vec::new(),
    };
    let rows = finalize_averages(resample_averages(
        &sources.blockchain,
        &sources.exchanges[0].events,
        &windows,
    ));
    info!(exchange = %input.name, windows = windows.len(), rows = rows.len(), "averages resampled");
    write_csv(&rows, output, delimiter_byte(config.output_delimiter)?)
        .with_context(|| format!("writing {}", output.display()))?;
    Ok(())
}

fn merge_timestamps(
    config: &RunConfig,
    name: &str,
    timestamps: &Path,
    data_path: &Path,
    output: &Path,
) -> Result<()> {
    let data = DataEngine::new(config.time_mode);
    let trades = data
        .fetch_exchange_trades_split(name, timestamps, data_path)
        .context("merging timestamp and data files")?;

    // headerless, so the result reads back with the `merged` layout
    File::create(output).with_context(|| format!("creating {}", output.display()))?;
    append_csv(&trades, output, delimiter_byte(config.exchange_delimiter)?, false)
        .with_context(|| format!("writing {}", output.display()))?;
    Ok(())
}
