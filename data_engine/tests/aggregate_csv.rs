use std::fs;

use aggregation_engine::{
    AggregationConfig, AggregationEngine, EventSources, ExchangeSource, WindowBasis,
};
use data_engine::{
    append_csv, files_with_pattern, write_csv, DataEngine, ExchangeFileLayout, TimeMode,
};

const TX_HEADER: &str = "Timestamp;Height;Size;Coinbase;LockTime;Fee;InCount;InValue;OutCount;OutValue;Change\n";

fn write_inputs(dir: &std::path::Path) {
    // 2018-01-01 00:00:00 UTC
    fs::write(
        dir.join("transactions_a.csv"),
        format!(
            "{TX_HEADER}\
             1514764800;500000;226;False;0;50000;1;200050000;2;200000000;150000000\n\
             1514765100;500000;250;True;0;0;1;0;1;1250000000;-1\n\
             1514766600;500001;300;False;0;100000;2;300100000;1;300000000;-1\n\
             1514768340;500002;226;False;0;20000;1;100020000;1;100000000;-1\n"
        ),
    )
    .unwrap();
    fs::write(
        dir.join("coinbase.csv"),
        "1514764860,10000,1.0,0,0,0,0,0\n\
         1514766660,12500,2.0,0,0,0,0,0\n\
         1514768000,nan,1.0,0,0,0,0,0\n",
    )
    .unwrap();
    fs::write(
        dir.join("kraken.csv"),
        "1514764900,13100,0.5,0,0,0,0,0\n",
    )
    .unwrap();
}

fn load(dir: &std::path::Path) -> EventSources {
    let engine = DataEngine::new(TimeMode::Utc);
    let tx_files = files_with_pattern(dir, "transactions").unwrap();
    let blockchain = engine.fetch_blockchain_transactions(&tx_files, b';').unwrap();
    let exchanges = ["Coinbase", "Kraken"]
        .iter()
        .map(|name| {
            let path = dir.join(format!("{}.csv", name.to_lowercase()));
            let trades = engine
                .fetch_exchange_trades(name, &path, b',', ExchangeFileLayout::TRADES)
                .unwrap();
            ExchangeSource::new(*name, trades)
        })
        .collect();
    EventSources::new(blockchain, exchanges)
}

fn config() -> AggregationConfig {
    AggregationConfig {
        interval_width_ms: 30 * 60 * 1000,
        max_parallelism: 4,
        window_basis: WindowBasis::Blockchain,
    }
}

#[test]
fn files_in_aggregated_csv_out() {
    let dir = tempfile::tempdir().unwrap();
    write_inputs(dir.path());

    let sources = load(dir.path());
    let report = AggregationEngine::new(config()).unwrap().run(&sources).unwrap();
    assert!(report.is_success());
    // 00:00 to 00:59 spans two half-hour windows
    assert_eq!(report.records.len(), 2);

    let out = dir.path().join("aggregated.csv");
    write_csv(&report.records, &out, b';').unwrap();

    let mut rdr = csv::ReaderBuilder::new().delimiter(b';').from_path(&out).unwrap();
    let headers = rdr.headers().unwrap().clone();
    let rows: Vec<csv::StringRecord> = rdr.records().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), 2);

    let col = |name: &str| headers.iter().position(|h| h == name).unwrap();
    assert_eq!(&rows[0][col("StartTime")], "2018-01-01 00:00:00");
    assert_eq!(&rows[0][col("NumberOfTransactions")], "2");
    assert_eq!(&rows[0][col("NumberOfBlocks")], "1");
    assert_eq!(&rows[0][col("COINBASE_PriceOpen")], "10000");
    assert_eq!(&rows[0][col("KRAKEN_PriceClose")], "13100");
    assert_eq!(&rows[0][col("SumCumulatedExchangeAmount")], "1.5");

    assert_eq!(&rows[1][col("StartTime")], "2018-01-01 00:30:00");
    assert_eq!(&rows[1][col("COINBASE_Return")], "0.25");
    // Kraken had no trades in the second window
    assert_eq!(&rows[1][col("KRAKEN_PriceClose")], "-1");
    assert_eq!(&rows[1][col("KRAKEN_Return")], "");
    assert_eq!(&rows[1][col("ClosePriceRatio")], "");
}

#[test]
fn appended_runs_share_one_header() {
    let dir = tempfile::tempdir().unwrap();
    write_inputs(dir.path());

    let sources = load(dir.path());
    let engine = AggregationEngine::new(config()).unwrap();
    let report = engine.run(&sources).unwrap();

    let out = dir.path().join("per_file.csv");
    append_csv(&report.records, &out, b';', true).unwrap();
    append_csv(&report.records, &out, b';', false).unwrap();

    let text = fs::read_to_string(&out).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 1 + 2 * report.records.len());
    assert!(lines[0].starts_with("StartTime;EndTime;"));
    assert_eq!(lines.iter().filter(|l| l.starts_with("StartTime")).count(), 1);
}
