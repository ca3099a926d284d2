use std::fs;
use std::path::{Path, PathBuf};

use aggregation_engine::AggregationConfig;
use anyhow::{bail, Context, Result};
use data_engine::{ExchangeFileLayout, TimeMode};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutName {
    #[default]
    Trades,
    History,
    Merged,
}

impl LayoutName {
    pub fn layout(self) -> ExchangeFileLayout {
        match self {
            LayoutName::Trades => ExchangeFileLayout::TRADES,
            LayoutName::History => ExchangeFileLayout::HISTORY,
            LayoutName::Merged => ExchangeFileLayout::MERGED,
        }
    }
}

/// One exchange to aggregate: its column-prefix name and the files holding its trades.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeInput {
    pub name: String,
    /// Matched case-insensitively against file names in the data directory.
    pub pattern: String,
    #[serde(default)]
    pub layout: LayoutName,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub aggregation: AggregationConfig,
    pub data_dir: PathBuf,
    pub blockchain_pattern: String,
    pub block_pattern: String,
    pub blockchain_delimiter: char,
    pub exchange_delimiter: char,
    pub output_delimiter: char,
    pub exchanges: Vec<ExchangeInput>,
    pub time_mode: TimeMode,
    pub log_level: String,
    pub log_json: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            aggregation: AggregationConfig::default(),
            data_dir: PathBuf::from("."),
            blockchain_pattern: "transactions".to_string(),
            block_pattern: "blocks".to_string(),
            blockchain_delimiter: ';',
            exchange_delimiter: ',',
            output_delimiter: ';',
            exchanges: vec![ExchangeInput {
                name: "Coinbase".to_string(),
                pattern: "coinbase".to_string(),
                layout: LayoutName::Trades,
            }],
            time_mode: TimeMode::Utc,
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}

impl RunConfig {
    /// Defaults, then the JSON file if given, then `AGG_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                serde_json::from_str(&raw)
                    .with_context(|| format!("parsing config {}", path.display()))?
            }
            None => RunConfig::default(),
        };
        config.aggregation = config
            .aggregation
            .with_env_overrides()
            .context("applying environment overrides")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.aggregation.validate()?;
        for (name, c) in [
            ("blockchain_delimiter", self.blockchain_delimiter),
            ("exchange_delimiter", self.exchange_delimiter),
            ("output_delimiter", self.output_delimiter),
        ] {
            delimiter_byte(c).with_context(|| format!("invalid {name}"))?;
        }
        let mut names: Vec<String> = self.exchanges.iter().map(|e| e.name.to_uppercase()).collect();
        names.sort();
        names.dedup();
        if names.len() != self.exchanges.len() {
            bail!("exchange names must be unique ignoring case");
        }
        Ok(())
    }
}

/// CSV delimiters must be a single ASCII character.
pub fn delimiter_byte(c: char) -> Result<u8> {
    if !c.is_ascii() {
        bail!("delimiter must be ASCII, got {c:?}");
    }
    Ok(c as u8)
}
