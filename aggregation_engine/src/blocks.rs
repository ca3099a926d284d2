use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::record::Timestamped;

/// One mined block as listed in the block files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockchainBlock {
    pub timestamp: NaiveDateTime,
    pub height: u64,
    pub version: i64,
    pub nbits: f64,
    pub total_size: u64,
    pub tx_count: u32,
    pub fee: i64,
    pub input_count: u32,
    pub input_value: i64,
    pub output_count: u32,
    pub output_value: i64,
    pub miner: String,
    pub miner_revenue: f64,
}

impl BlockchainBlock {
    /// Share of the miner revenue paid as fees; `None` without revenue.
    pub fn fee_share_on_revenue(&self) -> Option<f64> {
        (self.miner_revenue > 0.0).then(|| self.fee as f64 / self.miner_revenue)
    }
}

impl Timestamped for BlockchainBlock {
    fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MinedBlock {
    pub block: BlockchainBlock,
    /// Minutes since the previous block by height; `None` for the first.
    pub mining_time_minutes: Option<f64>,
}

/// Order blocks by height and attach the time each one took to mine.
pub fn with_mining_times(mut blocks: Vec<BlockchainBlock>) -> Vec<MinedBlock> {
    blocks.sort_by_key(|b| b.height);

    let mut previous: Option<NaiveDateTime> = None;
    blocks
        .into_iter()
        .map(|block| {
            let mining_time_minutes = previous
                .map(|prev| (block.timestamp - prev).num_milliseconds() as f64 / 60_000.0);
            previous = Some(block.timestamp);
            MinedBlock {
                block,
                mining_time_minutes,
            }
        })
        .collect()
}
