// Copyright (C) 2025 Category Labs, Inc.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

use std::{fmt::Write as _, path::Path};

use chrono::{DateTime, Utc};
use futures::{stream, StreamExt};

use crate::prelude::*;

#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    pub start_block: Option<u64>,
    pub end_block: Option<u64>,
    /// Analyze the last N blocks instead of an explicit range
    pub block_range: Option<u64>,
    pub concurrency: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            start_block: None,
            end_block: None,
            block_range: Some(100),
            concurrency: 50,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BlockStats {
    pub number: u64,
    pub timestamp: DateTime<Utc>,
    pub tx_count: usize,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub utilization: f64,
    /// Time since the previous block; None for the first of the range
    pub block_time: Option<Duration>,
}

#[derive(Debug, Clone, Default)]
pub struct AnalysisResult {
    pub start_block: u64,
    pub end_block: u64,
    pub blocks: Vec<BlockStats>,
    pub total_txs: u64,
    pub total_duration: Duration,
    pub average_tps: f64,
    pub avg_block_time: Duration,
    pub avg_gas_used: f64,
    pub avg_tx_per_block: f64,
    pub min_tx_per_block: usize,
    pub max_tx_per_block: usize,
}

/// Offline statistics over a block range. Pure observer; nothing is
/// submitted.
pub struct BlockAnalyzer {
    client: Arc<dyn EthRpc>,
    config: AnalyzerConfig,
}

impl BlockAnalyzer {
    pub fn new(client: Arc<dyn EthRpc>, config: AnalyzerConfig) -> Self {
        Self { client, config }
    }

    pub async fn analyze(&self) -> Result<AnalysisResult> {
        let (start, end) = self.resolve_range().await?;
        info!(start, end, blocks = end - start + 1, "Analyzing block range");

        let mut blocks: Vec<BlockStats> = stream::iter(start..=end)
            .map(|number| {
                let client = Arc::clone(&self.client);
                async move {
                    let block = client
                        .block_by_number(number)
                        .await?
                        .with_context(|| format!("block {number} not found"))?;
                    let utilization = if block.gas_limit > 0 {
                        block.gas_used as f64 / block.gas_limit as f64 * 100.0
                    } else {
                        0.0
                    };
                    Ok::<_, eyre::Report>(BlockStats {
                        number: block.number,
                        timestamp: DateTime::from_timestamp(block.timestamp as i64, 0)
                            .unwrap_or_default(),
                        tx_count: block.transactions.len(),
                        gas_limit: block.gas_limit,
                        gas_used: block.gas_used,
                        utilization,
                        block_time: None,
                    })
                }
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect::<Vec<Result<BlockStats>>>()
            .await
            .into_iter()
            .collect::<Result<_>>()?;

        blocks.sort_by_key(|b| b.number);
        for i in 1..blocks.len() {
            let delta = (blocks[i].timestamp - blocks[i - 1].timestamp)
                .to_std()
                .unwrap_or_default();
            blocks[i].block_time = Some(delta);
        }

        Ok(calculate_metrics(blocks))
    }

    async fn resolve_range(&self) -> Result<(u64, u64)> {
        let end = if self.config.block_range.is_some() || self.config.end_block.is_none() {
            self.client
                .block_number()
                .await
                .wrap_err("Failed to get latest block")?
        } else {
            self.config.end_block.unwrap()
        };

        let start = if let Some(range) = self.config.block_range {
            end.saturating_sub(range.saturating_sub(1)).max(1)
        } else {
            self.config.start_block.unwrap_or(1)
        };

        if start > end {
            bail!("resolved block range is empty: {start} > {end}");
        }
        Ok((start, end))
    }
}

fn calculate_metrics(blocks: Vec<BlockStats>) -> AnalysisResult {
    let Some(first) = blocks.first() else {
        return AnalysisResult::default();
    };
    let last = blocks.last().unwrap();

    let mut result = AnalysisResult {
        start_block: first.number,
        end_block: last.number,
        min_tx_per_block: first.tx_count,
        max_tx_per_block: first.tx_count,
        ..Default::default()
    };

    let mut total_gas_used = 0u64;
    let mut total_block_time = Duration::ZERO;
    for block in &blocks {
        result.total_txs += block.tx_count as u64;
        total_gas_used += block.gas_used;
        result.min_tx_per_block = result.min_tx_per_block.min(block.tx_count);
        result.max_tx_per_block = result.max_tx_per_block.max(block.tx_count);
        total_block_time += block.block_time.unwrap_or_default();
    }

    let count = blocks.len();
    result.avg_tx_per_block = result.total_txs as f64 / count as f64;
    result.avg_gas_used = total_gas_used as f64 / count as f64;

    if count > 1 {
        result.avg_block_time = total_block_time / (count - 1) as u32;
        result.total_duration = (last.timestamp - first.timestamp).to_std().unwrap_or_default();
        if result.total_duration.as_secs_f64() > 0.0 {
            result.average_tps = result.total_txs as f64 / result.total_duration.as_secs_f64();
        }
    }

    result.blocks = blocks;
    result
}

/// Aligned text table over the analyzed blocks, footer included.
pub fn render_table(result: &AnalysisResult) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:>10} {:>10} {:>8} {:>12} {:>12} {:>12} {:>10}",
        "Block", "Time", "TxCount", "GasUsed", "GasLimit", "Utilization", "BlockTime"
    );
    for block in &result.blocks {
        let block_time = block
            .block_time
            .map(|d| format!("{:.2}s", d.as_secs_f64()))
            .unwrap_or_else(|| "-".to_string());
        let _ = writeln!(
            out,
            "{:>10} {:>10} {:>8} {:>12} {:>12} {:>11.2}% {:>10}",
            block.number,
            block.timestamp.format("%H:%M:%S"),
            block.tx_count,
            block.gas_used,
            block.gas_limit,
            block.utilization,
            block_time,
        );
    }
    let _ = writeln!(
        out,
        "{:>10} {:>9.2}s {:>8} {:>12} {:>12} {:>12} {:>9.2}s",
        "TOTAL",
        result.total_duration.as_secs_f64(),
        result.total_txs,
        format!("tps {:.2}", result.average_tps),
        "-",
        "-",
        result.avg_block_time.as_secs_f64(),
    );
    out
}

/// Writes the per-block rows as CSV.
pub fn export_csv(result: &AnalysisResult, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let mut writer = csv::Writer::from_path(path)
        .wrap_err_with(|| format!("Failed to create {}", path.display()))?;

    writer.write_record([
        "Block",
        "Timestamp",
        "TxCount",
        "GasUsed",
        "GasLimit",
        "Utilization",
        "BlockTime",
    ])?;
    for block in &result.blocks {
        writer.write_record([
            block.number.to_string(),
            block.timestamp.to_rfc3339(),
            block.tx_count.to_string(),
            block.gas_used.to_string(),
            block.gas_limit.to_string(),
            format!("{:.4}", block.utilization),
            format!(
                "{:.3}",
                block.block_time.unwrap_or_default().as_secs_f64()
            ),
        ])?;
    }
    writer.flush()?;
    Ok(())
}
