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

use std::{
    collections::HashMap,
    path::PathBuf,
};

use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::Serialize;

use crate::{
    collector::{BlockObservation, TxRecord},
    prelude::*,
};

/// Order statistic over a sorted latency array: the element at index
/// `⌊(n − 1) · p / 100⌋`.
pub fn percentile(sorted: &[Duration], p: usize) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    sorted[(sorted.len() - 1) * p / 100]
}

pub const HISTOGRAM_LABELS: [&str; 6] =
    ["<100ms", "100-500ms", "500ms-1s", "1-2s", "2-5s", ">5s"];

const HISTOGRAM_BOUNDS: [Duration; 5] = [
    Duration::from_millis(100),
    Duration::from_millis(500),
    Duration::from_secs(1),
    Duration::from_secs(2),
    Duration::from_secs(5),
];

/// Six fixed buckets with strict less-than boundaries; every latency falls
/// into exactly one.
#[derive(Debug, Clone, Default)]
pub struct LatencyHistogram {
    counts: [usize; 6],
}

impl LatencyHistogram {
    pub fn record(&mut self, latency: Duration) {
        let index = HISTOGRAM_BOUNDS
            .iter()
            .position(|&bound| latency < bound)
            .unwrap_or(HISTOGRAM_BOUNDS.len());
        self.counts[index] += 1;
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, usize)> + '_ {
        HISTOGRAM_LABELS.iter().copied().zip(self.counts)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReportMetrics {
    pub total_sent: usize,
    pub total_confirmed: usize,
    pub total_failed: usize,
    pub total_pending: usize,
    pub total_timeout: usize,

    pub tps: f64,
    pub confirmed_tps: f64,

    pub avg_latency: Duration,
    pub min_latency: Duration,
    pub max_latency: Duration,
    pub p50_latency: Duration,
    pub p95_latency: Duration,
    pub p99_latency: Duration,

    pub total_gas_used: u64,
    pub avg_gas_used: u64,
    pub total_gas_cost: U256,
    pub avg_gas_cost: U256,

    pub blocks_observed: usize,
    pub avg_block_time: Duration,
    pub avg_tx_per_block: f64,
    pub avg_utilization: f64,

    pub first_block_with_tx: u64,
    pub last_block_with_tx: u64,
    pub block_span: usize,
    pub blocks_with_our_tx: usize,
    pub block_based_tps: f64,

    pub success_rate: f64,
}

/// Final collection report.
#[derive(Debug, Clone)]
pub struct Report {
    pub test_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration: Duration,
    pub metrics: ReportMetrics,
    pub transactions: Vec<TxRecord>,
    pub blocks: Vec<BlockObservation>,
    pub latency_histogram: LatencyHistogram,
    pub error_summary: HashMap<String, usize>,
}

impl Report {
    /// Logs the human-readable summary the way the stage banners do.
    pub fn log_summary(&self) {
        let m = &self.metrics;
        info!(
            total_sent = m.total_sent,
            confirmed = m.total_confirmed,
            failed = m.total_failed,
            timeout = m.total_timeout,
            success_rate = %format!("{:.2}%", m.success_rate),
            "Transactions"
        );
        info!(
            duration = %humantime::format_duration(self.duration),
            tps_sent = %format!("{:.2}", m.tps),
            tps_confirmed = %format!("{:.2}", m.confirmed_tps),
            "Timing"
        );
        if m.total_confirmed > 0 {
            info!(
                avg = ?m.avg_latency,
                min = ?m.min_latency,
                max = ?m.max_latency,
                p50 = ?m.p50_latency,
                p95 = ?m.p95_latency,
                p99 = ?m.p99_latency,
                "Latency"
            );
            info!(
                total_gas_used = m.total_gas_used,
                avg_gas_used = m.avg_gas_used,
                total_gas_cost = %m.total_gas_cost,
                "Gas"
            );
        }
        if m.blocks_observed > 0 {
            info!(
                observed = m.blocks_observed,
                avg_block_time = ?m.avg_block_time,
                avg_tx_per_block = %format!("{:.2}", m.avg_tx_per_block),
                avg_utilization = %format!("{:.2}%", m.avg_utilization),
                block_based_tps = %format!("{:.2}", m.block_based_tps),
                "Blocks"
            );
        }
        for (message, count) in self
            .error_summary
            .iter()
            .sorted_by(|a, b| b.1.cmp(a.1))
            .take(10)
        {
            let message: String = message.chars().take(80).collect();
            warn!(count = *count, "Error: {message}");
        }
    }
}

#[derive(Serialize)]
struct JsonReport {
    test_name: String,
    start_time: String,
    end_time: String,
    duration: String,
    summary: JsonSummary,
    latency: JsonLatency,
    gas: JsonGas,
    blocks: JsonBlocks,
    errors: HashMap<String, usize>,
}

#[derive(Serialize)]
struct JsonSummary {
    total_sent: usize,
    total_confirmed: usize,
    total_failed: usize,
    total_timeout: usize,
    total_pending: usize,
    success_rate: f64,
    tps: f64,
    confirmed_tps: f64,
}

#[derive(Serialize)]
struct JsonLatency {
    average: String,
    min: String,
    max: String,
    p50: String,
    p95: String,
    p99: String,
    histogram: HashMap<String, usize>,
}

#[derive(Serialize)]
struct JsonGas {
    total_used: u64,
    average_used: u64,
    total_cost: String,
    average_cost: String,
}

#[derive(Serialize)]
struct JsonBlocks {
    observed: usize,
    avg_block_time: String,
    avg_tx_per_block: f64,
    avg_utilization: f64,
    first_block_with_tx: u64,
    last_block_with_tx: u64,
    block_span: usize,
    blocks_with_our_tx: usize,
    block_based_tps: f64,
}

fn human(duration: Duration) -> String {
    humantime::format_duration(duration).to_string()
}

/// Writes reports into a timestamped set of files under the output
/// directory.
pub struct Exporter {
    output_dir: PathBuf,
}

impl Exporter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn export_all(&self, report: &Report) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(&self.output_dir)
            .wrap_err_with(|| format!("Failed to create {}", self.output_dir.display()))?;
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();

        let mut files = vec![
            self.export_json(report, &timestamp)?,
            self.export_summary_csv(report, &timestamp)?,
            self.export_transactions_csv(report, &timestamp)?,
        ];
        if !report.blocks.is_empty() {
            files.push(self.export_blocks_csv(report, &timestamp)?);
        }
        Ok(files)
    }

    fn path(&self, name: &str, timestamp: &str, ext: &str) -> PathBuf {
        self.output_dir.join(format!("{name}_{timestamp}.{ext}"))
    }

    fn export_json(&self, report: &Report, timestamp: &str) -> Result<PathBuf> {
        let m = &report.metrics;
        let json = JsonReport {
            test_name: report.test_name.clone(),
            start_time: report.start_time.to_rfc3339(),
            end_time: report.end_time.to_rfc3339(),
            duration: human(report.duration),
            summary: JsonSummary {
                total_sent: m.total_sent,
                total_confirmed: m.total_confirmed,
                total_failed: m.total_failed,
                total_timeout: m.total_timeout,
                total_pending: m.total_pending,
                success_rate: m.success_rate,
                tps: m.tps,
                confirmed_tps: m.confirmed_tps,
            },
            latency: JsonLatency {
                average: human(m.avg_latency),
                min: human(m.min_latency),
                max: human(m.max_latency),
                p50: human(m.p50_latency),
                p95: human(m.p95_latency),
                p99: human(m.p99_latency),
                histogram: report
                    .latency_histogram
                    .iter()
                    .map(|(label, count)| (label.to_string(), count))
                    .collect(),
            },
            gas: JsonGas {
                total_used: m.total_gas_used,
                average_used: m.avg_gas_used,
                total_cost: m.total_gas_cost.to_string(),
                average_cost: m.avg_gas_cost.to_string(),
            },
            blocks: JsonBlocks {
                observed: m.blocks_observed,
                avg_block_time: human(m.avg_block_time),
                avg_tx_per_block: m.avg_tx_per_block,
                avg_utilization: m.avg_utilization,
                first_block_with_tx: m.first_block_with_tx,
                last_block_with_tx: m.last_block_with_tx,
                block_span: m.block_span,
                blocks_with_our_tx: m.blocks_with_our_tx,
                block_based_tps: m.block_based_tps,
            },
            errors: report.error_summary.clone(),
        };

        let path = self.path("report", timestamp, "json");
        let data = serde_json::to_vec_pretty(&json).wrap_err("Failed to serialize report")?;
        std::fs::write(&path, data)
            .wrap_err_with(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }

    fn export_summary_csv(&self, report: &Report, timestamp: &str) -> Result<PathBuf> {
        let path = self.path("summary", timestamp, "csv");
        let mut writer = csv::Writer::from_path(&path)
            .wrap_err_with(|| format!("Failed to create {}", path.display()))?;

        let m = &report.metrics;
        let rows: Vec<(&str, String)> = vec![
            ("Metric", "Value".to_string()),
            ("Test Name", report.test_name.clone()),
            ("Start Time", report.start_time.to_rfc3339()),
            ("End Time", report.end_time.to_rfc3339()),
            ("Duration", human(report.duration)),
            ("Total Sent", m.total_sent.to_string()),
            ("Total Confirmed", m.total_confirmed.to_string()),
            ("Total Failed", m.total_failed.to_string()),
            ("Total Timeout", m.total_timeout.to_string()),
            ("Success Rate", format!("{:.2}%", m.success_rate)),
            ("TPS (Sent)", format!("{:.2}", m.tps)),
            ("TPS (Confirmed)", format!("{:.2}", m.confirmed_tps)),
            ("Block-Based TPS", format!("{:.2}", m.block_based_tps)),
            ("First Block", m.first_block_with_tx.to_string()),
            ("Last Block", m.last_block_with_tx.to_string()),
            ("Block Span", m.block_span.to_string()),
            ("Blocks w/ Our Tx", m.blocks_with_our_tx.to_string()),
            ("Avg Latency", human(m.avg_latency)),
            ("Min Latency", human(m.min_latency)),
            ("Max Latency", human(m.max_latency)),
            ("P50 Latency", human(m.p50_latency)),
            ("P95 Latency", human(m.p95_latency)),
            ("P99 Latency", human(m.p99_latency)),
            ("Total Gas Used", m.total_gas_used.to_string()),
            ("Avg Gas Used", m.avg_gas_used.to_string()),
        ];
        for (metric, value) in rows {
            writer.write_record([metric, value.as_str()])?;
        }
        writer.flush()?;
        Ok(path)
    }

    fn export_transactions_csv(&self, report: &Report, timestamp: &str) -> Result<PathBuf> {
        let path = self.path("transactions", timestamp, "csv");
        let mut writer = csv::Writer::from_path(&path)
            .wrap_err_with(|| format!("Failed to create {}", path.display()))?;

        writer.write_record([
            "Hash",
            "From",
            "Nonce",
            "GasLimit",
            "SentAt",
            "ConfirmedAt",
            "Status",
            "Latency",
            "GasUsed",
            "Error",
        ])?;
        for tx in &report.transactions {
            writer.write_record([
                tx.hash.to_string(),
                tx.from.to_string(),
                tx.nonce.to_string(),
                tx.gas_limit.to_string(),
                tx.sent_at.to_rfc3339(),
                tx.confirmed_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
                tx.status.to_string(),
                tx.latency.map(human).unwrap_or_default(),
                tx.receipt
                    .as_ref()
                    .map(|r| r.gas_used.to_string())
                    .unwrap_or_default(),
                tx.error.clone().unwrap_or_default(),
            ])?;
        }
        writer.flush()?;
        Ok(path)
    }

    fn export_blocks_csv(&self, report: &Report, timestamp: &str) -> Result<PathBuf> {
        let path = self.path("blocks", timestamp, "csv");
        let mut writer = csv::Writer::from_path(&path)
            .wrap_err_with(|| format!("Failed to create {}", path.display()))?;

        writer.write_record([
            "Number",
            "Hash",
            "Timestamp",
            "GasLimit",
            "GasUsed",
            "TxCount",
            "OurTxCount",
            "Utilization",
        ])?;
        for block in &report.blocks {
            writer.write_record([
                block.number.to_string(),
                block.hash.to_string(),
                block.timestamp.to_rfc3339(),
                block.gas_limit.to_string(),
                block.gas_used.to_string(),
                block.tx_count.to_string(),
                block.our_tx_count.to_string(),
                format!("{:.2}%", block.utilization),
            ])?;
        }
        writer.flush()?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::TxStatus;

    #[test]
    fn percentile_law_holds() {
        let mut latencies: Vec<Duration> =
            (1..=100).map(|ms| Duration::from_millis(ms * 7 % 113)).collect();
        latencies.sort_unstable();

        let p50 = percentile(&latencies, 50);
        let p95 = percentile(&latencies, 95);
        let p99 = percentile(&latencies, 99);
        let max = *latencies.last().unwrap();

        assert!(p50 <= p95);
        assert!(p95 <= p99);
        assert!(p99 <= max);

        let n = latencies.len();
        assert_eq!(p50, latencies[(n - 1) * 50 / 100]);
        assert_eq!(p95, latencies[(n - 1) * 95 / 100]);
        assert_eq!(p99, latencies[(n - 1) * 99 / 100]);
    }

    #[test]
    fn percentile_of_empty_and_single() {
        assert_eq!(percentile(&[], 95), Duration::ZERO);
        let one = [Duration::from_millis(42)];
        assert_eq!(percentile(&one, 50), one[0]);
        assert_eq!(percentile(&one, 99), one[0]);
    }

    #[test]
    fn histogram_partitions_every_latency() {
        let samples = [
            Duration::from_millis(99),
            Duration::from_millis(100),
            Duration::from_millis(499),
            Duration::from_millis(500),
            Duration::from_millis(999),
            Duration::from_secs(1),
            Duration::from_millis(1999),
            Duration::from_secs(3),
            Duration::from_secs(5),
            Duration::from_secs(60),
        ];
        let mut histogram = LatencyHistogram::default();
        for s in samples {
            histogram.record(s);
        }

        assert_eq!(histogram.total(), samples.len());
        let counts: HashMap<&str, usize> = histogram.iter().collect();
        // strict less-than boundaries: 100ms lands in the second bucket,
        // 5s in the last
        assert_eq!(counts["<100ms"], 1);
        assert_eq!(counts["100-500ms"], 2);
        assert_eq!(counts["500ms-1s"], 2);
        assert_eq!(counts["1-2s"], 2);
        assert_eq!(counts["2-5s"], 1);
        assert_eq!(counts[">5s"], 2);
    }

    fn sample_report() -> Report {
        let mut histogram = LatencyHistogram::default();
        histogram.record(Duration::from_millis(80));

        Report {
            test_name: "unit".to_string(),
            start_time: Utc::now(),
            end_time: Utc::now(),
            duration: Duration::from_secs(2),
            metrics: ReportMetrics {
                total_sent: 1,
                total_confirmed: 1,
                success_rate: 100.0,
                ..Default::default()
            },
            transactions: vec![TxRecord {
                hash: B256::repeat_byte(0x01),
                from: Address::repeat_byte(0xaa),
                nonce: 0,
                gas_limit: 21_000,
                sent_at: Utc::now(),
                sent_instant: Instant::now(),
                confirmed_at: Some(Utc::now()),
                status: TxStatus::Success,
                receipt: None,
                latency: Some(Duration::from_millis(80)),
                error: None,
            }],
            blocks: Vec::new(),
            latency_histogram: histogram,
            error_summary: HashMap::new(),
        }
    }

    #[test]
    fn exporter_writes_json_and_csv() {
        let dir = std::env::temp_dir().join(format!(
            "stablenet-txgen-report-test-{}",
            std::process::id()
        ));
        let exporter = Exporter::new(&dir);

        let files = exporter.export_all(&sample_report()).unwrap();
        // no blocks in the sample, so three files
        assert_eq!(files.len(), 3);

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&files[0]).unwrap()).unwrap();
        assert_eq!(json["test_name"], "unit");
        assert_eq!(json["summary"]["total_sent"], 1);
        assert!(json["latency"]["histogram"].is_object());

        let summary = std::fs::read_to_string(&files[1]).unwrap();
        assert!(summary.starts_with("Metric,Value"));

        let transactions = std::fs::read_to_string(&files[2]).unwrap();
        assert!(transactions.contains("SUCCESS"));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
