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

use std::{collections::HashMap, sync::Mutex};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::{stream, StreamExt};
use tokio::time::MissedTickBehavior;

use crate::{
    client::ReceiptView,
    metrics::MetricsSink,
    prelude::*,
    report::{percentile, LatencyHistogram, Report, ReportMetrics},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    Pending,
    Success,
    Failed,
    Timeout,
}

impl std::fmt::Display for TxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            TxStatus::Pending => "PENDING",
            TxStatus::Success => "SUCCESS",
            TxStatus::Failed => "FAILED",
            TxStatus::Timeout => "TIMEOUT",
        })
    }
}

/// Tracked state of one submitted transaction. Terminal states (Success,
/// Failed, Timeout) never transition again.
#[derive(Debug, Clone)]
pub struct TxRecord {
    pub hash: B256,
    pub from: Address,
    pub nonce: u64,
    pub gas_limit: u64,
    pub sent_at: DateTime<Utc>,
    pub sent_instant: Instant,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub status: TxStatus,
    pub receipt: Option<ReceiptView>,
    pub latency: Option<Duration>,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BlockObservation {
    pub number: u64,
    pub hash: B256,
    pub timestamp: DateTime<Utc>,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub tx_count: usize,
    pub our_tx_count: usize,
    /// gas_used / gas_limit in percent
    pub utilization: f64,
}

#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub poll_interval: Duration,
    pub confirm_timeout: Duration,
    /// Concurrent receipt queries per poll round
    pub max_concurrent: usize,
    /// Pending records snapshotted per poll round
    pub batch_size: usize,
    pub block_tracking: bool,
    pub block_poll_interval: Duration,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            confirm_timeout: Duration::from_secs(60),
            max_concurrent: 20,
            batch_size: 100,
            block_tracking: true,
            block_poll_interval: Duration::from_secs(1),
        }
    }
}

/// Polls receipts, tracks block observations, and folds both into the
/// final report.
pub struct Collector {
    client: Arc<dyn EthRpc>,
    config: CollectorConfig,
    records: DashMap<B256, TxRecord>,
    blocks: Mutex<Vec<BlockObservation>>,
    confirmed: AtomicU64,
    failed: AtomicU64,
    pending: AtomicU64,
    metrics: Arc<MetricsSink>,
}

impl Collector {
    pub fn new(
        client: Arc<dyn EthRpc>,
        config: CollectorConfig,
        metrics: Arc<MetricsSink>,
    ) -> Self {
        Self {
            client,
            config,
            records: DashMap::new(),
            blocks: Mutex::new(Vec::new()),
            confirmed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            pending: AtomicU64::new(0),
            metrics,
        }
    }

    /// Registers a transaction for receipt tracking.
    pub fn track(&self, hash: B256, from: Address, nonce: u64, gas_limit: u64) {
        self.records.insert(
            hash,
            TxRecord {
                hash,
                from,
                nonce,
                gas_limit,
                sent_at: Utc::now(),
                sent_instant: Instant::now(),
                confirmed_at: None,
                status: TxStatus::Pending,
                receipt: None,
                latency: None,
                error: None,
            },
        );
        let pending = self.pending.fetch_add(1, Ordering::SeqCst) + 1;
        self.metrics.set_pending(pending);
    }

    /// Marks a tracked transaction as failed at dispatch time (the node
    /// rejected it); its receipt will never arrive.
    pub fn mark_send_failed(&self, hash: B256, error: &str) {
        if let Some(mut record) = self.records.get_mut(&hash) {
            if record.status != TxStatus::Pending {
                return;
            }
            record.status = TxStatus::Failed;
            record.error = Some(error.to_string());
            self.failed.fetch_add(1, Ordering::SeqCst);
            let pending = self.pending.fetch_sub(1, Ordering::SeqCst) - 1;
            self.metrics.set_pending(pending);
            self.metrics.record_failed();
        }
    }

    pub fn pending_count(&self) -> u64 {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn confirmed_count(&self) -> u64 {
        self.confirmed.load(Ordering::SeqCst)
    }

    pub fn failed_count(&self) -> u64 {
        self.failed.load(Ordering::SeqCst)
    }

    /// Runs the receipt loop (and block loop when enabled) until every
    /// record is terminal or the confirm timeout passes, then builds the
    /// report. Remaining Pending records become Timeout. A cancellation
    /// signal aborts the loop with an error so the stage is recorded as
    /// failed.
    pub async fn collect(self: &Arc<Self>, shutdown: &Arc<AtomicBool>) -> Result<Report> {
        let total = self.records.len();
        let start_wall = Utc::now();
        let start = Instant::now();

        if total == 0 {
            return Ok(self.build_report(start_wall, start));
        }

        info!(
            total,
            poll_interval = ?self.config.poll_interval,
            confirm_timeout = ?self.config.confirm_timeout,
            "Starting receipt collection"
        );

        let block_shutdown = Arc::new(AtomicBool::new(false));
        let block_task = if self.config.block_tracking {
            let collector = Arc::clone(self);
            let block_shutdown = Arc::clone(&block_shutdown);
            Some(tokio::spawn(async move {
                collector.block_loop(block_shutdown).await;
            }))
        } else {
            None
        };

        let deadline = start + self.config.confirm_timeout;
        let outcome = loop {
            if shutdown.load(Ordering::Relaxed) {
                break Err(TxGenError::Transport("collection cancelled".into()));
            }
            if self.pending.load(Ordering::SeqCst) == 0 {
                break Ok(());
            }
            if Instant::now() > deadline {
                let timed_out = self.mark_timeouts();
                warn!(timed_out, "Confirmation deadline reached");
                break Ok(());
            }
            self.poll_receipts().await;
            tokio::time::sleep(self.config.poll_interval).await;
        };

        block_shutdown.store(true, Ordering::Relaxed);
        if let Some(task) = block_task {
            let _ = task.await;
        }
        outcome?;

        let report = self.build_report(start_wall, start);
        info!(
            confirmed = report.metrics.total_confirmed,
            failed = report.metrics.total_failed,
            timeout = report.metrics.total_timeout,
            "Receipt collection finished"
        );
        Ok(report)
    }

    /// One receipt poll round: snapshot up to `batch_size` pending records
    /// and query their receipts with bounded parallelism. Missing receipts
    /// keep records Pending.
    async fn poll_receipts(&self) {
        let pending: Vec<B256> = self
            .records
            .iter()
            .filter(|r| r.status == TxStatus::Pending)
            .take(self.config.batch_size)
            .map(|r| *r.key())
            .collect();

        if pending.is_empty() {
            return;
        }

        let results: Vec<(B256, Result<Option<ReceiptView>>)> = stream::iter(pending)
            .map(|hash| {
                let client = Arc::clone(&self.client);
                async move { (hash, client.transaction_receipt(hash).await) }
            })
            .buffer_unordered(self.config.max_concurrent)
            .collect()
            .await;

        for (hash, result) in results {
            let receipt = match result {
                Ok(Some(receipt)) => receipt,
                // not yet mined, or a transient query failure
                Ok(None) => continue,
                Err(e) => {
                    trace!("Receipt query for {hash} failed: {e:#}");
                    continue;
                }
            };
            self.apply_receipt(hash, receipt);
        }
    }

    fn apply_receipt(&self, hash: B256, receipt: ReceiptView) {
        let Some(mut record) = self.records.get_mut(&hash) else {
            return;
        };
        if record.status != TxStatus::Pending {
            return;
        }

        let latency = record.sent_instant.elapsed();
        record.confirmed_at = Some(Utc::now());
        record.latency = Some(latency);

        if receipt.status {
            record.status = TxStatus::Success;
            self.confirmed.fetch_add(1, Ordering::SeqCst);
            self.metrics.record_confirmed(latency);
            self.metrics.add_gas_used(receipt.gas_used);
        } else {
            record.status = TxStatus::Failed;
            record.error = Some("execution reverted (status 0)".to_string());
            self.failed.fetch_add(1, Ordering::SeqCst);
            self.metrics.record_failed();
        }
        record.receipt = Some(receipt);

        let pending = self.pending.fetch_sub(1, Ordering::SeqCst) - 1;
        self.metrics.set_pending(pending);
    }

    fn mark_timeouts(&self) -> usize {
        let mut timed_out = 0;
        for mut record in self.records.iter_mut() {
            if record.status == TxStatus::Pending {
                record.status = TxStatus::Timeout;
                record.error = Some("confirmation timeout".to_string());
                self.pending.fetch_sub(1, Ordering::SeqCst);
                self.metrics.record_timeout();
                timed_out += 1;
            }
        }
        self.metrics.set_pending(0);
        timed_out
    }

    async fn block_loop(&self, shutdown: Arc<AtomicBool>) {
        // only blocks produced after collection starts are observed
        let mut last_seen = match self.client.block_number().await {
            Ok(head) => head,
            Err(e) => {
                warn!("Block loop failed to query the initial head: {e:#}");
                0
            }
        };

        let mut interval = tokio::time::interval(self.config.block_poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !shutdown.load(Ordering::Relaxed) {
            interval.tick().await;
            if let Err(e) = self.observe_new_blocks(&mut last_seen).await {
                debug!("Block observation round failed: {e:#}");
            }
        }
    }

    /// Fetches every block past `last_seen` in order and appends an
    /// observation for each, counting tracked hashes that appear in it.
    pub(crate) async fn observe_new_blocks(&self, last_seen: &mut u64) -> Result<usize> {
        let head = self.client.block_number().await?;
        let mut observed = 0;

        for number in (*last_seen + 1)..=head {
            let Some(block) = self.client.block_by_number(number).await? else {
                continue;
            };

            let our_tx_count = block
                .transactions
                .iter()
                .filter(|hash| self.records.contains_key(*hash))
                .count();
            let utilization = if block.gas_limit > 0 {
                block.gas_used as f64 / block.gas_limit as f64 * 100.0
            } else {
                0.0
            };

            self.blocks.lock().unwrap().push(BlockObservation {
                number: block.number,
                hash: block.hash,
                timestamp: DateTime::from_timestamp(block.timestamp as i64, 0)
                    .unwrap_or_default(),
                gas_limit: block.gas_limit,
                gas_used: block.gas_used,
                tx_count: block.transactions.len(),
                our_tx_count,
                utilization,
            });
            observed += 1;
            *last_seen = number;
        }

        if head > *last_seen {
            *last_seen = head;
        }
        Ok(observed)
    }

    fn build_report(&self, start_wall: DateTime<Utc>, start: Instant) -> Report {
        let end_wall = Utc::now();
        let duration = start.elapsed();

        let mut metrics = ReportMetrics::default();
        let mut transactions = Vec::with_capacity(self.records.len());
        let mut latencies = Vec::new();
        let mut histogram = LatencyHistogram::default();
        let mut error_summary: HashMap<String, usize> = HashMap::new();
        let mut total_gas_used = 0u64;
        let mut total_gas_cost = U256::ZERO;

        for entry in self.records.iter() {
            let record = entry.value().clone();
            match record.status {
                TxStatus::Success => {
                    metrics.total_confirmed += 1;
                    if let Some(latency) = record.latency {
                        latencies.push(latency);
                        histogram.record(latency);
                    }
                    if let Some(receipt) = &record.receipt {
                        total_gas_used += receipt.gas_used;
                        total_gas_cost += U256::from(receipt.gas_used)
                            * U256::from(receipt.effective_gas_price);
                    }
                }
                TxStatus::Failed => {
                    metrics.total_failed += 1;
                    if let Some(error) = &record.error {
                        *error_summary.entry(error.clone()).or_default() += 1;
                    }
                }
                TxStatus::Timeout => metrics.total_timeout += 1,
                TxStatus::Pending => metrics.total_pending += 1,
            }
            transactions.push(record);
        }

        metrics.total_sent = transactions.len();

        if !latencies.is_empty() {
            latencies.sort_unstable();
            let sum: Duration = latencies.iter().sum();
            metrics.avg_latency = sum / latencies.len() as u32;
            metrics.min_latency = latencies[0];
            metrics.max_latency = *latencies.last().unwrap();
            metrics.p50_latency = percentile(&latencies, 50);
            metrics.p95_latency = percentile(&latencies, 95);
            metrics.p99_latency = percentile(&latencies, 99);
        }

        if duration.as_secs_f64() > 0.0 {
            metrics.tps = metrics.total_sent as f64 / duration.as_secs_f64();
            metrics.confirmed_tps = metrics.total_confirmed as f64 / duration.as_secs_f64();
        }
        self.metrics.set_confirmed_tps(metrics.confirmed_tps);

        if metrics.total_confirmed > 0 {
            metrics.total_gas_used = total_gas_used;
            metrics.avg_gas_used = total_gas_used / metrics.total_confirmed as u64;
            metrics.total_gas_cost = total_gas_cost;
            metrics.avg_gas_cost = total_gas_cost / U256::from(metrics.total_confirmed);
        }

        if metrics.total_sent > 0 {
            metrics.success_rate =
                metrics.total_confirmed as f64 / metrics.total_sent as f64 * 100.0;
        }

        let blocks = self.blocks.lock().unwrap().clone();
        metrics.blocks_observed = blocks.len();
        if blocks.len() > 1 {
            let mut total_block_time = Duration::ZERO;
            for pair in blocks.windows(2) {
                let delta = (pair[1].timestamp - pair[0].timestamp)
                    .to_std()
                    .unwrap_or_default();
                total_block_time += delta;
            }
            metrics.avg_block_time = total_block_time / (blocks.len() - 1) as u32;
        }
        if !blocks.is_empty() {
            metrics.avg_tx_per_block =
                blocks.iter().map(|b| b.tx_count).sum::<usize>() as f64 / blocks.len() as f64;
            metrics.avg_utilization =
                blocks.iter().map(|b| b.utilization).sum::<f64>() / blocks.len() as f64;
        }

        let with_ours: Vec<&BlockObservation> =
            blocks.iter().filter(|b| b.our_tx_count > 0).collect();
        if let (Some(first), Some(last)) = (with_ours.first(), with_ours.last()) {
            metrics.first_block_with_tx = first.number;
            metrics.last_block_with_tx = last.number;
            metrics.block_span = (last.number - first.number + 1) as usize;
            metrics.blocks_with_our_tx = with_ours.len();
            metrics.block_based_tps = block_based_tps(
                metrics.total_confirmed,
                metrics.blocks_with_our_tx,
                metrics.avg_block_time,
            );
        }

        Report {
            test_name: "stress-test".to_string(),
            start_time: start_wall,
            end_time: end_wall,
            duration,
            metrics,
            transactions,
            blocks,
            latency_histogram: histogram,
            error_summary,
        }
    }
}

/// `total_confirmed / (blocks_with_our_tx × avg_block_time)`, zero when
/// either factor is zero.
pub fn block_based_tps(
    total_confirmed: usize,
    blocks_with_our_tx: usize,
    avg_block_time: Duration,
) -> f64 {
    if blocks_with_our_tx == 0 || avg_block_time.as_secs_f64() <= 0.0 {
        return 0.0;
    }
    total_confirmed as f64 / (blocks_with_our_tx as f64 * avg_block_time.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        client::ChainBlock,
        testutil::MockRpc,
    };

    fn fast_config() -> CollectorConfig {
        CollectorConfig {
            poll_interval: Duration::from_millis(10),
            confirm_timeout: Duration::from_secs(5),
            max_concurrent: 4,
            batch_size: 100,
            block_tracking: false,
            block_poll_interval: Duration::from_millis(20),
        }
    }

    fn collector(mock: Arc<MockRpc>, config: CollectorConfig) -> Arc<Collector> {
        Arc::new(Collector::new(mock, config, Arc::new(MetricsSink::default())))
    }

    fn receipt(status: bool) -> ReceiptView {
        ReceiptView {
            status,
            gas_used: 21_000,
            effective_gas_price: 1_000_000_000,
            block_number: Some(1),
        }
    }

    #[tokio::test]
    async fn successful_receipts_confirm_records() {
        let mock = Arc::new(MockRpc::new());
        let collector = collector(mock.clone(), fast_config());

        for i in 0..5u8 {
            let hash = B256::repeat_byte(i + 1);
            collector.track(hash, Address::repeat_byte(0xaa), i as u64, 21_000);
            mock.set_receipt(hash, receipt(true));
        }

        let report = collector.collect(&Arc::new(AtomicBool::new(false))).await.unwrap();
        assert_eq!(report.metrics.total_sent, 5);
        assert_eq!(report.metrics.total_confirmed, 5);
        assert_eq!(report.metrics.total_timeout, 0);
        assert_eq!(report.metrics.success_rate, 100.0);
        assert_eq!(report.metrics.total_gas_used, 5 * 21_000);
        assert_eq!(report.latency_histogram.total(), 5);
        assert!(report.metrics.p50_latency <= report.metrics.p99_latency);
    }

    #[tokio::test]
    async fn reverted_receipts_fail_records() {
        let mock = Arc::new(MockRpc::new());
        let collector = collector(mock.clone(), fast_config());

        let good = B256::repeat_byte(0x01);
        let bad = B256::repeat_byte(0x02);
        collector.track(good, Address::repeat_byte(0xaa), 0, 21_000);
        collector.track(bad, Address::repeat_byte(0xaa), 1, 21_000);
        mock.set_receipt(good, receipt(true));
        mock.set_receipt(bad, receipt(false));

        let report = collector.collect(&Arc::new(AtomicBool::new(false))).await.unwrap();
        assert_eq!(report.metrics.total_confirmed, 1);
        assert_eq!(report.metrics.total_failed, 1);
        assert_eq!(
            report.error_summary["execution reverted (status 0)"], 1
        );
    }

    #[tokio::test]
    async fn missing_receipts_become_timeouts() {
        let mock = Arc::new(MockRpc::new());
        let config = CollectorConfig {
            confirm_timeout: Duration::from_millis(50),
            ..fast_config()
        };
        let collector = collector(mock, config);

        let hash = B256::repeat_byte(0x77);
        collector.track(hash, Address::repeat_byte(0xaa), 0, 21_000);

        let report = collector.collect(&Arc::new(AtomicBool::new(false))).await.unwrap();
        assert_eq!(report.metrics.total_timeout, 1);
        assert_eq!(report.metrics.total_confirmed, 0);
        assert_eq!(report.metrics.success_rate, 0.0);

        let record = &report.transactions[0];
        assert_eq!(record.status, TxStatus::Timeout);
        assert_eq!(record.error.as_deref(), Some("confirmation timeout"));
    }

    #[tokio::test]
    async fn send_failures_are_terminal_before_polling() {
        let mock = Arc::new(MockRpc::new());
        let collector = collector(mock, fast_config());

        let hash = B256::repeat_byte(0x55);
        collector.track(hash, Address::repeat_byte(0xaa), 0, 21_000);
        collector.mark_send_failed(hash, "nonce too low");
        // terminal: a second mark must not double count
        collector.mark_send_failed(hash, "nonce too low");

        assert_eq!(collector.failed_count(), 1);
        assert_eq!(collector.pending_count(), 0);

        let report = collector.collect(&Arc::new(AtomicBool::new(false))).await.unwrap();
        assert_eq!(report.metrics.total_failed, 1);
        assert_eq!(report.error_summary["nonce too low"], 1);
    }

    #[tokio::test]
    async fn block_observations_count_our_transactions() {
        let mock = Arc::new(MockRpc::new());
        let collector = collector(mock.clone(), fast_config());

        let ours = B256::repeat_byte(0x11);
        let theirs = B256::repeat_byte(0x99);
        collector.track(ours, Address::repeat_byte(0xaa), 0, 21_000);

        mock.set_blocks(vec![
            ChainBlock {
                number: 1,
                hash: B256::repeat_byte(0xb1),
                timestamp: 1_700_000_000,
                gas_limit: 30_000_000,
                gas_used: 15_000_000,
                transactions: vec![theirs],
            },
            ChainBlock {
                number: 2,
                hash: B256::repeat_byte(0xb2),
                timestamp: 1_700_000_002,
                gas_limit: 30_000_000,
                gas_used: 30_000_000,
                transactions: vec![ours, theirs],
            },
        ]);

        let mut last_seen = 0;
        let observed = collector.observe_new_blocks(&mut last_seen).await.unwrap();
        assert_eq!(observed, 2);
        assert_eq!(last_seen, 2);

        let blocks = collector.blocks.lock().unwrap().clone();
        assert_eq!(blocks[0].our_tx_count, 0);
        assert_eq!(blocks[0].utilization, 50.0);
        assert_eq!(blocks[1].our_tx_count, 1);
        assert_eq!(blocks[1].utilization, 100.0);

        // numbers are strictly increasing
        assert!(blocks.windows(2).all(|w| w[0].number < w[1].number));
    }

    #[tokio::test]
    async fn block_based_tps_identity() {
        assert_eq!(block_based_tps(0, 0, Duration::ZERO), 0.0);
        assert_eq!(block_based_tps(10, 0, Duration::from_secs(2)), 0.0);
        assert_eq!(block_based_tps(10, 5, Duration::ZERO), 0.0);

        let tps = block_based_tps(100, 5, Duration::from_secs(2));
        assert!((tps - 10.0).abs() < 1e-9);
    }
}
