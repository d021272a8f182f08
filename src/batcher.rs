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

use chrono::{DateTime, Utc};
use tokio::{sync::Semaphore, task::JoinSet, time::timeout};

use crate::{builder::SignedTx, prelude::*};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    Pending,
    Sent,
    Failed,
}

impl std::fmt::Display for SendStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SendStatus::Pending => "PENDING",
            SendStatus::Sent => "SENT",
            SendStatus::Failed => "FAILED",
        })
    }
}

/// Per-transaction dispatch outcome. `hash` is the node-returned hash,
/// zeroed when the node rejected the element; `local_hash` is the hash the
/// builder computed and the collector tracks.
#[derive(Debug, Clone)]
pub struct TxOutcome {
    pub hash: B256,
    pub local_hash: B256,
    pub from: Address,
    pub nonce: u64,
    pub status: SendStatus,
    pub error: Option<String>,
    pub sent_at: DateTime<Utc>,
    pub batch_index: usize,
}

#[derive(Debug, Clone)]
pub struct ChunkResult {
    pub batch_index: usize,
    pub tx_count: usize,
    pub success_count: usize,
    pub failed_count: usize,
    pub duration: Duration,
    pub results: Vec<TxOutcome>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    pub total_batches: usize,
    pub total_txs: usize,
    pub success_count: usize,
    pub failed_count: usize,
    pub total_duration: Duration,
    pub avg_batch_time: Duration,
    pub tx_per_second: f64,
    pub chunks: Vec<ChunkResult>,
    pub failed: Vec<TxOutcome>,
}

#[derive(Debug, Clone)]
pub struct BatcherConfig {
    /// Transactions per batched call, minimum 1
    pub batch_size: usize,
    /// Concurrently outstanding chunks
    pub max_concurrent: usize,
    /// Delay a worker holds its slot after each dispatch
    pub batch_interval: Duration,
    /// Whole-chunk retries on transport failure
    pub retry_count: u32,
    /// Base delay between retries, scaled linearly with the attempt
    pub retry_delay: Duration,
    /// Per-dispatch deadline
    pub timeout: Duration,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            max_concurrent: 5,
            batch_interval: Duration::from_millis(100),
            retry_count: 3,
            retry_delay: Duration::from_millis(500),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Splits a signed-tx stream into bounded-concurrency batch RPC sends.
///
/// Whole-chunk transport failures are retried; element-level rejections
/// inside a successful batch are terminal for that transaction and never
/// retried, so callers can reason about idempotence.
pub struct Batcher {
    client: Arc<dyn EthRpc>,
    config: BatcherConfig,
}

impl Batcher {
    pub fn new(client: Arc<dyn EthRpc>, mut config: BatcherConfig) -> Self {
        config.batch_size = config.batch_size.max(1);
        config.max_concurrent = config.max_concurrent.max(1);
        Self { client, config }
    }

    pub async fn send_all(&self, txs: &[SignedTx]) -> Result<BatchSummary> {
        if txs.is_empty() {
            return Ok(BatchSummary::default());
        }

        let chunks: Vec<Vec<SignedTx>> = txs
            .chunks(self.config.batch_size)
            .map(|c| c.to_vec())
            .collect();
        info!(
            total_txs = txs.len(),
            batches = chunks.len(),
            batch_size = self.config.batch_size,
            max_concurrent = self.config.max_concurrent,
            "Starting batch sending"
        );

        let start = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent));
        let mut tasks = JoinSet::new();

        for (index, chunk) in chunks.into_iter().enumerate() {
            let client = Arc::clone(&self.client);
            let config = self.config.clone();
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                let result = send_chunk(client, &config, index, chunk).await;
                if !config.batch_interval.is_zero() {
                    tokio::time::sleep(config.batch_interval).await;
                }
                result
            });
        }

        let mut chunk_results: Vec<Option<ChunkResult>> = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let result = joined.wrap_err("batch worker panicked")?;
            let batch_index = result.batch_index;
            if chunk_results.len() <= batch_index {
                chunk_results.resize(batch_index + 1, None);
            }
            chunk_results[batch_index] = Some(result);
        }

        let chunks: Vec<ChunkResult> = chunk_results.into_iter().flatten().collect();
        let summary = build_summary(chunks, start.elapsed());
        info!(
            success = summary.success_count,
            failed = summary.failed_count,
            tx_per_second = %format!("{:.2}", summary.tx_per_second),
            "Batch sending complete"
        );
        Ok(summary)
    }
}

async fn send_chunk(
    client: Arc<dyn EthRpc>,
    config: &BatcherConfig,
    batch_index: usize,
    txs: Vec<SignedTx>,
) -> ChunkResult {
    let start = Instant::now();
    let raws: Vec<Bytes> = txs.iter().map(|tx| tx.raw.clone()).collect();

    let mut attempt: u32 = 0;
    let sent = loop {
        if attempt > 0 {
            tokio::time::sleep(config.retry_delay * attempt).await;
        }

        match timeout(config.timeout, client.batch_send_raw_transactions(&raws)).await {
            Ok(Ok(results)) => break Ok(results),
            Ok(Err(e)) if attempt >= config.retry_count => {
                break Err(format!(
                    "batch send failed after {} attempts: {e:#}",
                    attempt + 1
                ));
            }
            Err(_) if attempt >= config.retry_count => {
                break Err(format!(
                    "batch send timed out after {} attempts",
                    attempt + 1
                ));
            }
            Ok(Err(e)) => {
                warn!(batch_index, attempt, "Batch send failed, retrying: {e:#}");
            }
            Err(_) => {
                warn!(batch_index, attempt, "Batch send timed out, retrying");
            }
        }
        attempt += 1;
    };

    let now = Utc::now();
    let mut result = ChunkResult {
        batch_index,
        tx_count: txs.len(),
        success_count: 0,
        failed_count: 0,
        duration: start.elapsed(),
        results: Vec::with_capacity(txs.len()),
        error: None,
    };

    match sent {
        Err(message) => {
            result.failed_count = txs.len();
            result.error = Some(message.clone());
            for tx in &txs {
                result.results.push(TxOutcome {
                    hash: B256::ZERO,
                    local_hash: tx.hash,
                    from: tx.from,
                    nonce: tx.nonce,
                    status: SendStatus::Failed,
                    error: Some(message.clone()),
                    sent_at: now,
                    batch_index,
                });
            }
        }
        Ok(results) => {
            for (tx, element) in txs.iter().zip(results) {
                let outcome = match element {
                    Ok(hash) => {
                        result.success_count += 1;
                        TxOutcome {
                            hash,
                            local_hash: tx.hash,
                            from: tx.from,
                            nonce: tx.nonce,
                            status: SendStatus::Sent,
                            error: None,
                            sent_at: now,
                            batch_index,
                        }
                    }
                    Err(e) => {
                        result.failed_count += 1;
                        TxOutcome {
                            hash: B256::ZERO,
                            local_hash: tx.hash,
                            from: tx.from,
                            nonce: tx.nonce,
                            status: SendStatus::Failed,
                            error: Some(format!("{e:#}")),
                            sent_at: now,
                            batch_index,
                        }
                    }
                };
                result.results.push(outcome);
            }
        }
    }

    result
}

fn build_summary(chunks: Vec<ChunkResult>, total_duration: Duration) -> BatchSummary {
    let mut summary = BatchSummary {
        total_batches: chunks.len(),
        total_duration,
        ..Default::default()
    };

    let mut total_chunk_time = Duration::ZERO;
    for chunk in &chunks {
        summary.total_txs += chunk.tx_count;
        summary.success_count += chunk.success_count;
        summary.failed_count += chunk.failed_count;
        total_chunk_time += chunk.duration;
        summary.failed.extend(
            chunk
                .results
                .iter()
                .filter(|r| r.status == SendStatus::Failed)
                .cloned(),
        );
    }

    if !chunks.is_empty() {
        summary.avg_batch_time = total_chunk_time / chunks.len() as u32;
    }
    if total_duration.as_secs_f64() > 0.0 {
        summary.tx_per_second = summary.success_count as f64 / total_duration.as_secs_f64();
    }
    summary.chunks = chunks;
    summary
}

#[cfg(test)]
mod tests {
    use alloy_primitives::keccak256;

    use super::*;
    use crate::{
        builder::{make_builder, BuilderConfig, BuilderOptions},
        config::Mode,
        gas::GasSettings,
        testutil::{test_keys, MockRpc},
    };

    fn build_txs(count: usize) -> Vec<SignedTx> {
        let keys = test_keys(2);
        let builder = make_builder(
            Mode::Transfer,
            BuilderConfig {
                chain_id: 1337,
                gas_limit: 0,
                gas: GasSettings {
                    tip_cap: 1,
                    fee_cap: 2,
                },
                value: U256::from(1),
            },
            BuilderOptions::default(),
        )
        .unwrap();
        builder.build(&keys, &[0, 0], count).unwrap()
    }

    fn fast_config(batch_size: usize) -> BatcherConfig {
        BatcherConfig {
            batch_size,
            max_concurrent: 4,
            batch_interval: Duration::ZERO,
            retry_count: 3,
            retry_delay: Duration::from_millis(5),
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn splits_into_chunks_and_sends_all() {
        let mock = Arc::new(MockRpc::new());
        let txs = build_txs(10);
        let batcher = Batcher::new(mock.clone(), fast_config(4));

        let summary = batcher.send_all(&txs).await.unwrap();
        assert_eq!(summary.total_batches, 3);
        assert_eq!(summary.total_txs, 10);
        assert_eq!(summary.success_count, 10);
        assert_eq!(summary.failed_count, 0);
        assert_eq!(mock.sent().len(), 10);

        // within a chunk, returned hashes align positionally
        for chunk in &summary.chunks {
            for outcome in &chunk.results {
                assert_eq!(outcome.status, SendStatus::Sent);
            }
        }
    }

    #[tokio::test]
    async fn element_failures_are_terminal_and_not_retried() {
        let mock = Arc::new(MockRpc::new());
        let txs = build_txs(2);
        let h1 = keccak256(&txs[0].raw);
        mock.script_batch(vec![Ok(h1), Err("nonce too low".to_string())]);

        let batcher = Batcher::new(mock.clone(), fast_config(10));
        let summary = batcher.send_all(&txs).await.unwrap();

        // a retry would have re-sent through the unscripted default path
        // and reported two successes
        assert_eq!(summary.success_count, 1);
        assert_eq!(summary.failed_count, 1);

        let failed = &summary.failed[0];
        assert_eq!(failed.hash, B256::ZERO);
        assert!(failed.error.as_deref().unwrap().contains("nonce too low"));

        let sent = &summary.chunks[0].results[0];
        assert_eq!(sent.hash, h1);
    }

    #[tokio::test]
    async fn whole_chunk_transport_failures_are_retried() {
        let mock = Arc::new(MockRpc::new());
        mock.fail_next_batches(2);
        let txs = build_txs(3);

        let batcher = Batcher::new(mock.clone(), fast_config(10));
        let summary = batcher.send_all(&txs).await.unwrap();
        assert_eq!(summary.success_count, 3);
        assert_eq!(summary.failed_count, 0);
    }

    #[tokio::test]
    async fn exhausted_retries_fail_the_whole_chunk() {
        let mock = Arc::new(MockRpc::new());
        mock.fail_next_batches(10);
        let txs = build_txs(3);

        let config = BatcherConfig {
            retry_count: 1,
            ..fast_config(10)
        };
        let summary = Batcher::new(mock, config).send_all(&txs).await.unwrap();
        assert_eq!(summary.failed_count, 3);
        assert!(summary.chunks[0].error.is_some());
        for outcome in &summary.failed {
            assert_eq!(outcome.status, SendStatus::Failed);
            assert!(outcome.error.is_some());
        }
    }

    #[tokio::test]
    async fn empty_input_is_a_noop() {
        let batcher = Batcher::new(Arc::new(MockRpc::new()), BatcherConfig::default());
        let summary = batcher.send_all(&[]).await.unwrap();
        assert_eq!(summary.total_txs, 0);
    }
}
