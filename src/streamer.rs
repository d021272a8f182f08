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

use std::num::NonZeroU32;

use chrono::Utc;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tokio::{sync::Semaphore, task::JoinSet, time::timeout};

use crate::{
    batcher::{SendStatus, TxOutcome},
    builder::SignedTx,
    prelude::*,
};

#[derive(Debug, Clone)]
pub struct StreamerConfig {
    /// Target send rate in tx/s
    pub rate: u32,
    /// Token bucket burst
    pub burst: u32,
    /// Concurrent sender workers
    pub workers: usize,
    /// Per-send deadline
    pub timeout: Duration,
}

impl Default for StreamerConfig {
    fn default() -> Self {
        Self {
            rate: 1000,
            burst: 100,
            workers: 10,
            timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StreamResult {
    pub total_txs: usize,
    pub success_count: usize,
    pub failed_count: usize,
    pub total_duration: Duration,
    pub tx_per_second: f64,
    pub results: Vec<TxOutcome>,
    pub failed: Vec<TxOutcome>,
}

/// Rate-limited per-transaction sender.
///
/// The contract is predictable throughput with a bounded tail, not
/// durability: failures are recorded per transaction and never retried.
pub struct Streamer {
    client: Arc<dyn EthRpc>,
    config: StreamerConfig,
    limiter: DefaultDirectRateLimiter,
}

impl Streamer {
    pub fn new(client: Arc<dyn EthRpc>, config: StreamerConfig) -> Self {
        let rate = NonZeroU32::new(config.rate.max(1)).expect("nonzero rate");
        let burst = NonZeroU32::new(config.burst.max(1)).expect("nonzero burst");
        let limiter = RateLimiter::direct(Quota::per_second(rate).allow_burst(burst));
        Self {
            client,
            config,
            limiter,
        }
    }

    pub async fn stream(
        &self,
        txs: &[SignedTx],
        shutdown: &Arc<AtomicBool>,
    ) -> Result<StreamResult> {
        if txs.is_empty() {
            return Ok(StreamResult::default());
        }

        info!(
            total_txs = txs.len(),
            rate = self.config.rate,
            burst = self.config.burst,
            workers = self.config.workers,
            "Starting streaming send"
        );

        let start = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.config.workers.max(1)));
        let mut tasks: JoinSet<(usize, TxOutcome)> = JoinSet::new();

        for (index, tx) in txs.iter().enumerate() {
            if shutdown.load(Ordering::Relaxed) {
                debug!("Streamer cancelled after {index} permits");
                break;
            }
            self.limiter.until_ready().await;

            let client = Arc::clone(&self.client);
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .expect("semaphore closed");
            let send_timeout = self.config.timeout;
            let tx = tx.clone();
            tasks.spawn(async move {
                let _permit = permit;
                let outcome = send_single(client, &tx, send_timeout).await;
                (index, outcome)
            });
        }

        let mut results: Vec<Option<TxOutcome>> = vec![None; txs.len()];
        while let Some(joined) = tasks.join_next().await {
            let (index, outcome) = joined.wrap_err("stream worker panicked")?;
            results[index] = Some(outcome);
        }

        let results: Vec<TxOutcome> = results.into_iter().flatten().collect();
        let total_duration = start.elapsed();

        let mut stream_result = StreamResult {
            total_txs: results.len(),
            total_duration,
            ..Default::default()
        };
        for outcome in &results {
            if outcome.status == SendStatus::Failed {
                stream_result.failed_count += 1;
                stream_result.failed.push(outcome.clone());
            } else {
                stream_result.success_count += 1;
            }
        }
        if total_duration.as_secs_f64() > 0.0 {
            stream_result.tx_per_second =
                stream_result.success_count as f64 / total_duration.as_secs_f64();
        }
        stream_result.results = results;

        info!(
            success = stream_result.success_count,
            failed = stream_result.failed_count,
            tx_per_second = %format!("{:.2}", stream_result.tx_per_second),
            "Streaming send complete"
        );
        Ok(stream_result)
    }
}

async fn send_single(client: Arc<dyn EthRpc>, tx: &SignedTx, deadline: Duration) -> TxOutcome {
    let sent_at = Utc::now();
    let result = timeout(deadline, client.send_raw_transaction(&tx.raw)).await;

    match result {
        Ok(Ok(hash)) => TxOutcome {
            hash,
            local_hash: tx.hash,
            from: tx.from,
            nonce: tx.nonce,
            status: SendStatus::Sent,
            error: None,
            sent_at,
            batch_index: 0,
        },
        Ok(Err(e)) => TxOutcome {
            hash: B256::ZERO,
            local_hash: tx.hash,
            from: tx.from,
            nonce: tx.nonce,
            status: SendStatus::Failed,
            error: Some(format!("{e:#}")),
            sent_at,
            batch_index: 0,
        },
        Err(_) => TxOutcome {
            hash: B256::ZERO,
            local_hash: tx.hash,
            from: tx.from,
            nonce: tx.nonce,
            status: SendStatus::Failed,
            error: Some("send timed out".to_string()),
            sent_at,
            batch_index: 0,
        },
    }
}
