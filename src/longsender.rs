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

use std::{num::NonZeroU32, sync::Mutex};

use alloy_consensus::TxEip1559;
use alloy_primitives::TxKind;
use alloy_signer_local::PrivateKeySigner;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};

use crate::{
    builder::{sign_tx, SignedTx},
    prelude::*,
};

const SELF_TRANSFER_GAS: u64 = 21_000;
const MAX_RECORDED_ERRORS: usize = 100;

#[derive(Debug, Clone)]
pub struct LongSenderConfig {
    pub duration: Duration,
    pub tps: u32,
    pub burst: u32,
    pub workers: usize,
}

impl LongSenderConfig {
    pub fn with_default_burst(duration: Duration, tps: u32, workers: usize) -> Self {
        Self {
            duration,
            tps,
            burst: (tps / 10).max(10),
            workers,
        }
    }
}

type SentCallback = Box<dyn Fn(B256) + Send + Sync>;
type FailedCallback = Box<dyn Fn(&str) + Send + Sync>;
type TpsCallback = Box<dyn Fn(f64) + Send + Sync>;

#[derive(Default)]
pub struct Callbacks {
    pub on_sent: Option<SentCallback>,
    pub on_failed: Option<FailedCallback>,
    pub on_tps: Option<TpsCallback>,
}

#[derive(Debug, Clone)]
pub struct LongSenderResult {
    pub total_sent: u64,
    pub total_failed: u64,
    pub duration: Duration,
    pub average_tps: f64,
    /// Up to the first hundred error strings
    pub errors: Vec<String>,
}

/// Duration-bounded continuous submission with rotating accounts.
///
/// Workers share one token bucket; each permit picks the next account
/// round-robin, allocates its next nonce from a per-account atomic
/// counter, and submits a zero-value EIP-1559 self-transfer.
pub struct LongSender {
    client: Arc<dyn EthRpc>,
    config: LongSenderConfig,
    callbacks: Callbacks,
}

struct Shared {
    client: Arc<dyn EthRpc>,
    keys: Vec<PrivateKeySigner>,
    nonces: Vec<AtomicU64>,
    rotation: AtomicUsize,
    sent: AtomicU64,
    failed: AtomicU64,
    errors: Mutex<Vec<String>>,
    limiter: DefaultDirectRateLimiter,
    callbacks: Callbacks,
    chain_id: u64,
    gas_price: u128,
    start: Instant,
    deadline: Instant,
    shutdown: Arc<AtomicBool>,
}

impl LongSender {
    pub fn new(client: Arc<dyn EthRpc>, config: LongSenderConfig) -> Self {
        Self {
            client,
            config,
            callbacks: Callbacks::default(),
        }
    }

    pub fn with_callbacks(mut self, callbacks: Callbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    pub async fn run(
        self,
        keys: Vec<PrivateKeySigner>,
        initial_nonces: Vec<u64>,
        shutdown: Arc<AtomicBool>,
    ) -> Result<LongSenderResult> {
        if keys.is_empty() {
            bail!("no keys provided");
        }
        if keys.len() != initial_nonces.len() {
            bail!("keys and nonces count mismatch");
        }

        let chain_id = self.client.chain_id().await?;
        let gas_price = self.client.gas_price().await?;

        let rate = NonZeroU32::new(self.config.tps.max(1)).expect("nonzero tps");
        let burst = NonZeroU32::new(self.config.burst.max(1)).expect("nonzero burst");

        let start = Instant::now();
        let shared = Arc::new(Shared {
            client: Arc::clone(&self.client),
            nonces: initial_nonces.iter().map(|&n| AtomicU64::new(n)).collect(),
            keys,
            rotation: AtomicUsize::new(0),
            sent: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            errors: Mutex::new(Vec::new()),
            limiter: RateLimiter::direct(Quota::per_second(rate).allow_burst(burst)),
            callbacks: self.callbacks,
            chain_id,
            gas_price,
            start,
            deadline: start + self.config.duration,
            shutdown,
        });

        info!(
            duration = ?self.config.duration,
            tps = self.config.tps,
            workers = self.config.workers,
            accounts = shared.keys.len(),
            "Starting continuous sending"
        );

        let mut workers = Vec::with_capacity(self.config.workers.max(1));
        for _ in 0..self.config.workers.max(1) {
            let shared = Arc::clone(&shared);
            workers.push(tokio::spawn(worker(shared)));
        }
        for worker in workers {
            let _ = worker.await;
        }

        let duration = start.elapsed();
        let total_sent = shared.sent.load(Ordering::SeqCst);
        let total_failed = shared.failed.load(Ordering::SeqCst);
        let average_tps = if duration.as_secs_f64() > 0.0 {
            total_sent as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        info!(
            total_sent,
            total_failed,
            average_tps = %format!("{average_tps:.2}"),
            "Continuous sending finished"
        );

        let errors = shared.errors.lock().unwrap().clone();
        Ok(LongSenderResult {
            total_sent,
            total_failed,
            duration,
            average_tps,
            errors,
        })
    }
}

async fn worker(shared: Arc<Shared>) {
    loop {
        if shared.shutdown.load(Ordering::Relaxed) || Instant::now() >= shared.deadline {
            return;
        }

        shared.limiter.until_ready().await;
        if Instant::now() >= shared.deadline {
            return;
        }

        let index = shared.rotation.fetch_add(1, Ordering::SeqCst) % shared.keys.len();
        let nonce = shared.nonces[index].fetch_add(1, Ordering::SeqCst);

        match send_one(&shared, index, nonce).await {
            Ok(hash) => {
                let sent = shared.sent.fetch_add(1, Ordering::SeqCst) + 1;
                if let Some(on_sent) = &shared.callbacks.on_sent {
                    on_sent(hash);
                }
                if let Some(on_tps) = &shared.callbacks.on_tps {
                    let elapsed = shared.start.elapsed().as_secs_f64();
                    if elapsed > 0.0 {
                        on_tps(sent as f64 / elapsed);
                    }
                }
            }
            Err(e) => {
                shared.failed.fetch_add(1, Ordering::SeqCst);
                let message = format!("{e:#}");
                {
                    let mut errors = shared.errors.lock().unwrap();
                    if errors.len() < MAX_RECORDED_ERRORS {
                        errors.push(message.clone());
                    }
                }
                if let Some(on_failed) = &shared.callbacks.on_failed {
                    on_failed(&message);
                }
            }
        }
    }
}

async fn send_one(shared: &Shared, index: usize, nonce: u64) -> Result<B256> {
    let key = &shared.keys[index];
    let from = key.address();

    let tx = TxEip1559 {
        chain_id: shared.chain_id,
        nonce,
        gas_limit: SELF_TRANSFER_GAS,
        max_fee_per_gas: shared.gas_price.saturating_mul(2),
        max_priority_fee_per_gas: shared.gas_price,
        to: TxKind::Call(from),
        value: U256::ZERO,
        access_list: Default::default(),
        input: Bytes::new(),
    };
    let signed = sign_tx(tx, key, nonce as usize)?;
    let signed = SignedTx::from_signed(signed, from, nonce, SELF_TRANSFER_GAS);

    shared.client.send_raw_transaction(&signed.raw).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{test_keys, MockRpc};

    #[tokio::test]
    async fn sends_until_the_duration_elapses() {
        let mock = Arc::new(MockRpc::new());
        let config = LongSenderConfig::with_default_burst(Duration::from_millis(300), 200, 4);
        assert_eq!(config.burst, 20);

        let sender = LongSender::new(mock.clone(), config);
        let result = sender
            .run(test_keys(3), vec![0, 0, 0], Arc::new(AtomicBool::new(false)))
            .await
            .unwrap();

        assert!(result.total_sent > 0);
        assert_eq!(result.total_failed, 0);
        assert!(result.duration >= Duration::from_millis(300));
        // rate-limit upper bound with generous slack for scheduling
        assert!(result.total_sent <= 200 * 2 / 5 + 20 + 10);
        assert_eq!(mock.sent().len() as u64, result.total_sent);
    }

    #[tokio::test]
    async fn failures_are_counted_and_sampled() {
        let mock = Arc::new(MockRpc::new());
        mock.fail_next_sends(5);

        let sender = LongSender::new(
            mock,
            LongSenderConfig {
                duration: Duration::from_millis(200),
                tps: 500,
                burst: 50,
                workers: 2,
            },
        );
        let result = sender
            .run(test_keys(2), vec![0, 0], Arc::new(AtomicBool::new(false)))
            .await
            .unwrap();

        assert_eq!(result.total_failed, 5);
        assert_eq!(result.errors.len(), 5);
        assert!(result.total_sent > 0);
    }

    #[tokio::test]
    async fn callbacks_fire_per_send() {
        let mock = Arc::new(MockRpc::new());
        let sent_calls = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&sent_calls);

        let sender = LongSender::new(
            mock,
            LongSenderConfig {
                duration: Duration::from_millis(150),
                tps: 300,
                burst: 30,
                workers: 2,
            },
        )
        .with_callbacks(Callbacks {
            on_sent: Some(Box::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })),
            on_failed: None,
            on_tps: None,
        });

        let result = sender
            .run(test_keys(1), vec![0], Arc::new(AtomicBool::new(false)))
            .await
            .unwrap();
        assert_eq!(sent_calls.load(Ordering::SeqCst), result.total_sent);
    }

    #[tokio::test]
    async fn rejects_mismatched_inputs() {
        let sender = LongSender::new(
            Arc::new(MockRpc::new()),
            LongSenderConfig::with_default_burst(Duration::from_millis(10), 10, 1),
        );
        assert!(sender
            .run(test_keys(2), vec![0], Arc::new(AtomicBool::new(false)))
            .await
            .is_err());
    }
}
