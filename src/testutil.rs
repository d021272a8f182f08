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

//! Scripted chain state for unit tests.

use std::{
    collections::{HashMap, VecDeque},
    sync::Mutex,
};

use alloy_primitives::keccak256;
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;

use crate::{
    client::{ChainBlock, ReceiptView},
    prelude::*,
};

/// Deterministic signing keys: key `i` is the 32-byte big-endian integer
/// `i + 1`.
pub fn test_keys(n: usize) -> Vec<PrivateKeySigner> {
    (0..n)
        .map(|i| {
            let key = B256::with_last_byte(i as u8 + 1);
            PrivateKeySigner::from_bytes(&key).unwrap()
        })
        .collect()
}

/// In-memory `EthRpc` with scriptable failures.
pub struct MockRpc {
    chain_id: AtomicU64,
    chain_id_failures: AtomicUsize,
    nonces: Mutex<HashMap<Address, u64>>,
    nonce_failures: AtomicUsize,
    balances: Mutex<HashMap<Address, U256>>,
    gas: Mutex<(u128, u128)>,
    receipts: Mutex<HashMap<B256, ReceiptView>>,
    blocks: Mutex<Vec<ChainBlock>>,
    sent: Mutex<Vec<Bytes>>,
    send_failures: AtomicUsize,
    batch_transport_failures: AtomicUsize,
    scripted_batches: Mutex<VecDeque<Vec<Result<B256, String>>>>,
    auto_receipts: AtomicBool,
}

impl MockRpc {
    pub fn new() -> Self {
        Self {
            chain_id: AtomicU64::new(1337),
            chain_id_failures: AtomicUsize::new(0),
            nonces: Mutex::new(HashMap::new()),
            nonce_failures: AtomicUsize::new(0),
            balances: Mutex::new(HashMap::new()),
            gas: Mutex::new((1_000_000_000, 100_000_000)),
            receipts: Mutex::new(HashMap::new()),
            blocks: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            send_failures: AtomicUsize::new(0),
            batch_transport_failures: AtomicUsize::new(0),
            scripted_batches: Mutex::new(VecDeque::new()),
            auto_receipts: AtomicBool::new(false),
        }
    }

    pub fn set_chain_id(&self, id: u64) {
        self.chain_id.store(id, Ordering::SeqCst);
    }

    pub fn fail_next_chain_id_queries(&self, n: usize) {
        self.chain_id_failures.store(n, Ordering::SeqCst);
    }

    pub fn set_nonce(&self, address: Address, nonce: u64) {
        self.nonces.lock().unwrap().insert(address, nonce);
    }

    pub fn fail_next_nonce_queries(&self, n: usize) {
        self.nonce_failures.store(n, Ordering::SeqCst);
    }

    pub fn set_balance(&self, address: Address, balance: U256) {
        self.balances.lock().unwrap().insert(address, balance);
    }

    pub fn set_gas_price(&self, price: u128, tip: u128) {
        *self.gas.lock().unwrap() = (price, tip);
    }

    pub fn set_receipt(&self, hash: B256, receipt: ReceiptView) {
        self.receipts.lock().unwrap().insert(hash, receipt);
    }

    pub fn set_blocks(&self, blocks: Vec<ChainBlock>) {
        *self.blocks.lock().unwrap() = blocks;
    }

    /// Every accepted send gets a status-1 receipt immediately.
    pub fn enable_auto_receipts(&self) {
        self.auto_receipts.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_sends(&self, n: usize) {
        self.send_failures.store(n, Ordering::SeqCst);
    }

    /// The next `n` whole batch calls fail at the transport level.
    pub fn fail_next_batches(&self, n: usize) {
        self.batch_transport_failures.store(n, Ordering::SeqCst);
    }

    /// Scripts the per-element outcome of the next batch call.
    pub fn script_batch(&self, results: Vec<Result<B256, String>>) {
        self.scripted_batches.lock().unwrap().push_back(results);
    }

    pub fn sent(&self) -> Vec<Bytes> {
        self.sent.lock().unwrap().clone()
    }

    fn accept(&self, raw: &Bytes) -> B256 {
        let hash = keccak256(raw);
        self.sent.lock().unwrap().push(raw.clone());
        if self.auto_receipts.load(Ordering::SeqCst) {
            self.receipts.lock().unwrap().insert(
                hash,
                ReceiptView {
                    status: true,
                    gas_used: 21_000,
                    effective_gas_price: self.gas.lock().unwrap().0,
                    block_number: Some(1),
                },
            );
        }
        hash
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl Default for MockRpc {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EthRpc for MockRpc {
    async fn chain_id(&self) -> Result<u64> {
        if Self::take_failure(&self.chain_id_failures) {
            bail!(TxGenError::Transport("mock chain id failure".into()));
        }
        Ok(self.chain_id.load(Ordering::SeqCst))
    }

    async fn block_number(&self) -> Result<u64> {
        Ok(self
            .blocks
            .lock()
            .unwrap()
            .last()
            .map(|b| b.number)
            .unwrap_or_default())
    }

    async fn block_by_number(&self, number: u64) -> Result<Option<ChainBlock>> {
        Ok(self
            .blocks
            .lock()
            .unwrap()
            .iter()
            .find(|b| b.number == number)
            .cloned())
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<ReceiptView>> {
        Ok(self.receipts.lock().unwrap().get(&hash).cloned())
    }

    async fn pending_nonce(&self, address: Address) -> Result<u64> {
        if Self::take_failure(&self.nonce_failures) {
            bail!(TxGenError::Transport("mock nonce failure".into()));
        }
        Ok(*self.nonces.lock().unwrap().get(&address).unwrap_or(&0))
    }

    async fn balance(&self, address: Address) -> Result<U256> {
        Ok(*self
            .balances
            .lock()
            .unwrap()
            .get(&address)
            .unwrap_or(&U256::ZERO))
    }

    async fn gas_price(&self) -> Result<u128> {
        Ok(self.gas.lock().unwrap().0)
    }

    async fn max_priority_fee(&self) -> Result<u128> {
        Ok(self.gas.lock().unwrap().1)
    }

    async fn send_raw_transaction(&self, raw: &Bytes) -> Result<B256> {
        if Self::take_failure(&self.send_failures) {
            bail!(TxGenError::Rejected("mock send failure".into()));
        }
        Ok(self.accept(raw))
    }

    async fn batch_send_raw_transactions(&self, raws: &[Bytes]) -> Result<Vec<Result<B256>>> {
        if Self::take_failure(&self.batch_transport_failures) {
            bail!(TxGenError::Transport("mock batch transport failure".into()));
        }

        if let Some(script) = self.scripted_batches.lock().unwrap().pop_front() {
            let mut results = Vec::with_capacity(raws.len());
            for (raw, outcome) in raws.iter().zip(script) {
                results.push(match outcome {
                    Ok(hash) => {
                        self.accept(raw);
                        Ok(hash)
                    }
                    Err(message) => Err(TxGenError::Rejected(message).into()),
                });
            }
            return Ok(results);
        }

        Ok(raws.iter().map(|raw| Ok(self.accept(raw))).collect())
    }
}
