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

use alloy_primitives::{U128, U64};
use alloy_rpc_client::{ClientBuilder, ReqwestClient};
use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::prelude::*;

pub fn http_client(url: Url) -> ReqwestClient {
    ClientBuilder::default().http(url)
}

/// Lightweight view of a block, carrying only the fields the engine reads.
/// Transactions are hashes (blocks are fetched with `full = false`).
#[derive(Debug, Clone)]
pub struct ChainBlock {
    pub number: u64,
    pub hash: B256,
    pub timestamp: u64,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub transactions: Vec<B256>,
}

/// Lightweight view of a transaction receipt.
#[derive(Debug, Clone)]
pub struct ReceiptView {
    pub status: bool,
    pub gas_used: u64,
    pub effective_gas_price: u128,
    pub block_number: Option<u64>,
}

/// Typed facade over the JSON-RPC endpoint.
///
/// Kept object-safe so components share it as `Arc<dyn EthRpc>` and tests
/// swap in a scripted mock. The outer `Result` of the batch call is a
/// whole-batch transport failure (retryable); the inner per-element results
/// are node verdicts (terminal).
#[async_trait]
pub trait EthRpc: Send + Sync {
    async fn chain_id(&self) -> Result<u64>;
    async fn block_number(&self) -> Result<u64>;
    async fn block_by_number(&self, number: u64) -> Result<Option<ChainBlock>>;
    async fn transaction_receipt(&self, hash: B256) -> Result<Option<ReceiptView>>;
    async fn pending_nonce(&self, address: Address) -> Result<u64>;
    async fn balance(&self, address: Address) -> Result<U256>;
    async fn gas_price(&self) -> Result<u128>;
    async fn max_priority_fee(&self) -> Result<u128>;
    async fn send_raw_transaction(&self, raw: &Bytes) -> Result<B256>;
    async fn batch_send_raw_transactions(&self, raws: &[Bytes]) -> Result<Vec<Result<B256>>>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBlock {
    number: U64,
    hash: B256,
    timestamp: U64,
    gas_limit: U64,
    gas_used: U64,
    #[serde(default)]
    transactions: Vec<B256>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    status: Option<U64>,
    gas_used: U64,
    #[serde(default)]
    effective_gas_price: Option<U128>,
    block_number: Option<U64>,
}

#[async_trait]
impl EthRpc for ReqwestClient {
    async fn chain_id(&self) -> Result<u64> {
        let id: U64 = self
            .request_noparams("eth_chainId")
            .await
            .map_err(|e| TxGenError::Transport(e.to_string()))?;
        Ok(id.to())
    }

    async fn block_number(&self) -> Result<u64> {
        let number: U64 = self
            .request_noparams("eth_blockNumber")
            .await
            .map_err(|e| TxGenError::Transport(e.to_string()))?;
        Ok(number.to())
    }

    async fn block_by_number(&self, number: u64) -> Result<Option<ChainBlock>> {
        let block: Option<RawBlock> = self
            .request("eth_getBlockByNumber", (format!("0x{number:x}"), false))
            .await
            .map_err(|e| TxGenError::Transport(e.to_string()))?;

        Ok(block.map(|b| ChainBlock {
            number: b.number.to(),
            hash: b.hash,
            timestamp: b.timestamp.to(),
            gas_limit: b.gas_limit.to(),
            gas_used: b.gas_used.to(),
            transactions: b.transactions,
        }))
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<ReceiptView>> {
        let receipt: Option<RawReceipt> = self
            .request("eth_getTransactionReceipt", (hash,))
            .await
            .map_err(|e| TxGenError::Transport(e.to_string()))?;

        Ok(receipt.map(|r| ReceiptView {
            // Missing status (pre-Byzantium nodes) is treated as success
            status: r.status.map(|s| s == U64::from(1)).unwrap_or(true),
            gas_used: r.gas_used.to(),
            effective_gas_price: r.effective_gas_price.map(|p| p.to()).unwrap_or_default(),
            block_number: r.block_number.map(|n| n.to()),
        }))
    }

    async fn pending_nonce(&self, address: Address) -> Result<u64> {
        let nonce: U64 = self
            .request("eth_getTransactionCount", (address, "pending"))
            .await
            .map_err(|e| TxGenError::Transport(e.to_string()))?;
        Ok(nonce.to())
    }

    async fn balance(&self, address: Address) -> Result<U256> {
        self.request("eth_getBalance", (address, "latest"))
            .await
            .map_err(|e| TxGenError::Transport(e.to_string()).into())
    }

    async fn gas_price(&self) -> Result<u128> {
        let price: U128 = self
            .request_noparams("eth_gasPrice")
            .await
            .map_err(|e| TxGenError::Transport(e.to_string()))?;
        Ok(price.to())
    }

    async fn max_priority_fee(&self) -> Result<u128> {
        let tip: U128 = self
            .request_noparams("eth_maxPriorityFeePerGas")
            .await
            .map_err(|e| TxGenError::Transport(e.to_string()))?;
        Ok(tip.to())
    }

    async fn send_raw_transaction(&self, raw: &Bytes) -> Result<B256> {
        self.request("eth_sendRawTransaction", (raw.clone(),))
            .await
            .map_err(|e| TxGenError::Rejected(e.to_string()).into())
    }

    async fn batch_send_raw_transactions(&self, raws: &[Bytes]) -> Result<Vec<Result<B256>>> {
        let mut batch = self.new_batch();
        let mut waiters = Vec::with_capacity(raws.len());
        for raw in raws {
            let waiter = batch
                .add_call::<_, B256>("eth_sendRawTransaction", &(raw.clone(),))
                .map_err(|e| TxGenError::Transport(e.to_string()))?;
            waiters.push(waiter);
        }

        batch
            .send()
            .await
            .map_err(|e| TxGenError::Transport(e.to_string()))?;

        let mut results = Vec::with_capacity(waiters.len());
        for waiter in waiters {
            results.push(
                waiter
                    .await
                    .map_err(|e| TxGenError::Rejected(e.to_string()).into()),
            );
        }
        Ok(results)
    }
}
