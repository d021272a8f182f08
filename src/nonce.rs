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

use std::collections::HashMap;

use tokio::sync::Mutex;

use crate::prelude::*;

/// Per-address monotonically increasing nonce allocator.
///
/// The first allocation for an address seeds the counter from
/// `eth_getTransactionCount(addr, "pending")`. Every operation both reads
/// and increments; allocated nonces are never rewound, even when a later
/// send fails (a gap stalls only that address, and the collector surfaces
/// the stalled transactions as Timeout).
pub struct NonceBook {
    client: Arc<dyn EthRpc>,
    book: Mutex<HashMap<Address, u64>>,
}

impl NonceBook {
    pub fn new(client: Arc<dyn EthRpc>) -> Self {
        Self {
            client,
            book: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the next nonce for `address` and advances the counter.
    pub async fn allocate(&self, address: Address) -> Result<u64> {
        self.allocate_many(address, 1).await
    }

    /// Reserves `n` contiguous nonces for `address`, returning the first.
    /// A failed seed leaves no entry behind, so the next caller retries it.
    pub async fn allocate_many(&self, address: Address, n: u64) -> Result<u64> {
        let mut book = self.book.lock().await;
        let next = match book.get(&address) {
            Some(&next) => next,
            None => self
                .client
                .pending_nonce(address)
                .await
                .wrap_err_with(|| format!("Failed to seed nonce for {address}"))?,
        };
        book.insert(address, next + n);
        Ok(next)
    }
}
