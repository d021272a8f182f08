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

use alloy_consensus::TxLegacy;
use alloy_primitives::TxKind;
use alloy_signer_local::PrivateKeySigner;

use super::{interleave, sign_tx, BuilderConfig, SignedTx};
use crate::prelude::*;

const TRANSFER_GAS: u64 = 21_000;

/// Native coin transfers as legacy (type 0x00) transactions signed with the
/// EIP-155 scheme. Self-transfer unless a recipient is set; the resolved
/// `fee_cap` doubles as the legacy gas price.
pub struct TransferBuilder {
    pub(crate) config: BuilderConfig,
    pub(crate) recipient: Option<Address>,
}

impl TransferBuilder {
    pub fn build(
        &self,
        keys: &[PrivateKeySigner],
        nonces: &[u64],
        count: usize,
    ) -> Result<Vec<SignedTx>> {
        let gas_limit = self.gas_limit();
        interleave(keys, nonces, count, |_, key, nonce, index| {
            let from = key.address();
            let to = self.recipient.unwrap_or(from);
            let tx = TxLegacy {
                chain_id: Some(self.config.chain_id),
                nonce,
                gas_price: self.config.gas.fee_cap,
                gas_limit,
                to: TxKind::Call(to),
                value: self.config.value,
                input: Bytes::new(),
            };
            let signed = sign_tx(tx, key, index)?;
            Ok(SignedTx::from_signed(signed, from, nonce, gas_limit))
        })
    }

    /// One-off transfer of `value` to `to`, used by the distributor's
    /// funding transactions.
    pub fn build_single(
        &self,
        key: &PrivateKeySigner,
        nonce: u64,
        to: Address,
        value: U256,
    ) -> Result<SignedTx> {
        let gas_limit = self.gas_limit();
        let tx = TxLegacy {
            chain_id: Some(self.config.chain_id),
            nonce,
            gas_price: self.config.gas.fee_cap,
            gas_limit,
            to: TxKind::Call(to),
            value,
            input: Bytes::new(),
        };
        let signed = sign_tx(tx, key, 0)?;
        Ok(SignedTx::from_signed(signed, key.address(), nonce, gas_limit))
    }

    fn gas_limit(&self) -> u64 {
        if self.config.gas_limit == 0 {
            TRANSFER_GAS
        } else {
            self.config.gas_limit
        }
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::keccak256;

    use super::*;
    use crate::{gas::GasSettings, testutil::test_keys};

    fn builder(recipient: Option<Address>) -> TransferBuilder {
        TransferBuilder {
            config: BuilderConfig {
                chain_id: 1337,
                gas_limit: 0,
                gas: GasSettings {
                    tip_cap: 1_000_000_000,
                    fee_cap: 2_000_000_000,
                },
                value: U256::from(1),
            },
            recipient,
        }
    }

    #[test]
    fn defaults_to_self_transfer_at_21000_gas() {
        let keys = test_keys(1);
        let txs = builder(None).build(&keys, &[0], 3).unwrap();
        for tx in &txs {
            assert_eq!(tx.from, keys[0].address());
            assert_eq!(tx.gas_limit, 21_000);
            assert_eq!(tx.hash, keccak256(&tx.raw));
        }
    }

    #[test]
    fn build_single_transfers_requested_value() {
        let keys = test_keys(1);
        let recipient = Address::repeat_byte(0x99);
        let tx = builder(None)
            .build_single(&keys[0], 4, recipient, U256::from(12_345))
            .unwrap();
        assert_eq!(tx.nonce, 4);
        assert_eq!(tx.hash, keccak256(&tx.raw));
    }

    #[test]
    fn raw_bytes_differ_per_nonce() {
        let keys = test_keys(1);
        let txs = builder(Some(Address::repeat_byte(0xaa)))
            .build(&keys, &[0], 2)
            .unwrap();
        assert_ne!(txs[0].raw, txs[1].raw);
        assert_ne!(txs[0].hash, txs[1].hash);
    }
}
