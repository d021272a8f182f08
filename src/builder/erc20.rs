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

use alloy_consensus::TxEip1559;
use alloy_primitives::TxKind;
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_macro::sol;
use alloy_sol_types::SolCall;

use super::{interleave, sign_tx, BuilderConfig, SignedTx};
use crate::prelude::*;

const ERC20_TRANSFER_GAS: u64 = 65_000;

sol! {
    function transfer(address to, uint256 amount) returns (bool);
}

/// ERC-20 `transfer(address,uint256)` calls against a deployed token.
/// Value is always zero; tokens move in calldata. Self-transfer unless a
/// recipient is set.
pub struct Erc20TransferBuilder {
    pub(crate) config: BuilderConfig,
    pub(crate) token: Address,
    pub(crate) recipient: Option<Address>,
    pub(crate) amount: U256,
}

impl Erc20TransferBuilder {
    pub fn build(
        &self,
        keys: &[PrivateKeySigner],
        nonces: &[u64],
        count: usize,
    ) -> Result<Vec<SignedTx>> {
        let gas_limit = if self.config.gas_limit == 0 {
            ERC20_TRANSFER_GAS
        } else {
            self.config.gas_limit
        };

        interleave(keys, nonces, count, |_, key, nonce, index| {
            let from = key.address();
            let to = self.recipient.unwrap_or(from);
            let calldata = transferCall {
                to,
                amount: self.amount,
            }
            .abi_encode();

            let tx = TxEip1559 {
                chain_id: self.config.chain_id,
                nonce,
                gas_limit,
                max_fee_per_gas: self.config.gas.fee_cap,
                max_priority_fee_per_gas: self.config.gas.tip_cap,
                to: TxKind::Call(self.token),
                value: U256::ZERO,
                access_list: Default::default(),
                input: calldata.into(),
            };
            let signed = sign_tx(tx, key, index)?;
            Ok(SignedTx::from_signed(signed, from, nonce, gas_limit))
        })
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::hex;

    use super::*;
    use crate::{gas::GasSettings, testutil::test_keys};

    #[test]
    fn calldata_layout_matches_the_selector_and_padding() {
        let to = Address::repeat_byte(0xab);
        let data = transferCall {
            to,
            amount: U256::from(5),
        }
        .abi_encode();

        assert_eq!(&data[..4], hex!("a9059cbb"));
        // address left-padded into the first word
        assert_eq!(&data[4..16], [0u8; 12]);
        assert_eq!(&data[16..36], to.as_slice());
        // amount left-padded into the second word
        assert_eq!(data[67], 5);
        assert_eq!(data.len(), 4 + 32 + 32);
    }

    #[test]
    fn builds_zero_value_calls_against_the_token() {
        let keys = test_keys(2);
        let builder = Erc20TransferBuilder {
            config: BuilderConfig {
                chain_id: 1337,
                gas_limit: 0,
                gas: GasSettings {
                    tip_cap: 1,
                    fee_cap: 2,
                },
                value: U256::ZERO,
            },
            token: Address::repeat_byte(0xcc),
            recipient: None,
            amount: U256::from(1),
        };
        let txs = builder.build(&keys, &[0, 0], 4).unwrap();
        assert_eq!(txs.len(), 4);
        for tx in txs {
            assert_eq!(tx.gas_limit, 65_000);
        }
    }
}
