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
use alloy_primitives::{keccak256, TxKind};
use alloy_signer_local::PrivateKeySigner;

use super::{decode_hex_lenient, interleave, sign_tx, BuilderConfig, SignedTx};
use crate::prelude::*;

const DEPLOY_GAS: u64 = 200_000;
const CALL_GAS: u64 = 100_000;

/// Minimal storage contract: `set(uint256)` / `get()` over one slot.
const SIMPLE_STORAGE_BYTECODE: &str = "608060405234801561001057600080fd5b5060c78061001f6000396000f3fe6080604052348015600f57600080fd5b506004361060325760003560e01c806360fe47b11460375780636d4ce63c146049575b600080fd5b60476042366004605e565b600055565b005b60005460405190815260200160405180910390f35b600060208284031215606f57600080fd5b503591905056fea264697066735822122041c6fd36c2a89c8d6d6ee3b8d14a6a05a4f7a6f25c6e4a7b3c8d9e0f1a2b3c4d564736f6c63430008130033";

/// EIP-1559 contract creations carrying an overridable bytecode blob.
pub struct ContractDeployBuilder {
    pub(crate) config: BuilderConfig,
    pub(crate) bytecode: Bytes,
}

impl ContractDeployBuilder {
    pub fn new(config: BuilderConfig, bytecode: Option<Bytes>) -> Self {
        Self {
            config,
            bytecode: bytecode.unwrap_or_else(|| decode_hex_lenient(SIMPLE_STORAGE_BYTECODE).into()),
        }
    }

    pub fn build(
        &self,
        keys: &[PrivateKeySigner],
        nonces: &[u64],
        count: usize,
    ) -> Result<Vec<SignedTx>> {
        let gas_limit = if self.config.gas_limit == 0 {
            DEPLOY_GAS
        } else {
            self.config.gas_limit
        };
        interleave(keys, nonces, count, |_, key, nonce, index| {
            let tx = TxEip1559 {
                chain_id: self.config.chain_id,
                nonce,
                gas_limit,
                max_fee_per_gas: self.config.gas.fee_cap,
                max_priority_fee_per_gas: self.config.gas.tip_cap,
                to: TxKind::Create,
                value: U256::ZERO,
                access_list: Default::default(),
                input: self.bytecode.clone(),
            };
            let signed = sign_tx(tx, key, index)?;
            Ok(SignedTx::from_signed(signed, key.address(), nonce, gas_limit))
        })
    }
}

/// EIP-1559 calls of a selector-only method. The selector is the first four
/// bytes of `keccak256(canonical_signature)`; argument packing needs a full
/// ABI, which the factory rejects up front.
pub struct ContractCallBuilder {
    pub(crate) config: BuilderConfig,
    pub(crate) contract: Address,
    pub(crate) method: String,
}

impl ContractCallBuilder {
    pub fn build(
        &self,
        keys: &[PrivateKeySigner],
        nonces: &[u64],
        count: usize,
    ) -> Result<Vec<SignedTx>> {
        let calldata: Bytes = method_selector(&self.method)?.to_vec().into();
        let gas_limit = if self.config.gas_limit == 0 {
            CALL_GAS
        } else {
            self.config.gas_limit
        };

        interleave(keys, nonces, count, |_, key, nonce, index| {
            let tx = TxEip1559 {
                chain_id: self.config.chain_id,
                nonce,
                gas_limit,
                max_fee_per_gas: self.config.gas.fee_cap,
                max_priority_fee_per_gas: self.config.gas.tip_cap,
                to: TxKind::Call(self.contract),
                value: U256::ZERO,
                access_list: Default::default(),
                input: calldata.clone(),
            };
            let signed = sign_tx(tx, key, index)?;
            Ok(SignedTx::from_signed(signed, key.address(), nonce, gas_limit))
        })
    }
}

/// First four bytes of the keccak-256 of the canonical method signature.
pub fn method_selector(signature: &str) -> Result<[u8; 4]> {
    if signature.is_empty() {
        bail!("method signature is required");
    }
    let hash = keccak256(signature.as_bytes());
    Ok([hash[0], hash[1], hash[2], hash[3]])
}

#[cfg(test)]
mod tests {
    use alloy_primitives::hex;

    use super::*;
    use crate::{gas::GasSettings, testutil::test_keys};

    fn config() -> BuilderConfig {
        BuilderConfig {
            chain_id: 1337,
            gas_limit: 0,
            gas: GasSettings {
                tip_cap: 1,
                fee_cap: 2,
            },
            value: U256::ZERO,
        }
    }

    #[test]
    fn selector_matches_known_values() {
        assert_eq!(
            method_selector("transfer(address,uint256)").unwrap(),
            hex!("a9059cbb")
        );
        assert_eq!(
            method_selector("balanceOf(address)").unwrap(),
            hex!("70a08231")
        );
        assert!(method_selector("").is_err());
    }

    #[test]
    fn deploy_uses_default_bytecode_and_gas() {
        let keys = test_keys(1);
        let builder = ContractDeployBuilder::new(config(), None);
        let txs = builder.build(&keys, &[0], 2).unwrap();
        assert_eq!(txs[0].gas_limit, 200_000);
        assert!(!builder.bytecode.is_empty());
    }

    #[test]
    fn deploy_accepts_custom_bytecode() {
        let custom: Bytes = vec![0x60, 0x01].into();
        let builder = ContractDeployBuilder::new(config(), Some(custom.clone()));
        assert_eq!(builder.bytecode, custom);
    }

    #[test]
    fn call_builds_selector_only_calldata() {
        let keys = test_keys(1);
        let builder = ContractCallBuilder {
            config: config(),
            contract: Address::repeat_byte(0xcc),
            method: "get()".to_string(),
        };
        let txs = builder.build(&keys, &[0], 1).unwrap();
        assert_eq!(txs[0].gas_limit, 100_000);
    }
}
