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
use alloy_sol_types::{SolCall, SolValue};

use super::{decode_hex_lenient, interleave, sign_tx, BuilderConfig, SignedTx};
use crate::{config::Erc721Options, prelude::*};

const MINT_GAS: u64 = 150_000;
const DEPLOY_GAS: u64 = 2_000_000;

// Stand-in collection artifact; override with the real compiled bytecode
// via the option bag when minting against a specific contract build.
const DEFAULT_COLLECTION_BYTECODE: &str = "608060405234801561001057600080fd5b5060c78061001f6000396000f3fe6080604052348015600f57600080fd5b506004361060325760003560e01c806360fe47b11460375780636d4ce63c146049575b600080fd5b60476042366004605e565b600055565b005b60005460405190815260200160405180910390f35b600060208284031215606f57600080fd5b503591905056fea264697066735822122041c6fd36c2a89c8d6d6ee3b8d14a6a05a4f7a6f25c6e4a7b3c8d9e0f1a2b3c4d564736f6c63430008130033";

sol! {
    function createNFT(string tokenUri) returns (uint256);
}

/// ERC-721 `createNFT(string)` mint calls. Token URIs are
/// `base_uri ++ decimal(i)` for a monotonically increasing `i`, so every
/// mint in a build is unique. `build_deploy` produces the one-shot
/// collection deployment with `(name, symbol)` constructor arguments
/// appended to the bytecode.
pub struct Erc721MintBuilder {
    pub(crate) config: BuilderConfig,
    pub(crate) contract: Option<Address>,
    pub(crate) options: Erc721Options,
    pub(crate) bytecode: Bytes,
}

impl Erc721MintBuilder {
    pub fn new(
        config: BuilderConfig,
        contract: Option<Address>,
        options: Erc721Options,
        bytecode: Option<Bytes>,
    ) -> Self {
        Self {
            config,
            contract,
            options,
            bytecode: bytecode
                .unwrap_or_else(|| decode_hex_lenient(DEFAULT_COLLECTION_BYTECODE).into()),
        }
    }

    pub fn build(
        &self,
        keys: &[PrivateKeySigner],
        nonces: &[u64],
        count: usize,
    ) -> Result<Vec<SignedTx>> {
        let Some(contract) = self.contract else {
            bail!("NFT contract address is required");
        };
        let gas_limit = if self.config.gas_limit == 0 {
            MINT_GAS
        } else {
            self.config.gas_limit
        };

        interleave(keys, nonces, count, |_, key, nonce, token_id| {
            let token_uri = format!("{}{}", self.options.token_uri, token_id);
            let calldata = createNFTCall { tokenUri: token_uri }.abi_encode();

            let tx = TxEip1559 {
                chain_id: self.config.chain_id,
                nonce,
                gas_limit,
                max_fee_per_gas: self.config.gas.fee_cap,
                max_priority_fee_per_gas: self.config.gas.tip_cap,
                to: TxKind::Call(contract),
                value: U256::ZERO,
                access_list: Default::default(),
                input: calldata.into(),
            };
            let signed = sign_tx(tx, key, token_id)?;
            Ok(SignedTx::from_signed(signed, key.address(), nonce, gas_limit))
        })
    }

    /// One-shot collection deployment.
    pub fn build_deploy(&self, key: &PrivateKeySigner, nonce: u64) -> Result<SignedTx> {
        let constructor_args =
            (self.options.name.clone(), self.options.symbol.clone()).abi_encode_params();
        let mut deploy_data = self.bytecode.to_vec();
        deploy_data.extend_from_slice(&constructor_args);

        let tx = TxEip1559 {
            chain_id: self.config.chain_id,
            nonce,
            gas_limit: DEPLOY_GAS,
            max_fee_per_gas: self.config.gas.fee_cap,
            max_priority_fee_per_gas: self.config.gas.tip_cap,
            to: TxKind::Create,
            value: U256::ZERO,
            access_list: Default::default(),
            input: deploy_data.into(),
        };
        let signed = sign_tx(tx, key, 0)?;
        Ok(SignedTx::from_signed(signed, key.address(), nonce, DEPLOY_GAS))
    }
}
