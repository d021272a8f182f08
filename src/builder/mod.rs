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

use alloy_consensus::{SignableTransaction, Signed, TxEnvelope};
use alloy_eips::eip2718::Encodable2718;
use alloy_primitives::Signature;
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;

use crate::{
    config::{Erc721Options, Mode},
    gas::GasSettings,
    prelude::*,
    wallet,
};

mod contract;
mod erc20;
mod erc721;
mod fee_delegation;
mod transfer;

pub use contract::{ContractCallBuilder, ContractDeployBuilder};
pub use erc20::Erc20TransferBuilder;
pub use erc721::Erc721MintBuilder;
pub use fee_delegation::{sign_fee_delegated, FeeDelegatedInput, FeeDelegationBuilder};
pub use transfer::TransferBuilder;

/// Decodes a hex string the way Go's `common.FromHex` does: an odd-length
/// input is left-padded with a zero nibble instead of rejected.
pub(crate) fn decode_hex_lenient(s: &str) -> Vec<u8> {
    if s.len() % 2 == 1 {
        alloy_primitives::hex::decode(format!("0{s}")).expect("valid hex digits")
    } else {
        alloy_primitives::hex::decode(s).expect("valid hex digits")
    }
}

/// A signed transaction ready for submission. Immutable once built.
#[derive(Debug, Clone)]
pub struct SignedTx {
    pub raw: Bytes,
    pub hash: B256,
    pub from: Address,
    pub nonce: u64,
    pub gas_limit: u64,
    pub fee_delegated: bool,
}

impl SignedTx {
    pub(crate) fn from_signed<T>(
        signed: Signed<T>,
        from: Address,
        nonce: u64,
        gas_limit: u64,
    ) -> Self
    where
        Signed<T>: Into<TxEnvelope>,
    {
        let envelope: TxEnvelope = signed.into();
        let hash = *envelope.tx_hash();
        Self {
            raw: envelope.encoded_2718().into(),
            hash,
            from,
            nonce,
            gas_limit,
            fee_delegated: false,
        }
    }
}

/// Shared build-time configuration. A zero `gas_limit` falls back to the
/// variant's default.
#[derive(Debug, Clone, Copy)]
pub struct BuilderConfig {
    pub chain_id: u64,
    pub gas_limit: u64,
    pub gas: GasSettings,
    pub value: U256,
}

/// Option bag consumed by the factory; which fields matter depends on the
/// mode.
#[derive(Default)]
pub struct BuilderOptions {
    pub recipient: Option<Address>,
    pub fee_payer_key: Option<String>,
    pub contract: Option<Address>,
    pub bytecode: Option<Bytes>,
    pub method: Option<String>,
    pub args: Option<String>,
    pub erc721: Erc721Options,
}

/// Transaction builders as a tagged union; selection happens once in the
/// factory, dispatch is a match.
pub enum TxBuilder {
    Transfer(TransferBuilder),
    ContractDeploy(ContractDeployBuilder),
    ContractCall(ContractCallBuilder),
    Erc20Transfer(Erc20TransferBuilder),
    Erc721Mint(Erc721MintBuilder),
    FeeDelegation(FeeDelegationBuilder),
}

impl TxBuilder {
    pub fn name(&self) -> &'static str {
        match self {
            TxBuilder::Transfer(_) => "TRANSFER",
            TxBuilder::ContractDeploy(_) => "CONTRACT_DEPLOY",
            TxBuilder::ContractCall(_) => "CONTRACT_CALL",
            TxBuilder::Erc20Transfer(_) => "ERC20_TRANSFER",
            TxBuilder::Erc721Mint(_) => "ERC721_MINT",
            TxBuilder::FeeDelegation(_) => "FEE_DELEGATION",
        }
    }

    pub fn estimate_gas(&self) -> u64 {
        match self {
            TxBuilder::Transfer(_) | TxBuilder::FeeDelegation(_) => 21_000,
            TxBuilder::ContractDeploy(_) => 200_000,
            TxBuilder::ContractCall(_) => 100_000,
            TxBuilder::Erc20Transfer(_) => 65_000,
            TxBuilder::Erc721Mint(_) => 150_000,
        }
    }

    /// Builds `count` signed transactions spread across `keys`, starting
    /// each account at its entry in `nonces`.
    pub fn build(
        &self,
        keys: &[PrivateKeySigner],
        nonces: &[u64],
        count: usize,
    ) -> Result<Vec<SignedTx>> {
        match self {
            TxBuilder::Transfer(b) => b.build(keys, nonces, count),
            TxBuilder::ContractDeploy(b) => b.build(keys, nonces, count),
            TxBuilder::ContractCall(b) => b.build(keys, nonces, count),
            TxBuilder::Erc20Transfer(b) => b.build(keys, nonces, count),
            TxBuilder::Erc721Mint(b) => b.build(keys, nonces, count),
            TxBuilder::FeeDelegation(b) => b.build(keys, nonces, count),
        }
    }
}

/// Creates the builder for `mode` from the option bag.
pub fn make_builder(
    mode: Mode,
    config: BuilderConfig,
    options: BuilderOptions,
) -> Result<TxBuilder> {
    Ok(match mode {
        Mode::Transfer => TxBuilder::Transfer(TransferBuilder {
            config,
            recipient: options.recipient,
        }),
        Mode::ContractDeploy => TxBuilder::ContractDeploy(ContractDeployBuilder::new(
            config,
            options.bytecode,
        )),
        Mode::ContractCall => {
            if options.args.as_deref().is_some_and(|a| !a.is_empty()) {
                bail!("contract call arguments require a full ABI; only selector-only methods are supported");
            }
            TxBuilder::ContractCall(ContractCallBuilder {
                config,
                contract: options
                    .contract
                    .context("contract address is required for CONTRACT_CALL mode")?,
                method: options
                    .method
                    .context("method is required for CONTRACT_CALL mode")?,
            })
        }
        Mode::Erc20Transfer => TxBuilder::Erc20Transfer(Erc20TransferBuilder {
            config,
            token: options
                .contract
                .context("token address is required for ERC20_TRANSFER mode")?,
            recipient: options.recipient,
            amount: U256::from(1),
        }),
        Mode::Erc721Mint => TxBuilder::Erc721Mint(Erc721MintBuilder::new(
            config,
            options.contract,
            options.erc721,
            options.bytecode,
        )),
        Mode::FeeDelegation => {
            let key = options
                .fee_payer_key
                .context("fee payer key is required for FEE_DELEGATION mode")?;
            TxBuilder::FeeDelegation(FeeDelegationBuilder {
                config,
                fee_payer: wallet::parse_key(&key)?,
                recipient: options.recipient,
            })
        }
        Mode::LongSender | Mode::AnalyzeBlocks => {
            bail!("mode {mode} does not use a transaction builder")
        }
    })
}

/// Spreads `n_total` transactions across `n_keys` accounts as evenly as
/// possible; the first `n_total % n_keys` accounts receive one extra.
pub fn distribute(n_keys: usize, n_total: usize) -> Vec<usize> {
    if n_keys == 0 {
        return Vec::new();
    }
    let base = n_total / n_keys;
    let remainder = n_total % n_keys;
    (0..n_keys)
        .map(|i| if i < remainder { base + 1 } else { base })
        .collect()
}

/// Emits transactions in interleaved per-account order: round-robin across
/// accounts, each account consuming its nonces contiguously. The closure
/// receives `(account_index, key, nonce, global_index)`.
pub(crate) fn interleave<F>(
    keys: &[PrivateKeySigner],
    nonces: &[u64],
    count: usize,
    mut make: F,
) -> Result<Vec<SignedTx>>
where
    F: FnMut(usize, &PrivateKeySigner, u64, usize) -> Result<SignedTx>,
{
    if keys.is_empty() {
        bail!("no keys provided");
    }
    if keys.len() != nonces.len() {
        bail!(
            "keys and nonces length mismatch: {} vs {}",
            keys.len(),
            nonces.len()
        );
    }

    let mut remaining = distribute(keys.len(), count);
    let mut next_nonce = nonces.to_vec();
    let mut out = Vec::with_capacity(count);

    while out.len() < count {
        for (i, key) in keys.iter().enumerate() {
            if remaining[i] == 0 {
                continue;
            }
            let tx = make(i, key, next_nonce[i], out.len())?;
            next_nonce[i] += 1;
            remaining[i] -= 1;
            out.push(tx);
        }
    }

    Ok(out)
}

/// Signs a typed transaction, mapping failures to the fatal signing error
/// carrying the offending index.
pub(crate) fn sign_tx<T: SignableTransaction<Signature>>(
    tx: T,
    key: &PrivateKeySigner,
    index: usize,
) -> Result<Signed<T>> {
    let signature = key
        .sign_hash_sync(&tx.signature_hash())
        .map_err(|e| TxGenError::Signing {
            index,
            reason: e.to_string(),
        })?;
    Ok(tx.into_signed(signature))
}
