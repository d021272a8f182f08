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

use alloy_eips::eip2930::AccessList;
use alloy_primitives::{keccak256, Signature, TxKind};
use alloy_rlp::{Encodable, Header};
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;

use super::{interleave, BuilderConfig, SignedTx};
use crate::prelude::*;

/// StableNet fee-delegation transaction type.
pub const FEE_DELEGATION_TX_TYPE: u8 = 0x16;
const EIP1559_TX_TYPE: u8 = 0x02;
const FEE_DELEGATION_GAS: u64 = 21_000;

/// Unsigned payload of a fee-delegated transaction. The nine fields match
/// the EIP-1559 payload; both signature hashes and the wire bytes are
/// derived from it.
#[derive(Debug, Clone)]
pub struct FeeDelegatedInput {
    pub chain_id: u64,
    pub nonce: u64,
    pub tip_cap: u128,
    pub fee_cap: u128,
    pub gas_limit: u64,
    pub to: TxKind,
    pub value: U256,
    pub data: Bytes,
    pub access_list: AccessList,
}

impl FeeDelegatedInput {
    fn encode_payload(&self, out: &mut Vec<u8>) {
        self.chain_id.encode(out);
        self.nonce.encode(out);
        self.tip_cap.encode(out);
        self.fee_cap.encode(out);
        self.gas_limit.encode(out);
        self.to.encode(out);
        self.value.encode(out);
        self.data.encode(out);
        self.access_list.encode(out);
    }
}

/// A fully signed fee-delegated transaction with the intermediate hashes
/// and signatures exposed for verification.
#[derive(Debug, Clone)]
pub struct FeeDelegated {
    pub raw: Bytes,
    pub hash: B256,
    pub sender_hash: B256,
    pub sender_signature: Signature,
    pub fee_payer_hash: B256,
    pub fee_payer_signature: Signature,
}

/// Dual-signs a fee-delegated transaction.
///
/// Step A: `h_s = keccak256(0x02 || rlp(payload9))`, signed by the sender.
/// Step B: `h_f = keccak256(0x16 || rlp([payload12, fee_payer]))`, signed by
/// the fee payer, where `payload12` is the nine fields with the sender's
/// `(v, r, s)` appended.
/// Wire bytes: `0x16 || rlp([payload12, fee_payer, v_f, r_f, s_f])`.
pub fn sign_fee_delegated(
    sender: &PrivateKeySigner,
    fee_payer: &PrivateKeySigner,
    input: &FeeDelegatedInput,
) -> Result<FeeDelegated> {
    let fee_payer_address = fee_payer.address();

    let mut payload = Vec::new();
    input.encode_payload(&mut payload);

    let mut preimage = vec![EIP1559_TX_TYPE];
    encode_list(&payload, &mut preimage);
    let sender_hash = keccak256(&preimage);

    let sender_signature = sender
        .sign_hash_sync(&sender_hash)
        .wrap_err("failed to sign sender payload")?;

    // payload12: the nine fields plus the sender's recovery id, r and s
    let mut signed_payload = payload;
    encode_signature(&sender_signature, &mut signed_payload);

    let mut envelope = Vec::new();
    encode_list(&signed_payload, &mut envelope);
    fee_payer_address.encode(&mut envelope);

    let mut preimage = vec![FEE_DELEGATION_TX_TYPE];
    encode_list(&envelope, &mut preimage);
    let fee_payer_hash = keccak256(&preimage);

    let fee_payer_signature = fee_payer
        .sign_hash_sync(&fee_payer_hash)
        .wrap_err("failed to sign fee payer payload")?;

    // outer list arity 5: [payload12, fee_payer, v_f, r_f, s_f]
    let mut outer = Vec::new();
    encode_list(&signed_payload, &mut outer);
    fee_payer_address.encode(&mut outer);
    encode_signature(&fee_payer_signature, &mut outer);

    let mut raw = vec![FEE_DELEGATION_TX_TYPE];
    encode_list(&outer, &mut raw);
    let hash = keccak256(&raw);

    Ok(FeeDelegated {
        raw: raw.into(),
        hash,
        sender_hash,
        sender_signature,
        fee_payer_hash,
        fee_payer_signature,
    })
}

fn encode_list(payload: &[u8], out: &mut Vec<u8>) {
    Header {
        list: true,
        payload_length: payload.len(),
    }
    .encode(out);
    out.extend_from_slice(payload);
}

fn encode_signature(signature: &Signature, out: &mut Vec<u8>) {
    // recovery id as a minimally encoded integer (0 or 1)
    (signature.v() as u8).encode(out);
    signature.r().encode(out);
    signature.s().encode(out);
}

/// Fee-delegated value transfers: the sender signs the transfer, the fee
/// payer cosigns and carries the gas. Self-transfer unless a recipient is
/// set.
pub struct FeeDelegationBuilder {
    pub(crate) config: BuilderConfig,
    pub(crate) fee_payer: PrivateKeySigner,
    pub(crate) recipient: Option<Address>,
}

impl FeeDelegationBuilder {
    pub fn build(
        &self,
        keys: &[PrivateKeySigner],
        nonces: &[u64],
        count: usize,
    ) -> Result<Vec<SignedTx>> {
        let gas_limit = if self.config.gas_limit == 0 {
            FEE_DELEGATION_GAS
        } else {
            self.config.gas_limit
        };

        interleave(keys, nonces, count, |_, key, nonce, index| {
            let from = key.address();
            let to = self.recipient.unwrap_or(from);
            let input = FeeDelegatedInput {
                chain_id: self.config.chain_id,
                nonce,
                tip_cap: self.config.gas.tip_cap,
                fee_cap: self.config.gas.fee_cap,
                gas_limit,
                to: TxKind::Call(to),
                value: self.config.value,
                data: Bytes::new(),
                access_list: AccessList::default(),
            };

            let signed =
                sign_fee_delegated(key, &self.fee_payer, &input).map_err(|e| {
                    TxGenError::Signing {
                        index,
                        reason: format!("{e:#}"),
                    }
                })?;

            Ok(SignedTx {
                raw: signed.raw,
                hash: signed.hash,
                from,
                nonce,
                gas_limit,
                fee_delegated: true,
            })
        })
    }
}
