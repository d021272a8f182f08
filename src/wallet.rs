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

use alloy_primitives::{hex, keccak256};
use alloy_signer_local::PrivateKeySigner;

use crate::prelude::*;

/// Master credential plus the deterministic sub-account fan-out derived
/// from it. Sub-key `i` is `keccak256(master_key_bytes || "subaccount-{i}")`,
/// so the same master key always yields the same account set.
pub struct Wallet {
    master: PrivateKeySigner,
    subs: Vec<PrivateKeySigner>,
}

impl Wallet {
    pub fn from_master_key(master_key: &str, sub_accounts: u64) -> Result<Self> {
        let master = parse_key(master_key)?;
        let master_bytes = master.to_bytes();

        let mut subs = Vec::with_capacity(sub_accounts as usize);
        for i in 0..sub_accounts {
            let mut seed = Vec::with_capacity(32 + 16);
            seed.extend_from_slice(master_bytes.as_slice());
            seed.extend_from_slice(format!("subaccount-{i}").as_bytes());
            let sub_key = keccak256(&seed);
            let sub = PrivateKeySigner::from_bytes(&sub_key)
                .wrap_err_with(|| format!("Failed to derive sub-account {i}"))?;
            subs.push(sub);
        }

        Ok(Self { master, subs })
    }

    pub fn master(&self) -> &PrivateKeySigner {
        &self.master
    }

    pub fn master_address(&self) -> Address {
        self.master.address()
    }

    pub fn sub_keys(&self) -> &[PrivateKeySigner] {
        &self.subs
    }

    pub fn sub_addresses(&self) -> Vec<Address> {
        self.subs.iter().map(|k| k.address()).collect()
    }
}

/// Parses a 0x-prefixed (or bare) 64-character hex private key.
pub fn parse_key(key: &str) -> Result<PrivateKeySigner> {
    let hex_key = key.strip_prefix("0x").unwrap_or(key);
    let bytes: [u8; 32] = hex::decode(hex_key)
        .wrap_err("invalid private key hex")?
        .try_into()
        .map_err(|_| eyre!("private key must be exactly 32 bytes"))?;
    PrivateKeySigner::from_bytes(&bytes.into()).wrap_err("invalid private key")
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    const MASTER: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn derivation_is_deterministic() {
        let a = Wallet::from_master_key(MASTER, 5).unwrap();
        let b = Wallet::from_master_key(MASTER, 5).unwrap();
        assert_eq!(a.sub_addresses(), b.sub_addresses());
        assert_eq!(a.master_address(), b.master_address());
    }

    #[test]
    fn sub_accounts_are_distinct() {
        let wallet = Wallet::from_master_key(MASTER, 20).unwrap();
        let mut seen: HashSet<Address> = wallet.sub_addresses().into_iter().collect();
        seen.insert(wallet.master_address());
        assert_eq!(seen.len(), 21);
    }

    #[test]
    fn longer_fanout_extends_shorter() {
        let small = Wallet::from_master_key(MASTER, 3).unwrap();
        let large = Wallet::from_master_key(MASTER, 6).unwrap();
        assert_eq!(small.sub_addresses(), large.sub_addresses()[..3]);
    }

    #[test]
    fn parse_key_accepts_bare_hex() {
        let with_prefix = parse_key(MASTER).unwrap();
        let bare = parse_key(&MASTER[2..]).unwrap();
        assert_eq!(with_prefix.address(), bare.address());
    }

    #[test]
    fn parse_key_rejects_garbage() {
        assert!(parse_key("0x1234").is_err());
        assert!(parse_key("not a key").is_err());
    }
}
