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

use crate::prelude::*;

/// Resolved EIP-1559 fee pair. Legacy builds use `fee_cap` as the single
/// gas-price field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasSettings {
    pub tip_cap: u128,
    pub fee_cap: u128,
}

impl GasSettings {
    /// Invariant: `tip_cap <= fee_cap`; a violating pair clamps the tip down.
    pub fn clamped(tip_cap: u128, fee_cap: u128) -> Self {
        Self {
            tip_cap: tip_cap.min(fee_cap),
            fee_cap,
        }
    }
}

/// Resolves `(tip_cap, fee_cap)` from configuration or node suggestions.
pub struct GasOracle {
    client: Arc<dyn EthRpc>,
    tip_override: Option<u128>,
    fee_override: Option<u128>,
}

impl GasOracle {
    pub fn new(
        client: Arc<dyn EthRpc>,
        tip_override: Option<u128>,
        fee_override: Option<u128>,
    ) -> Self {
        Self {
            client,
            tip_override,
            fee_override,
        }
    }

    /// A single configured gas price pins both caps, the way the
    /// pipeline-level `gas_price` option behaves.
    pub fn fixed(client: Arc<dyn EthRpc>, gas_price: Option<u128>) -> Self {
        Self::new(client, gas_price, gas_price)
    }

    pub async fn resolve(&self) -> Result<GasSettings> {
        let tip_cap = match self.tip_override {
            Some(tip) => tip,
            None => self
                .client
                .max_priority_fee()
                .await
                .wrap_err("Failed to suggest gas tip cap")?,
        };

        let fee_cap = match self.fee_override {
            Some(fee) => fee,
            None => {
                let price = self
                    .client
                    .gas_price()
                    .await
                    .wrap_err("Failed to suggest gas price")?;
                // headroom over the current base fee
                price.saturating_mul(2)
            }
        };

        Ok(GasSettings::clamped(tip_cap, fee_cap))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MockRpc;

    #[tokio::test]
    async fn configured_values_pass_through() {
        let oracle = GasOracle::new(Arc::new(MockRpc::new()), Some(3), Some(9));
        let gas = oracle.resolve().await.unwrap();
        assert_eq!(gas, GasSettings { tip_cap: 3, fee_cap: 9 });
    }

    #[tokio::test]
    async fn suggestions_double_the_gas_price() {
        let mock = MockRpc::new();
        mock.set_gas_price(50, 7);
        let oracle = GasOracle::new(Arc::new(mock), None, None);
        let gas = oracle.resolve().await.unwrap();
        assert_eq!(gas, GasSettings { tip_cap: 7, fee_cap: 100 });
    }

    #[tokio::test]
    async fn tip_is_clamped_to_fee() {
        let oracle = GasOracle::new(Arc::new(MockRpc::new()), Some(100), Some(10));
        let gas = oracle.resolve().await.unwrap();
        assert!(gas.tip_cap <= gas.fee_cap);
        assert_eq!(gas.tip_cap, 10);
    }

    #[tokio::test]
    async fn fixed_pins_both_caps() {
        let oracle = GasOracle::fixed(Arc::new(MockRpc::new()), Some(42));
        let gas = oracle.resolve().await.unwrap();
        assert_eq!(gas, GasSettings { tip_cap: 42, fee_cap: 42 });
    }
}
