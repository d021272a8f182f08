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

use alloy_signer_local::PrivateKeySigner;

use crate::{
    builder::{BuilderConfig, TransferBuilder},
    gas::GasSettings,
    nonce::NonceBook,
    prelude::*,
};

const FUNDING_TRANSFER_GAS: u64 = 21_000;
const INTER_SEND_DELAY: Duration = Duration::from_millis(10);
const FUNDING_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct DistributorConfig {
    /// Gas each sub-account burns per transaction
    pub gas_per_tx: u64,
    /// Transactions each sub-account will send
    pub txs_per_account: u64,
    /// Gas price for the funding calculation and the funding transfers.
    /// Zero means query the node.
    pub gas_price: u128,
    /// Extra headroom in percent
    pub buffer_percent: u64,
}

impl Default for DistributorConfig {
    fn default() -> Self {
        Self {
            gas_per_tx: 21_000,
            txs_per_account: 10,
            gas_price: 1_000_000_000,
            buffer_percent: 20,
        }
    }
}

impl DistributorConfig {
    /// `gas_per_tx × txs_per_account × gas_price × (1 + buffer/100)`,
    /// integer math with floor division.
    pub fn required_fund(&self) -> U256 {
        let base = U256::from(self.gas_per_tx)
            * U256::from(self.txs_per_account)
            * U256::from(self.gas_price);
        base + base * U256::from(self.buffer_percent) / U256::from(100)
    }
}

#[derive(Debug, Clone)]
pub struct AccountStatus {
    pub address: Address,
    pub balance: U256,
    pub required: U256,
    pub missing: U256,
    pub nonce: u64,
    pub funded: bool,
}

#[derive(Debug, Clone)]
pub struct DistributionResult {
    /// Accounts with at least the required balance, ready for the run
    pub ready: Vec<AccountStatus>,
    /// Accounts the master balance could not cover; surfaced, not an error
    pub unfunded: Vec<AccountStatus>,
    pub total_distributed: U256,
    pub tx_count: usize,
}

/// Equalizes sub-account balances to the required target from a single
/// master account. Master nonces come from the nonce book, so funding and
/// any later master traffic never race.
pub struct Distributor {
    client: Arc<dyn EthRpc>,
    config: DistributorConfig,
    chain_id: u64,
    nonces: Arc<NonceBook>,
}

impl Distributor {
    pub fn new(
        client: Arc<dyn EthRpc>,
        config: DistributorConfig,
        chain_id: u64,
        nonces: Arc<NonceBook>,
    ) -> Self {
        Self {
            client,
            config,
            chain_id,
            nonces,
        }
    }

    pub async fn distribute(
        &self,
        master: &PrivateKeySigner,
        sub_addresses: &[Address],
    ) -> Result<DistributionResult> {
        let required = self.config.required_fund();
        info!(
            required_wei = %required,
            gas_per_tx = self.config.gas_per_tx,
            txs_per_account = self.config.txs_per_account,
            buffer_percent = self.config.buffer_percent,
            "Starting fund distribution"
        );

        let statuses = self.check_balances(sub_addresses, required).await?;

        let (funded, mut unfunded): (Vec<_>, Vec<_>) =
            statuses.into_iter().partition(|s| s.funded);

        if unfunded.is_empty() {
            info!(accounts = funded.len(), "All accounts are already funded");
            return Ok(DistributionResult {
                ready: funded,
                unfunded: Vec::new(),
                total_distributed: U256::ZERO,
                tx_count: 0,
            });
        }

        unfunded.sort_by(|a, b| a.missing.cmp(&b.missing));

        let mut result = self.fund_accounts(master, unfunded).await?;
        let mut ready = funded;
        ready.append(&mut result.ready);
        result.ready = ready;

        Ok(result)
    }

    async fn check_balances(
        &self,
        addresses: &[Address],
        required: U256,
    ) -> Result<Vec<AccountStatus>> {
        debug!(accounts = addresses.len(), "Checking sub-account balances");

        let mut statuses = Vec::with_capacity(addresses.len());
        for &address in addresses {
            let balance = self
                .client
                .balance(address)
                .await
                .wrap_err_with(|| format!("Failed to get balance for {address}"))?;
            let nonce = self
                .client
                .pending_nonce(address)
                .await
                .wrap_err_with(|| format!("Failed to get nonce for {address}"))?;

            let funded = balance >= required;
            statuses.push(AccountStatus {
                address,
                balance,
                required,
                missing: if funded {
                    U256::ZERO
                } else {
                    required - balance
                },
                nonce,
                funded,
            });
        }
        Ok(statuses)
    }

    async fn fund_accounts(
        &self,
        master: &PrivateKeySigner,
        unfunded: Vec<AccountStatus>,
    ) -> Result<DistributionResult> {
        let master_address = master.address();
        let master_balance = self
            .client
            .balance(master_address)
            .await
            .wrap_err("Failed to get master balance")?;

        let gas_price = if self.config.gas_price > 0 {
            self.config.gas_price
        } else {
            self.client
                .gas_price()
                .await
                .wrap_err("Failed to suggest gas price")?
        };
        let transfer_cost = U256::from(FUNDING_TRANSFER_GAS) * U256::from(gas_price);

        // greedy acceptance in ascending-missing order; once one account is
        // unaffordable every later one is too
        let mut remaining = master_balance;
        let mut fundable = Vec::new();
        let mut total_to_distribute = U256::ZERO;
        let mut leftover = Vec::new();

        let mut unfunded = unfunded.into_iter();
        for account in unfunded.by_ref() {
            let cost = account.missing + transfer_cost;
            if remaining < cost {
                leftover.push(account);
                break;
            }
            remaining -= cost;
            total_to_distribute += account.missing;
            fundable.push(account);
        }
        leftover.extend(unfunded);

        if fundable.is_empty() {
            error!(
                master_balance = %master_balance,
                "Master account cannot fund any sub-accounts"
            );
            bail!(TxGenError::InsufficientMasterFunds);
        }

        info!(accounts = fundable.len(), "Funding accounts");

        let transfer = TransferBuilder {
            config: BuilderConfig {
                chain_id: self.chain_id,
                gas_limit: FUNDING_TRANSFER_GAS,
                gas: GasSettings::clamped(gas_price, gas_price),
                value: U256::ZERO,
            },
            recipient: None,
        };

        let mut ready = Vec::with_capacity(fundable.len());
        let mut tx_count = 0;
        for mut account in fundable {
            let nonce = self.nonces.allocate(master_address).await?;
            let tx = transfer.build_single(master, nonce, account.address, account.missing)?;
            self.client
                .send_raw_transaction(&tx.raw)
                .await
                .wrap_err_with(|| {
                    format!("Failed to send funding transfer to {}", account.address)
                })?;

            tx_count += 1;
            account.balance += account.missing;
            account.funded = true;
            ready.push(account);

            // spread sends out to avoid overwhelming the node
            tokio::time::sleep(INTER_SEND_DELAY).await;
        }

        info!(
            funded = ready.len(),
            unfundable = leftover.len(),
            total_distributed = %total_to_distribute,
            "Distribution complete"
        );

        Ok(DistributionResult {
            ready,
            unfunded: leftover,
            total_distributed: total_to_distribute,
            tx_count,
        })
    }

    /// Polls each account's balance until it reaches the required target or
    /// the deadline passes.
    pub async fn wait_for_funding(
        &self,
        accounts: &[AccountStatus],
        timeout: Duration,
    ) -> Result<()> {
        let deadline = Instant::now() + timeout;
        for account in accounts {
            loop {
                if Instant::now() > deadline {
                    bail!(TxGenError::FundingTimeout);
                }
                let balance = self
                    .client
                    .balance(account.address)
                    .await
                    .wrap_err("Failed to check balance while waiting for funding")?;
                if balance >= account.required {
                    break;
                }
                tokio::time::sleep(FUNDING_POLL_INTERVAL).await;
            }
        }
        info!(accounts = accounts.len(), "All funding transfers confirmed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{test_keys, MockRpc};

    const GAS_PRICE: u128 = 1_000_000_000;

    fn config() -> DistributorConfig {
        DistributorConfig {
            gas_per_tx: 21_000,
            txs_per_account: 10,
            gas_price: GAS_PRICE,
            buffer_percent: 20,
        }
    }

    fn distributor(mock: Arc<MockRpc>) -> Distributor {
        let nonces = Arc::new(NonceBook::new(mock.clone()));
        Distributor::new(mock, config(), 1337, nonces)
    }

    #[test]
    fn required_fund_math() {
        let base = U256::from(21_000u64) * U256::from(10u64) * U256::from(GAS_PRICE);
        assert_eq!(config().required_fund(), base + base / U256::from(5));

        let no_buffer = DistributorConfig {
            buffer_percent: 0,
            ..config()
        };
        assert_eq!(no_buffer.required_fund(), base);
    }

    #[tokio::test]
    async fn partial_funding_is_greedy_and_not_an_error() {
        let mock = Arc::new(MockRpc::new());
        let master = &test_keys(1)[0];
        let subs: Vec<Address> = (0..5).map(|i| Address::repeat_byte(0x10 + i)).collect();

        let required = config().required_fund();
        let transfer_cost = U256::from(21_000u64) * U256::from(GAS_PRICE);
        // room for exactly three accounts
        mock.set_balance(
            master.address(),
            required * U256::from(3) + transfer_cost * U256::from(3),
        );

        let result = distributor(mock.clone())
            .distribute(master, &subs)
            .await
            .unwrap();

        assert_eq!(result.ready.len(), 3);
        assert_eq!(result.unfunded.len(), 2);
        assert_eq!(result.tx_count, 3);
        assert_eq!(result.total_distributed, required * U256::from(3));
        assert_eq!(mock.sent().len(), 3);
        for account in &result.ready {
            assert!(account.funded);
            assert!(account.balance >= required);
        }
    }

    #[tokio::test]
    async fn insufficient_master_funds_is_distinct() {
        let mock = Arc::new(MockRpc::new());
        let master = &test_keys(1)[0];
        let subs = [Address::repeat_byte(0x10)];
        mock.set_balance(master.address(), U256::from(1));

        let err = distributor(mock).distribute(master, &subs).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TxGenError>(),
            Some(TxGenError::InsufficientMasterFunds)
        ));
    }

    #[tokio::test]
    async fn already_funded_accounts_send_nothing() {
        let mock = Arc::new(MockRpc::new());
        let master = &test_keys(1)[0];
        let subs: Vec<Address> = (0..4).map(|i| Address::repeat_byte(0x20 + i)).collect();

        let required = config().required_fund();
        for &sub in &subs {
            mock.set_balance(sub, required);
        }

        let result = distributor(mock.clone())
            .distribute(master, &subs)
            .await
            .unwrap();
        assert_eq!(result.ready.len(), 4);
        assert_eq!(result.tx_count, 0);
        assert_eq!(result.total_distributed, U256::ZERO);
        assert!(mock.sent().is_empty());
    }

    #[tokio::test]
    async fn master_nonces_are_allocated_sequentially() {
        let mock = Arc::new(MockRpc::new());
        let master = &test_keys(1)[0];
        mock.set_nonce(master.address(), 7);
        let subs: Vec<Address> = (0..3).map(|i| Address::repeat_byte(0x30 + i)).collect();
        mock.set_balance(master.address(), U256::MAX / U256::from(2));

        let nonces = Arc::new(NonceBook::new(mock.clone()));
        let dist = Distributor::new(mock, config(), 1337, nonces.clone());
        let result = dist.distribute(master, &subs).await.unwrap();
        assert_eq!(result.tx_count, 3);

        // funding consumed nonces 7, 8, 9
        assert_eq!(nonces.allocate(master.address()).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn wait_for_funding_succeeds_when_balances_land() {
        let mock = Arc::new(MockRpc::new());
        let required = config().required_fund();
        let account = AccountStatus {
            address: Address::repeat_byte(0x40),
            balance: required,
            required,
            missing: U256::ZERO,
            nonce: 0,
            funded: true,
        };
        mock.set_balance(account.address, required);

        distributor(mock)
            .wait_for_funding(&[account], Duration::from_secs(1))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn wait_for_funding_times_out() {
        let mock = Arc::new(MockRpc::new());
        let required = config().required_fund();
        let account = AccountStatus {
            address: Address::repeat_byte(0x41),
            balance: U256::ZERO,
            required,
            missing: required,
            nonce: 0,
            funded: false,
        };

        let err = distributor(mock)
            .wait_for_funding(&[account], Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TxGenError>(),
            Some(TxGenError::FundingTimeout)
        ));
    }
}
