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

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::prelude::*;

/// Workload mode. Each mode maps to a transaction builder, except the two
/// that short-circuit the pipeline to a dedicated executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Transfer,
    FeeDelegation,
    ContractDeploy,
    ContractCall,
    Erc20Transfer,
    Erc721Mint,
    LongSender,
    AnalyzeBlocks,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Mode::Transfer => "TRANSFER",
            Mode::FeeDelegation => "FEE_DELEGATION",
            Mode::ContractDeploy => "CONTRACT_DEPLOY",
            Mode::ContractCall => "CONTRACT_CALL",
            Mode::Erc20Transfer => "ERC20_TRANSFER",
            Mode::Erc721Mint => "ERC721_MINT",
            Mode::LongSender => "LONG_SENDER",
            Mode::AnalyzeBlocks => "ANALYZE_BLOCKS",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub rpc_url: String,

    /// Funded private key the sub-account fan-out is derived from
    pub master_key: String,

    pub mode: Mode,

    /// Number of sub-accounts to derive and send from
    pub sub_accounts: u64,

    /// Total number of transactions to build across all sub-accounts
    pub transactions: u64,

    /// Transactions per batched eth_sendRawTransaction call
    pub batch_size: u64,

    /// Chain id. 0 means discover via eth_chainId at Init
    pub chain_id: u64,

    pub gas_limit: u64,

    /// When set, used as both tip cap and fee cap (and as the legacy gas
    /// price). When unset the gas oracle queries the node.
    pub gas_price: Option<u128>,

    /// Transfer value in wei, decimal string
    pub value: String,

    /// How long the collector waits for receipts before marking Timeout
    pub confirm_timeout_secs: u64,

    pub skip_distribution: bool,
    pub skip_collection: bool,

    /// Use the rate-limited streaming sender instead of batch sends
    pub streaming: bool,

    /// Streaming rate in tx/s
    pub streaming_rate: u32,

    /// Stop after Build; nothing is submitted
    pub dry_run: bool,

    pub export_report: bool,
    pub output_dir: String,

    pub metrics_enabled: bool,
    pub metrics_port: u16,

    /// Writes `DEBUG` logs to ./debug.log
    pub debug_log_file: bool,

    /// Writes `TRACE` logs to ./trace.log
    pub trace_log_file: bool,

    /// Fee payer private key, required for fee_delegation mode
    pub fee_payer_key: Option<String>,

    /// Target contract for contract_call / erc20_transfer / erc721_mint
    pub contract: Option<String>,

    /// Canonical method signature for contract_call, e.g. "set(uint256)"
    pub method: Option<String>,

    /// ABI-packed call arguments. Requires an ABI; rejected otherwise
    pub args: Option<String>,

    pub long_sender: LongSenderOptions,
    pub analyze: AnalyzeOptions,
    pub erc721: Erc721Options,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LongSenderOptions {
    /// Total run duration in seconds
    pub duration_secs: u64,
    /// Target transactions per second
    pub tps: u32,
    /// Number of concurrent sender workers
    pub workers: usize,
}

impl Default for LongSenderOptions {
    fn default() -> Self {
        Self {
            duration_secs: 60,
            tps: 100,
            workers: 10,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnalyzeOptions {
    pub start_block: Option<u64>,
    pub end_block: Option<u64>,
    /// Analyze the last N blocks instead of an explicit range
    pub block_range: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Erc721Options {
    pub name: String,
    pub symbol: String,
    /// Base URI; each mint appends a monotonically increasing token id
    pub token_uri: String,
}

impl Default for Erc721Options {
    fn default() -> Self {
        Self {
            name: "TxGenNFT".to_string(),
            symbol: "TXG".to_string(),
            token_uri: "https://stablenet.example/nft/".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc_url: "http://localhost:8545".to_string(),
            master_key: String::new(),
            mode: Mode::Transfer,
            sub_accounts: 10,
            transactions: 100,
            batch_size: 100,
            chain_id: 0,
            gas_limit: 21_000,
            gas_price: None,
            value: "1".to_string(),
            confirm_timeout_secs: 300,
            skip_distribution: false,
            skip_collection: false,
            streaming: false,
            streaming_rate: 1000,
            dry_run: false,
            export_report: true,
            output_dir: "./reports".to_string(),
            metrics_enabled: false,
            metrics_port: 9090,
            debug_log_file: false,
            trace_log_file: false,
            fee_payer_key: None,
            contract: None,
            method: None,
            args: None,
            long_sender: LongSenderOptions::default(),
            analyze: AnalyzeOptions::default(),
            erc721: Erc721Options::default(),
        }
    }
}

impl Config {
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read config file: {}", path.display()))?;
        if path.extension().unwrap_or_default() == "json" {
            serde_json::from_str(&content)
                .wrap_err_with(|| format!("Failed to parse JSON config: {}", path.display()))
        } else {
            toml::from_str(&content)
                .wrap_err_with(|| format!("Failed to parse TOML config: {}", path.display()))
        }
    }

    pub fn rpc_url(&self) -> Result<Url> {
        let url: Url = self
            .rpc_url
            .parse()
            .wrap_err_with(|| format!("Failed to parse RPC URL: {}", self.rpc_url))?;
        match url.scheme() {
            "http" | "https" | "ws" | "wss" => Ok(url),
            other => bail!("unsupported RPC URL scheme: {other}"),
        }
    }

    pub fn value(&self) -> Result<U256> {
        U256::from_str(&self.value)
            .wrap_err_with(|| format!("Failed to parse transfer value: {}", self.value))
    }

    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_secs(self.confirm_timeout_secs)
    }

    /// Validates the mode-dependent requirements. Fatal at Init.
    pub fn validate(&self) -> Result<()> {
        self.rpc_url()
            .map_err(|e| TxGenError::Config(format!("{e:#}")))?;

        if self.mode != Mode::AnalyzeBlocks {
            if self.master_key.is_empty() {
                bail!(TxGenError::Config("master-key is required".into()));
            }
            if !is_hex_key(&self.master_key) {
                bail!(TxGenError::Config(
                    "master-key must be a 0x-prefixed 64-character hex string".into()
                ));
            }
            if self.sub_accounts == 0 {
                bail!(TxGenError::Config("sub-accounts must be greater than 0".into()));
            }
            if self.transactions == 0 {
                bail!(TxGenError::Config("transactions must be greater than 0".into()));
            }
            if self.batch_size == 0 {
                bail!(TxGenError::Config("batch-size must be greater than 0".into()));
            }
            if self.gas_limit == 0 {
                bail!(TxGenError::Config("gas-limit must be greater than 0".into()));
            }
            self.value()?;
        }

        match self.mode {
            Mode::FeeDelegation => {
                let key = self.fee_payer_key.as_deref().unwrap_or_default();
                if key.is_empty() {
                    bail!(TxGenError::Config(
                        "fee-payer-key is required for fee_delegation mode".into()
                    ));
                }
                if !is_hex_key(key) {
                    bail!(TxGenError::Config(
                        "fee-payer-key must be a 0x-prefixed 64-character hex string".into()
                    ));
                }
            }
            Mode::ContractCall | Mode::Erc20Transfer => {
                let contract = self.contract.as_deref().unwrap_or_default();
                if contract.is_empty() {
                    bail!(TxGenError::Config(format!(
                        "contract address is required for {} mode",
                        self.mode
                    )));
                }
                if Address::from_str(contract).is_err() {
                    bail!(TxGenError::Config(
                        "contract must be a 0x-prefixed 40-character hex address".into()
                    ));
                }
                if self.mode == Mode::ContractCall
                    && self.method.as_deref().unwrap_or_default().is_empty()
                {
                    bail!(TxGenError::Config(
                        "method is required for contract_call mode".into()
                    ));
                }
            }
            Mode::AnalyzeBlocks => {
                if let (Some(start), Some(end)) =
                    (self.analyze.start_block, self.analyze.end_block)
                {
                    if start > end {
                        bail!(TxGenError::Config(
                            "start-block must be less than or equal to end-block".into()
                        ));
                    }
                }
            }
            _ => {}
        }

        Ok(())
    }
}

pub(crate) fn is_hex_key(s: &str) -> bool {
    let Some(hex) = s.strip_prefix("0x") else {
        return false;
    };
    hex.len() == 64 && hex.bytes().all(|b| b.is_ascii_hexdigit())
}
