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

use clap::{Parser, Subcommand};
use url::Url;

use crate::config::{Config, Mode};

#[derive(Debug, Parser, Clone)]
#[command(name = "stablenet-txgen", about, long_about = None)]
pub struct CliConfig {
    /// Path to a TOML or JSON config file to use instead of the cli args
    #[arg(long, global = true)]
    pub config_file: Option<String>,

    #[arg(long, global = true)]
    pub rpc_url: Option<Url>,

    /// Funded private key the sub-account fan-out is derived from
    #[arg(long, global = true)]
    pub master_key: Option<String>,

    /// Number of sub-accounts to derive and send from
    #[arg(long, global = true)]
    pub sub_accounts: Option<u64>,

    /// Total number of transactions to build across all sub-accounts
    #[arg(long, global = true)]
    pub transactions: Option<u64>,

    /// Transactions per batched eth_sendRawTransaction call
    #[arg(long, global = true)]
    pub batch_size: Option<u64>,

    /// Chain id; discovered via eth_chainId when omitted
    #[arg(long, global = true)]
    pub chain_id: Option<u64>,

    #[arg(long, global = true)]
    pub gas_limit: Option<u64>,

    /// Fixed gas price in wei; the gas oracle queries the node when omitted
    #[arg(long, global = true)]
    pub gas_price: Option<u128>,

    /// Transfer value in wei
    #[arg(long, global = true)]
    pub value: Option<String>,

    /// Receipt confirmation timeout in seconds
    #[arg(long, global = true)]
    pub confirm_timeout_secs: Option<u64>,

    /// Skip the funding distribution stage
    #[arg(long, global = true)]
    pub skip_distribution: bool,

    /// Skip receipt collection (fire and forget)
    #[arg(long, global = true)]
    pub skip_collection: bool,

    /// Use the rate-limited streaming sender instead of batch sends
    #[arg(long, global = true)]
    pub streaming: bool,

    /// Streaming rate in tx/s
    #[arg(long, global = true)]
    pub streaming_rate: Option<u32>,

    /// Build transactions but do not send them
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Directory reports are exported into
    #[arg(long, global = true)]
    pub output_dir: Option<String>,

    /// Disable report export
    #[arg(long, global = true)]
    pub no_export: bool,

    /// Serve Prometheus metrics on --metrics-port
    #[arg(long, global = true)]
    pub metrics: bool,

    #[arg(long, global = true)]
    pub metrics_port: Option<u16>,

    /// Writes `DEBUG` logs to ./debug.log
    #[arg(long, global = true)]
    pub debug_log_file: bool,

    /// Writes `TRACE` logs to ./trace.log
    #[arg(long, global = true)]
    pub trace_log_file: bool,

    /// Which workload to run. Corresponds to the transaction builders plus
    /// the two dedicated executors
    #[command(subcommand)]
    pub mode: CliMode,
}

#[derive(Debug, Subcommand, Clone)]
pub enum CliMode {
    /// Legacy self-transfers of `value` wei
    Transfer,
    /// StableNet fee-delegated transfers (type 0x16), cosigned by the fee payer
    FeeDelegation {
        #[arg(long)]
        fee_payer_key: String,
    },
    /// EIP-1559 contract deployments
    ContractDeploy,
    /// EIP-1559 calls of `method` on `contract`
    ContractCall {
        #[arg(long)]
        contract: String,
        /// Canonical method signature, e.g. "set(uint256)"
        #[arg(long)]
        method: String,
        #[arg(long)]
        args: Option<String>,
    },
    /// ERC-20 transfer(address,uint256) calls against a deployed token
    Erc20Transfer {
        #[arg(long)]
        contract: String,
    },
    /// ERC-721 createNFT(string) mints; deploys the collection when no
    /// contract address is given
    Erc721Mint {
        #[arg(long)]
        contract: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        symbol: Option<String>,
        #[arg(long)]
        token_uri: Option<String>,
    },
    /// Duration-bounded continuous submission with rotating accounts
    LongSender {
        #[arg(long)]
        duration_secs: Option<u64>,
        #[arg(long)]
        tps: Option<u32>,
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Offline statistics over a block range; no submissions
    AnalyzeBlocks {
        #[arg(long)]
        start_block: Option<u64>,
        #[arg(long)]
        end_block: Option<u64>,
        /// Analyze the last N blocks instead of an explicit range
        #[arg(long)]
        block_range: Option<u64>,
    },
}

impl From<CliConfig> for Config {
    fn from(value: CliConfig) -> Self {
        let mut config = Config::default();

        if let Some(rpc_url) = value.rpc_url {
            config.rpc_url = rpc_url.to_string();
        }
        if let Some(master_key) = value.master_key {
            config.master_key = master_key;
        }
        if let Some(sub_accounts) = value.sub_accounts {
            config.sub_accounts = sub_accounts;
        }
        if let Some(transactions) = value.transactions {
            config.transactions = transactions;
        }
        if let Some(batch_size) = value.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(chain_id) = value.chain_id {
            config.chain_id = chain_id;
        }
        if let Some(gas_limit) = value.gas_limit {
            config.gas_limit = gas_limit;
        }
        if let Some(gas_price) = value.gas_price {
            config.gas_price = Some(gas_price);
        }
        if let Some(v) = value.value {
            config.value = v;
        }
        if let Some(timeout) = value.confirm_timeout_secs {
            config.confirm_timeout_secs = timeout;
        }
        if let Some(rate) = value.streaming_rate {
            config.streaming_rate = rate;
        }
        if let Some(output_dir) = value.output_dir {
            config.output_dir = output_dir;
        }
        if let Some(port) = value.metrics_port {
            config.metrics_port = port;
        }
        config.skip_distribution = value.skip_distribution;
        config.skip_collection = value.skip_collection;
        config.streaming = value.streaming;
        config.dry_run = value.dry_run;
        config.export_report = !value.no_export;
        config.metrics_enabled = value.metrics;
        config.debug_log_file = value.debug_log_file;
        config.trace_log_file = value.trace_log_file;

        match value.mode {
            CliMode::Transfer => config.mode = Mode::Transfer,
            CliMode::FeeDelegation { fee_payer_key } => {
                config.mode = Mode::FeeDelegation;
                config.fee_payer_key = Some(fee_payer_key);
            }
            CliMode::ContractDeploy => config.mode = Mode::ContractDeploy,
            CliMode::ContractCall {
                contract,
                method,
                args,
            } => {
                config.mode = Mode::ContractCall;
                config.contract = Some(contract);
                config.method = Some(method);
                config.args = args;
            }
            CliMode::Erc20Transfer { contract } => {
                config.mode = Mode::Erc20Transfer;
                config.contract = Some(contract);
            }
            CliMode::Erc721Mint {
                contract,
                name,
                symbol,
                token_uri,
            } => {
                config.mode = Mode::Erc721Mint;
                config.contract = contract;
                if let Some(name) = name {
                    config.erc721.name = name;
                }
                if let Some(symbol) = symbol {
                    config.erc721.symbol = symbol;
                }
                if let Some(token_uri) = token_uri {
                    config.erc721.token_uri = token_uri;
                }
            }
            CliMode::LongSender {
                duration_secs,
                tps,
                workers,
            } => {
                config.mode = Mode::LongSender;
                if let Some(duration_secs) = duration_secs {
                    config.long_sender.duration_secs = duration_secs;
                }
                if let Some(tps) = tps {
                    config.long_sender.tps = tps;
                }
                if let Some(workers) = workers {
                    config.long_sender.workers = workers;
                }
            }
            CliMode::AnalyzeBlocks {
                start_block,
                end_block,
                block_range,
            } => {
                config.mode = Mode::AnalyzeBlocks;
                config.analyze.start_block = start_block;
                config.analyze.end_block = end_block;
                config.analyze.block_range = block_range;
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_folds_over_defaults() {
        let cli = CliConfig::parse_from([
            "stablenet-txgen",
            "--rpc-url",
            "http://node:8545",
            "--sub-accounts",
            "5",
            "--streaming",
            "fee-delegation",
            "--fee-payer-key",
            "0xdeadbeef",
        ]);
        let config: Config = cli.into();
        assert_eq!(config.rpc_url, "http://node:8545/");
        assert_eq!(config.sub_accounts, 5);
        assert_eq!(config.mode, Mode::FeeDelegation);
        assert_eq!(config.fee_payer_key.as_deref(), Some("0xdeadbeef"));
        assert!(config.streaming);
        // untouched knobs keep their defaults
        assert_eq!(config.transactions, 100);
        assert!(config.export_report);
    }

    #[test]
    fn analyze_mode_args() {
        let cli = CliConfig::parse_from([
            "stablenet-txgen",
            "analyze-blocks",
            "--block-range",
            "50",
        ]);
        let config: Config = cli.into();
        assert_eq!(config.mode, Mode::AnalyzeBlocks);
        assert_eq!(config.analyze.block_range, Some(50));
    }
}
