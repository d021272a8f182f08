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

use chrono::{DateTime, Utc};

use crate::{
    analyzer::{self, AnalysisResult, AnalyzerConfig, BlockAnalyzer},
    batcher::{Batcher, BatcherConfig, SendStatus, TxOutcome},
    builder::{make_builder, BuilderConfig, BuilderOptions, SignedTx, TxBuilder},
    collector::{Collector, CollectorConfig},
    config::{Config, Mode},
    distributor::{Distributor, DistributorConfig},
    gas::GasOracle,
    longsender::{Callbacks, LongSender, LongSenderConfig, LongSenderResult},
    metrics::MetricsSink,
    nonce::NonceBook,
    prelude::*,
    report::{Exporter, Report},
    streamer::{Streamer, StreamerConfig},
    wallet::Wallet,
};

const FUNDING_CONFIRM_TIMEOUT: Duration = Duration::from_secs(60);
const DEPLOY_CONFIRM_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    Distribute,
    Build,
    Send,
    Collect,
    Report,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Stage::Init => "INITIALIZE",
            Stage::Distribute => "DISTRIBUTE",
            Stage::Build => "BUILD",
            Stage::Send => "SEND",
            Stage::Collect => "COLLECT",
            Stage::Report => "REPORT",
        })
    }
}

#[derive(Debug, Clone)]
pub struct StageResult {
    pub stage: Stage,
    pub success: bool,
    pub duration: Duration,
    pub message: String,
    pub error: Option<String>,
}

#[derive(Debug, Default)]
pub struct PipelineResult {
    pub start_time: Option<DateTime<Utc>>,
    pub duration: Duration,
    pub stages: Vec<StageResult>,
    pub report: Option<Report>,
    pub analysis: Option<AnalysisResult>,
    pub long_sender: Option<LongSenderResult>,
}

impl PipelineResult {
    fn new() -> Self {
        Self {
            start_time: Some(Utc::now()),
            ..Default::default()
        }
    }

    /// True only when every recorded stage succeeded.
    pub fn success(&self) -> bool {
        self.stages.iter().all(|s| s.success)
    }
}

/// Orchestrates Init → Distribute → Build → Send → Collect → Report.
/// The LongSender and AnalyzeBlocks modes short-circuit to their dedicated
/// executors. Any stage failure finalizes the run immediately.
pub struct Pipeline {
    config: Config,
    client: Arc<dyn EthRpc>,
    wallet: Option<Wallet>,
    metrics: Arc<MetricsSink>,
    shutdown: Arc<AtomicBool>,
    nonces: Arc<NonceBook>,

    chain_id: u64,
    collector: Option<Arc<Collector>>,
    signed_txs: Vec<SignedTx>,
}

impl Pipeline {
    pub fn new(
        config: Config,
        client: Arc<dyn EthRpc>,
        metrics: Arc<MetricsSink>,
        shutdown: Arc<AtomicBool>,
    ) -> Result<Self> {
        let wallet = if config.mode == Mode::AnalyzeBlocks {
            None
        } else {
            Some(Wallet::from_master_key(
                &config.master_key,
                config.sub_accounts,
            )?)
        };

        Ok(Self {
            nonces: Arc::new(NonceBook::new(Arc::clone(&client))),
            config,
            client,
            wallet,
            metrics,
            shutdown,
            chain_id: 0,
            collector: None,
            signed_txs: Vec::new(),
        })
    }

    pub async fn execute(mut self) -> Result<PipelineResult> {
        let mut result = PipelineResult::new();
        let started = Instant::now();

        match self.config.mode {
            Mode::AnalyzeBlocks => {
                self.execute_analyzer(&mut result).await?;
                result.duration = started.elapsed();
                return Ok(result);
            }
            Mode::LongSender => {
                self.execute_long_sender(&mut result).await?;
                result.duration = started.elapsed();
                return Ok(result);
            }
            _ => {}
        }

        'stages: {
            if !self.run_init(&mut result).await {
                break 'stages;
            }

            if !self.config.skip_distribution && !self.run_distribute(&mut result).await {
                break 'stages;
            }

            if !self.run_build(&mut result).await {
                break 'stages;
            }

            if self.config.dry_run {
                info!("Dry run complete, transactions built but not sent");
                break 'stages;
            }

            if !self.run_send(&mut result).await {
                break 'stages;
            }

            if !self.config.skip_collection && !self.run_collect(&mut result).await {
                break 'stages;
            }

            self.run_report(&mut result).await;
        }

        result.duration = started.elapsed();
        self.log_final_summary(&result);
        Ok(result)
    }

    fn finish_stage(
        &self,
        result: &mut PipelineResult,
        stage: Stage,
        duration: Duration,
        outcome: Result<String>,
    ) -> bool {
        self.metrics.observe_stage(&stage.to_string(), duration);
        let success = outcome.is_ok();
        match outcome {
            Ok(message) => {
                info!(stage = %stage, ?duration, "Stage completed: {message}");
                result.stages.push(StageResult {
                    stage,
                    success: true,
                    duration,
                    message,
                    error: None,
                });
            }
            Err(e) => {
                error!(stage = %stage, ?duration, "Stage failed: {e:#}");
                result.stages.push(StageResult {
                    stage,
                    success: false,
                    duration,
                    message: format!("Failed: {e:#}"),
                    error: Some(format!("{e:#}")),
                });
            }
        }
        success
    }

    async fn run_init(&mut self, result: &mut PipelineResult) -> bool {
        info!(stage = %Stage::Init, "Stage starting");
        let started = Instant::now();
        let outcome = self.initialize().await;
        self.finish_stage(result, Stage::Init, started.elapsed(), outcome)
    }

    async fn initialize(&mut self) -> Result<String> {
        let discovered = self.client.chain_id().await.wrap_err("Failed to get chain id")?;
        self.chain_id = if self.config.chain_id == 0 {
            discovered
        } else {
            if self.config.chain_id != discovered {
                warn!(
                    configured = self.config.chain_id,
                    discovered, "Configured chain id does not match the node"
                );
            }
            self.config.chain_id
        };

        let wallet = self.wallet.as_ref().expect("wallet required past init");
        let master_balance = self
            .client
            .balance(wallet.master_address())
            .await
            .wrap_err("Failed to get master balance")?;

        info!(
            url = %self.config.rpc_url,
            chain_id = self.chain_id,
            mode = %self.config.mode,
            master = %wallet.master_address(),
            master_balance = %master_balance,
            sub_accounts = self.config.sub_accounts,
            transactions = self.config.transactions,
            batch_size = self.config.batch_size,
            gas_limit = self.config.gas_limit,
            "Pipeline configuration"
        );

        self.collector = Some(Arc::new(Collector::new(
            Arc::clone(&self.client),
            CollectorConfig {
                confirm_timeout: self.config.confirm_timeout(),
                block_tracking: true,
                ..CollectorConfig::default()
            },
            Arc::clone(&self.metrics),
        )));

        Ok(format!("chain id {}", self.chain_id))
    }

    async fn run_distribute(&mut self, result: &mut PipelineResult) -> bool {
        info!(stage = %Stage::Distribute, "Stage starting");
        let started = Instant::now();
        let outcome = self.distribute().await;
        self.finish_stage(result, Stage::Distribute, started.elapsed(), outcome)
    }

    async fn distribute(&mut self) -> Result<String> {
        let wallet = self.wallet.as_ref().expect("wallet required");
        let distributor = Distributor::new(
            Arc::clone(&self.client),
            DistributorConfig {
                gas_per_tx: self.config.gas_limit,
                txs_per_account: self.config.transactions / self.config.sub_accounts.max(1),
                gas_price: self.config.gas_price.unwrap_or(1_000_000_000),
                buffer_percent: 20,
            },
            self.chain_id,
            Arc::clone(&self.nonces),
        );

        let result = distributor
            .distribute(wallet.master(), &wallet.sub_addresses())
            .await?;

        if result.tx_count > 0 {
            distributor
                .wait_for_funding(&result.ready, FUNDING_CONFIRM_TIMEOUT)
                .await?;
        }

        Ok(format!(
            "{} ready, {} unfundable, {} wei distributed",
            result.ready.len(),
            result.unfunded.len(),
            result.total_distributed
        ))
    }

    async fn run_build(&mut self, result: &mut PipelineResult) -> bool {
        info!(stage = %Stage::Build, "Stage starting");
        let started = Instant::now();
        let outcome = self.build().await;
        self.finish_stage(result, Stage::Build, started.elapsed(), outcome)
    }

    async fn build(&mut self) -> Result<String> {
        let gas = GasOracle::fixed(Arc::clone(&self.client), self.config.gas_price)
            .resolve()
            .await?;
        let builder_config = BuilderConfig {
            chain_id: self.chain_id,
            gas_limit: self.config.gas_limit,
            gas,
            value: self.config.value()?,
        };

        let mut contract = match &self.config.contract {
            Some(contract) if !contract.is_empty() => Some(
                Address::from_str(contract)
                    .map_err(|e| TxGenError::Config(format!("invalid contract address: {e}")))?,
            ),
            _ => None,
        };

        // an ERC-721 run without a contract deploys the collection first
        if self.config.mode == Mode::Erc721Mint && contract.is_none() {
            contract = Some(self.deploy_collection(&builder_config).await?);
        }

        let builder = make_builder(
            self.config.mode,
            builder_config,
            BuilderOptions {
                recipient: None,
                fee_payer_key: self.config.fee_payer_key.clone(),
                contract,
                bytecode: None,
                method: self.config.method.clone(),
                args: self.config.args.clone(),
                erc721: self.config.erc721.clone(),
            },
        )?;

        let wallet = self.wallet.as_ref().expect("wallet required");
        let keys = wallet.sub_keys();
        let shares = crate::builder::distribute(keys.len(), self.config.transactions as usize);

        let mut start_nonces = Vec::with_capacity(keys.len());
        for (key, &share) in keys.iter().zip(&shares) {
            if share == 0 {
                start_nonces.push(0);
                continue;
            }
            let start = self
                .nonces
                .allocate_many(key.address(), share as u64)
                .await?;
            start_nonces.push(start);
        }

        self.signed_txs = builder.build(keys, &start_nonces, self.config.transactions as usize)?;
        Ok(format!(
            "{} built {} transactions",
            builder.name(),
            self.signed_txs.len()
        ))
    }

    async fn deploy_collection(&self, builder_config: &BuilderConfig) -> Result<Address> {
        if self.config.dry_run {
            bail!("erc721_mint dry run requires an existing contract address");
        }

        let wallet = self.wallet.as_ref().expect("wallet required");
        let master = wallet.master();
        let nonce = self.nonces.allocate(master.address()).await?;

        let TxBuilder::Erc721Mint(mint) = make_builder(
            Mode::Erc721Mint,
            *builder_config,
            BuilderOptions {
                erc721: self.config.erc721.clone(),
                ..Default::default()
            },
        )?
        else {
            unreachable!("erc721 factory returned a different variant");
        };

        let deploy = mint.build_deploy(master, nonce)?;
        let contract = master.address().create(nonce);
        info!(
            %contract,
            deploy_tx = %deploy.hash,
            "Deploying NFT collection"
        );

        self.client.send_raw_transaction(&deploy.raw).await?;

        let deadline = Instant::now() + DEPLOY_CONFIRM_TIMEOUT;
        loop {
            if let Some(receipt) = self.client.transaction_receipt(deploy.hash).await? {
                if !receipt.status {
                    bail!("NFT collection deployment reverted");
                }
                break;
            }
            if Instant::now() > deadline {
                bail!("timed out waiting for NFT collection deployment");
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }

        Ok(contract)
    }

    async fn run_send(&mut self, result: &mut PipelineResult) -> bool {
        info!(stage = %Stage::Send, "Stage starting");
        let started = Instant::now();
        let outcome = self.send().await;
        self.finish_stage(result, Stage::Send, started.elapsed(), outcome)
    }

    async fn send(&mut self) -> Result<String> {
        if self.signed_txs.is_empty() {
            bail!("no transactions to send");
        }
        let collector = self.collector.as_ref().expect("collector required").clone();

        for tx in &self.signed_txs {
            collector.track(tx.hash, tx.from, tx.nonce, tx.gas_limit);
        }
        self.metrics.record_sent(self.signed_txs.len() as u64);

        let (sent, failed, rate, outcomes) = if self.config.streaming {
            let streamer = Streamer::new(
                Arc::clone(&self.client),
                StreamerConfig {
                    rate: self.config.streaming_rate,
                    ..StreamerConfig::default()
                },
            );
            let result = streamer.stream(&self.signed_txs, &self.shutdown).await?;
            (
                result.success_count,
                result.failed_count,
                result.tx_per_second,
                result.results,
            )
        } else {
            let batcher = Batcher::new(
                Arc::clone(&self.client),
                BatcherConfig {
                    batch_size: self.config.batch_size as usize,
                    max_concurrent: 100,
                    batch_interval: Duration::ZERO,
                    ..BatcherConfig::default()
                },
            );
            let summary = batcher.send_all(&self.signed_txs).await?;
            (
                summary.success_count,
                summary.failed_count,
                summary.tx_per_second,
                summary.chunks.into_iter().flat_map(|c| c.results).collect(),
            )
        };

        self.metrics.set_send_rate(rate);
        self.metrics.set_current_tps(rate);
        self.mark_dispatch_failures(&collector, &outcomes);

        Ok(format!("{sent} sent, {failed} rejected"))
    }

    /// Transactions the node rejected at dispatch will never get a receipt;
    /// fail them in the collector up front instead of letting them ride to
    /// the confirmation timeout.
    fn mark_dispatch_failures(&self, collector: &Collector, outcomes: &[TxOutcome]) {
        for outcome in outcomes {
            if outcome.status == SendStatus::Failed {
                collector.mark_send_failed(
                    outcome.local_hash,
                    outcome.error.as_deref().unwrap_or("send failed"),
                );
            }
        }
    }

    async fn run_collect(&mut self, result: &mut PipelineResult) -> bool {
        info!(stage = %Stage::Collect, "Stage starting");
        let started = Instant::now();
        let outcome = self.collect(result).await;
        self.finish_stage(result, Stage::Collect, started.elapsed(), outcome)
    }

    async fn collect(&mut self, result: &mut PipelineResult) -> Result<String> {
        let collector = self.collector.as_ref().expect("collector required");
        let report = collector.collect(&self.shutdown).await?;
        report.log_summary();

        let message = format!(
            "{} confirmed, {} failed, {} timed out",
            report.metrics.total_confirmed,
            report.metrics.total_failed,
            report.metrics.total_timeout
        );
        result.report = Some(report);
        Ok(message)
    }

    async fn run_report(&mut self, result: &mut PipelineResult) -> bool {
        info!(stage = %Stage::Report, "Stage starting");
        let started = Instant::now();
        let outcome = self.export(result).await;
        self.finish_stage(result, Stage::Report, started.elapsed(), outcome)
    }

    async fn export(&mut self, result: &mut PipelineResult) -> Result<String> {
        let Some(report) = &result.report else {
            return Ok("nothing to export".to_string());
        };
        if !self.config.export_report {
            return Ok("export disabled".to_string());
        }

        let files = Exporter::new(&self.config.output_dir).export_all(report)?;
        for file in &files {
            info!("Report written to {}", file.display());
        }
        Ok(format!("{} report files", files.len()))
    }

    async fn execute_analyzer(&mut self, result: &mut PipelineResult) -> Result<()> {
        info!("Running block analyzer");
        let analyzer = BlockAnalyzer::new(
            Arc::clone(&self.client),
            AnalyzerConfig {
                start_block: self.config.analyze.start_block,
                end_block: self.config.analyze.end_block,
                block_range: self.config.analyze.block_range,
                concurrency: 50,
            },
        );

        let analysis = analyzer.analyze().await?;
        info!("Block analysis:\n{}", analyzer::render_table(&analysis));
        info!(
            blocks = analysis.blocks.len(),
            total_txs = analysis.total_txs,
            average_tps = %format!("{:.2}", analysis.average_tps),
            avg_block_time = ?analysis.avg_block_time,
            "Block analysis summary"
        );

        if self.config.export_report {
            std::fs::create_dir_all(&self.config.output_dir)?;
            let path = std::path::Path::new(&self.config.output_dir).join(format!(
                "block_analysis_{}_{}.csv",
                analysis.start_block, analysis.end_block
            ));
            analyzer::export_csv(&analysis, &path)?;
            info!("Analysis written to {}", path.display());
        }

        result.analysis = Some(analysis);
        Ok(())
    }

    async fn execute_long_sender(&mut self, result: &mut PipelineResult) -> Result<()> {
        info!("Running long sender");
        let wallet = self.wallet.as_ref().expect("wallet required");
        let keys = wallet.sub_keys().to_vec();

        let mut initial_nonces = Vec::with_capacity(keys.len());
        for key in &keys {
            initial_nonces.push(self.client.pending_nonce(key.address()).await?);
        }

        let metrics = Arc::clone(&self.metrics);
        let on_sent_metrics = Arc::clone(&self.metrics);
        let on_failed_metrics = Arc::clone(&self.metrics);
        let sender = LongSender::new(
            Arc::clone(&self.client),
            LongSenderConfig::with_default_burst(
                Duration::from_secs(self.config.long_sender.duration_secs),
                self.config.long_sender.tps,
                self.config.long_sender.workers,
            ),
        )
        .with_callbacks(Callbacks {
            on_sent: Some(Box::new(move |_| on_sent_metrics.record_sent(1))),
            on_failed: Some(Box::new(move |_| on_failed_metrics.record_failed())),
            on_tps: Some(Box::new(move |tps| metrics.set_current_tps(tps))),
        });

        let run = sender
            .run(keys, initial_nonces, Arc::clone(&self.shutdown))
            .await?;

        let attempted = run.total_sent + run.total_failed;
        info!(
            total_sent = run.total_sent,
            total_failed = run.total_failed,
            duration = ?run.duration,
            average_tps = %format!("{:.2}", run.average_tps),
            success_rate = %format!(
                "{:.2}%",
                if attempted > 0 {
                    run.total_sent as f64 / attempted as f64 * 100.0
                } else {
                    0.0
                }
            ),
            "Long sender finished"
        );
        for error in run.errors.iter().take(5) {
            warn!("Sample error: {error}");
        }

        result.long_sender = Some(run);
        Ok(())
    }

    fn log_final_summary(&self, result: &PipelineResult) {
        for stage in &result.stages {
            if stage.success {
                info!(stage = %stage.stage, duration = ?stage.duration, "[OK]");
            } else {
                error!(stage = %stage.stage, duration = ?stage.duration, "[FAIL] {}",
                    stage.error.as_deref().unwrap_or("unknown"));
            }
        }
        if result.success() {
            info!(total_duration = ?result.duration, "Stress test completed successfully");
        } else {
            warn!(total_duration = ?result.duration, "Stress test completed with errors");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::testutil::MockRpc;

    const MASTER: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn base_config() -> Config {
        Config {
            master_key: MASTER.to_string(),
            mode: Mode::Transfer,
            sub_accounts: 3,
            transactions: 10,
            batch_size: 4,
            chain_id: 1337,
            gas_limit: 21_000,
            gas_price: Some(1_000_000_000),
            value: "1".to_string(),
            confirm_timeout_secs: 5,
            skip_distribution: true,
            export_report: false,
            ..Config::default()
        }
    }

    fn pipeline(config: Config, mock: Arc<MockRpc>) -> Pipeline {
        Pipeline::new(
            config,
            mock,
            Arc::new(MetricsSink::default()),
            Arc::new(AtomicBool::new(false)),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn transfer_run_confirms_all_transactions() {
        let mock = Arc::new(MockRpc::new());
        mock.enable_auto_receipts();

        let wallet = Wallet::from_master_key(MASTER, 3).unwrap();
        let fresh_nonces = [5u64, 2, 0];
        for (address, &nonce) in wallet.sub_addresses().iter().zip(&fresh_nonces) {
            mock.set_nonce(*address, nonce);
        }

        let result = pipeline(base_config(), mock.clone()).execute().await.unwrap();
        assert!(result.success(), "stages: {:?}", result.stages);

        let report = result.report.as_ref().unwrap();
        assert_eq!(report.metrics.total_sent, 10);
        assert_eq!(report.metrics.total_confirmed, 10);
        assert_eq!(report.metrics.success_rate, 100.0);

        // assignments of sizes (4, 3, 3) with contiguous nonces per account
        let mut nonces: HashMap<Address, Vec<u64>> = HashMap::new();
        for tx in &report.transactions {
            nonces.entry(tx.from).or_default().push(tx.nonce);
        }
        for list in nonces.values_mut() {
            list.sort_unstable();
        }
        let subs = wallet.sub_addresses();
        assert_eq!(nonces[&subs[0]], (5..9).collect::<Vec<_>>());
        assert_eq!(nonces[&subs[1]], (2..5).collect::<Vec<_>>());
        assert_eq!(nonces[&subs[2]], (0..3).collect::<Vec<_>>());

        assert_eq!(mock.sent().len(), 10);
    }

    #[tokio::test]
    async fn dry_run_stops_after_build() {
        let mock = Arc::new(MockRpc::new());
        let config = Config {
            dry_run: true,
            ..base_config()
        };

        let result = pipeline(config, mock.clone()).execute().await.unwrap();
        assert!(result.success());
        assert!(mock.sent().is_empty());

        let stages: Vec<Stage> = result.stages.iter().map(|s| s.stage).collect();
        assert_eq!(stages, vec![Stage::Init, Stage::Build]);
    }

    #[tokio::test]
    async fn init_failure_fails_the_pipeline() {
        let mock = Arc::new(MockRpc::new());
        mock.fail_next_chain_id_queries(1);

        let result = pipeline(base_config(), mock).execute().await.unwrap();
        assert!(!result.success());
        assert_eq!(result.stages.len(), 1);
        assert_eq!(result.stages[0].stage, Stage::Init);
        assert!(result.stages[0].error.is_some());
    }

    #[tokio::test]
    async fn distribution_runs_when_not_skipped() {
        let mock = Arc::new(MockRpc::new());
        mock.enable_auto_receipts();

        let wallet = Wallet::from_master_key(MASTER, 3).unwrap();
        // sub accounts already funded: no transfers, but the stage runs
        for address in wallet.sub_addresses() {
            mock.set_balance(address, U256::MAX / U256::from(2));
        }
        mock.set_balance(wallet.master_address(), U256::MAX / U256::from(2));

        let config = Config {
            skip_distribution: false,
            ..base_config()
        };
        let result = pipeline(config, mock).execute().await.unwrap();
        assert!(result.success(), "stages: {:?}", result.stages);
        assert!(result
            .stages
            .iter()
            .any(|s| s.stage == Stage::Distribute && s.success));
    }

    #[tokio::test]
    async fn analyze_mode_short_circuits() {
        let mock = Arc::new(MockRpc::new());
        mock.set_blocks(vec![crate::client::ChainBlock {
            number: 1,
            hash: B256::repeat_byte(0x01),
            timestamp: 1_700_000_000,
            gas_limit: 30_000_000,
            gas_used: 0,
            transactions: vec![],
        }]);

        let config = Config {
            mode: Mode::AnalyzeBlocks,
            master_key: String::new(),
            export_report: false,
            analyze: crate::config::AnalyzeOptions {
                block_range: Some(1),
                ..Default::default()
            },
            ..base_config()
        };

        let result = pipeline(config, mock).execute().await.unwrap();
        assert!(result.success());
        assert!(result.stages.is_empty());
        assert_eq!(result.analysis.unwrap().total_txs, 0);
    }

    #[tokio::test]
    async fn long_sender_mode_short_circuits() {
        let mock = Arc::new(MockRpc::new());
        let config = Config {
            mode: Mode::LongSender,
            long_sender: crate::config::LongSenderOptions {
                duration_secs: 0,
                tps: 100,
                workers: 2,
            },
            ..base_config()
        };

        // zero duration: the run returns immediately with nothing sent
        let result = pipeline(config, mock).execute().await.unwrap();
        assert!(result.success());
        let run = result.long_sender.unwrap();
        assert_eq!(run.total_sent + run.total_failed, 0);
    }
}
