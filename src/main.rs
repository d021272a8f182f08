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

use std::{
    env,
    sync::{atomic::AtomicBool, Arc},
};

use clap::Parser;
use eyre::Result;
use stablenet_txgen::{
    cli::CliConfig,
    client::{self, EthRpc},
    config::Config,
    metrics::{self, MetricsSink},
    pipeline::Pipeline,
};
use tracing::{error, info};
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() {
    let cli_config = CliConfig::parse();
    let config = if let Some(config_file) = &cli_config.config_file {
        Config::from_file(config_file).expect("Failed to load configuration")
    } else {
        cli_config.into()
    };

    if let Err(e) = setup_logging(config.trace_log_file, config.debug_log_file) {
        error!("Error setting up logging: {e:?}");
    }

    match run(config).await {
        Ok(success) => std::process::exit(if success { 0 } else { 1 }),
        Err(e) => {
            error!("Fatal error: {e:?}");
            std::process::exit(1);
        }
    }
}

async fn run(config: Config) -> Result<bool> {
    config.validate()?;

    let url = config.rpc_url()?;
    let client: Arc<dyn EthRpc> = Arc::new(client::http_client(url));

    let metrics_sink = Arc::new(MetricsSink::default());
    let shutdown = Arc::new(AtomicBool::new(false));

    {
        let shutdown = Arc::clone(&shutdown);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown signal received");
                shutdown.store(true, std::sync::atomic::Ordering::Relaxed);
            }
        });
    }

    let metrics_server = if config.metrics_enabled {
        let sink = Arc::clone(&metrics_sink);
        let port = config.metrics_port;
        let shutdown = Arc::clone(&shutdown);
        Some(tokio::spawn(async move {
            if let Err(e) = metrics::serve(sink, port, shutdown).await {
                error!("Metrics server failed: {e:#}");
            }
        }))
    } else {
        None
    };

    let pipeline = Pipeline::new(config, client, metrics_sink, Arc::clone(&shutdown))?;
    let result = pipeline.execute().await?;

    shutdown.store(true, std::sync::atomic::Ordering::Relaxed);
    if let Some(server) = metrics_server {
        let _ = server.await;
    }

    Ok(result.success())
}

fn setup_logging(trace_log_file: bool, debug_log_file: bool) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Layer};

    let trace_layer = if trace_log_file {
        Some(
            fmt::layer()
                .with_writer(std::fs::File::create("trace.log")?)
                .with_filter(EnvFilter::new("stablenet_txgen=trace")),
        )
    } else {
        None
    };

    let debug_layer = if debug_log_file {
        Some(
            fmt::layer()
                .with_writer(std::fs::File::create("debug.log")?)
                .with_filter(EnvFilter::new("stablenet_txgen=debug")),
        )
    } else {
        None
    };

    let rust_log = env::var("RUST_LOG").unwrap_or("info".into());

    // high signal aggregations go to stdio
    let stdio_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_filter(EnvFilter::new(format!("stablenet_txgen={rust_log}")));

    tracing_subscriber::registry()
        .with(trace_layer)
        .with(debug_layer)
        .with(stdio_layer)
        .try_init()
        .map_err(Into::into)
}
