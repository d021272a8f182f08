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

use std::{collections::BTreeMap, fmt::Write as _, sync::Mutex};

use axum::{extract::State, routing::get, Router};

use crate::prelude::*;

const NAMESPACE: &str = "txgen";
const LATENCY_BOUNDS: &[f64] = &[0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0];
const STAGE_BOUNDS: &[f64] = &[0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0];

/// Fixed-bound histogram with atomic buckets. Counts are stored
/// per-bucket and cumulated at render time, as the exposition format
/// expects.
pub struct Histogram {
    bounds: &'static [f64],
    buckets: Vec<AtomicU64>,
    sum_micros: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    fn new(bounds: &'static [f64]) -> Self {
        Self {
            bounds,
            buckets: (0..=bounds.len()).map(|_| AtomicU64::new(0)).collect(),
            sum_micros: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    pub fn observe(&self, seconds: f64) {
        let index = self
            .bounds
            .iter()
            .position(|&bound| seconds <= bound)
            .unwrap_or(self.bounds.len());
        self.buckets[index].fetch_add(1, Ordering::Relaxed);
        self.sum_micros
            .fetch_add((seconds * 1e6) as u64, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    fn render(&self, out: &mut String, name: &str, labels: &str) {
        let mut cumulative = 0u64;
        for (i, &bound) in self.bounds.iter().enumerate() {
            cumulative += self.buckets[i].load(Ordering::Relaxed);
            let sep = if labels.is_empty() { "" } else { "," };
            let _ = writeln!(
                out,
                "{name}_bucket{{{labels}{sep}le=\"{bound}\"}} {cumulative}"
            );
        }
        cumulative += self.buckets[self.bounds.len()].load(Ordering::Relaxed);
        let sep = if labels.is_empty() { "" } else { "," };
        let _ = writeln!(out, "{name}_bucket{{{labels}{sep}le=\"+Inf\"}} {cumulative}");

        let prefix = if labels.is_empty() {
            String::new()
        } else {
            format!("{{{labels}}}")
        };
        let sum = self.sum_micros.load(Ordering::Relaxed) as f64 / 1e6;
        let _ = writeln!(out, "{name}_sum{prefix} {sum}");
        let _ = writeln!(
            out,
            "{name}_count{prefix} {}",
            self.count.load(Ordering::Relaxed)
        );
    }

    #[cfg(test)]
    pub(crate) fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

/// Thread-safe counters, gauges and histograms shared by every component.
/// The metric names are the stable contract; everything renders in the
/// Prometheus text exposition format under the `txgen` namespace.
pub struct MetricsSink {
    tx_sent: AtomicU64,
    tx_confirmed: AtomicU64,
    tx_failed: AtomicU64,
    tx_timeout: AtomicU64,
    gas_used_total: AtomicU64,

    current_tps: AtomicU64,
    confirmed_tps: AtomicU64,
    pending_tx_count: AtomicU64,
    send_rate: AtomicU64,

    tx_latency: Histogram,
    stage_duration: Mutex<BTreeMap<String, Histogram>>,
}

impl Default for MetricsSink {
    fn default() -> Self {
        Self {
            tx_sent: AtomicU64::new(0),
            tx_confirmed: AtomicU64::new(0),
            tx_failed: AtomicU64::new(0),
            tx_timeout: AtomicU64::new(0),
            gas_used_total: AtomicU64::new(0),
            current_tps: AtomicU64::new(0),
            confirmed_tps: AtomicU64::new(0),
            pending_tx_count: AtomicU64::new(0),
            send_rate: AtomicU64::new(0),
            tx_latency: Histogram::new(LATENCY_BOUNDS),
            stage_duration: Mutex::new(BTreeMap::new()),
        }
    }
}

impl MetricsSink {
    pub fn record_sent(&self, n: u64) {
        self.tx_sent.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_confirmed(&self, latency: Duration) {
        self.tx_confirmed.fetch_add(1, Ordering::Relaxed);
        self.tx_latency.observe(latency.as_secs_f64());
    }

    pub fn record_failed(&self) {
        self.tx_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timeout(&self) {
        self.tx_timeout.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_gas_used(&self, gas: u64) {
        self.gas_used_total.fetch_add(gas, Ordering::Relaxed);
    }

    pub fn set_current_tps(&self, tps: f64) {
        self.current_tps.store(tps.to_bits(), Ordering::Relaxed);
    }

    pub fn set_confirmed_tps(&self, tps: f64) {
        self.confirmed_tps.store(tps.to_bits(), Ordering::Relaxed);
    }

    pub fn set_pending(&self, count: u64) {
        self.pending_tx_count.store(count, Ordering::Relaxed);
    }

    pub fn set_send_rate(&self, rate: f64) {
        self.send_rate.store(rate.to_bits(), Ordering::Relaxed);
    }

    pub fn observe_stage(&self, stage: &str, duration: Duration) {
        let mut stages = self.stage_duration.lock().unwrap();
        stages
            .entry(stage.to_string())
            .or_insert_with(|| Histogram::new(STAGE_BOUNDS))
            .observe(duration.as_secs_f64());
    }

    pub fn render(&self) -> String {
        let mut out = String::with_capacity(4096);

        let counters = [
            ("tx_sent_total", &self.tx_sent, "transactions sent"),
            ("tx_confirmed_total", &self.tx_confirmed, "transactions confirmed"),
            ("tx_failed_total", &self.tx_failed, "transactions failed"),
            ("tx_timeout_total", &self.tx_timeout, "transactions timed out"),
            ("gas_used_total", &self.gas_used_total, "gas used by confirmed transactions"),
        ];
        for (name, value, help) in counters {
            let _ = writeln!(out, "# HELP {NAMESPACE}_{name} Total number of {help}");
            let _ = writeln!(out, "# TYPE {NAMESPACE}_{name} counter");
            let _ = writeln!(
                out,
                "{NAMESPACE}_{name} {}",
                value.load(Ordering::Relaxed)
            );
        }

        let float_gauges = [
            ("current_tps", &self.current_tps, "current send rate in tx/s"),
            ("confirmed_tps", &self.confirmed_tps, "confirmed tx/s"),
            ("send_rate", &self.send_rate, "dispatch rate in tx/s"),
        ];
        for (name, value, help) in float_gauges {
            let _ = writeln!(out, "# HELP {NAMESPACE}_{name} The {help}");
            let _ = writeln!(out, "# TYPE {NAMESPACE}_{name} gauge");
            let _ = writeln!(
                out,
                "{NAMESPACE}_{name} {}",
                f64::from_bits(value.load(Ordering::Relaxed))
            );
        }

        let _ = writeln!(
            out,
            "# HELP {NAMESPACE}_pending_tx_count Number of unconfirmed transactions"
        );
        let _ = writeln!(out, "# TYPE {NAMESPACE}_pending_tx_count gauge");
        let _ = writeln!(
            out,
            "{NAMESPACE}_pending_tx_count {}",
            self.pending_tx_count.load(Ordering::Relaxed)
        );

        let _ = writeln!(
            out,
            "# HELP {NAMESPACE}_tx_latency_seconds Transaction confirmation latency"
        );
        let _ = writeln!(out, "# TYPE {NAMESPACE}_tx_latency_seconds histogram");
        self.tx_latency
            .render(&mut out, &format!("{NAMESPACE}_tx_latency_seconds"), "");

        let _ = writeln!(
            out,
            "# HELP {NAMESPACE}_stage_duration_seconds Duration of each pipeline stage"
        );
        let _ = writeln!(out, "# TYPE {NAMESPACE}_stage_duration_seconds histogram");
        for (stage, histogram) in self.stage_duration.lock().unwrap().iter() {
            histogram.render(
                &mut out,
                &format!("{NAMESPACE}_stage_duration_seconds"),
                &format!("stage=\"{stage}\""),
            );
        }

        out
    }
}

async fn render_metrics(State(metrics): State<Arc<MetricsSink>>) -> String {
    metrics.render()
}

/// Serves `/metrics` until the shutdown flag flips.
pub async fn serve(metrics: Arc<MetricsSink>, port: u16, shutdown: Arc<AtomicBool>) -> Result<()> {
    let app = Router::new()
        .route("/metrics", get(render_metrics))
        .with_state(metrics);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .wrap_err_with(|| format!("Failed to bind metrics listener on port {port}"))?;
    info!("Prometheus metrics available at http://localhost:{port}/metrics");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            while !shutdown.load(Ordering::Relaxed) {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        })
        .await
        .wrap_err("metrics server failed")
}
