// Copyright 2022 Zinc Labs Inc. and Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use clap::Parser;
use color_eyre::eyre::{eyre, Result};
use pruner::{config, PruneConfig};
use tracing::{level_filters::LevelFilter, Subscriber};
use tracing_subscriber::EnvFilter;

/// Periodically deletes stale groups from a Prometheus Pushgateway.
#[derive(Debug, Parser)]
#[command(version)]
pub struct Cli {
    /// How often to start the pruning job in seconds.
    #[arg(long = "prune_interval_seconds", env = "PRUNE_INTERVAL_SECONDS", default_value_t = config::DEFAULT_PRUNE_INTERVAL_SECS)]
    pub prune_interval_seconds: u64,

    /// URL for your pushgateway instance (without /metrics postfix).
    #[arg(long = "pushgateway_url", env = "PUSHGATEWAY_URL", default_value = config::DEFAULT_PUSHGATEWAY_URL)]
    pub pushgateway_url: String,

    /// Number of seconds since <prune_metric_name>'s value after which to
    /// prune a group.
    #[arg(long = "prune_threshold_seconds", env = "PRUNE_THRESHOLD_SECONDS", default_value_t = config::DEFAULT_PRUNE_THRESHOLD_SECS)]
    pub prune_threshold_seconds: u64,

    /// Timeout in seconds for each request to the pushgateway.
    #[arg(long = "requests_timeout", env = "REQUESTS_TIMEOUT", default_value_t = config::DEFAULT_REQUESTS_TIMEOUT_SECS)]
    pub requests_timeout: u64,

    /// The name of the metric which is used as each group's last push time.
    #[arg(long = "prune_metric_name", env = "PRUNE_METRIC_NAME", default_value = config::DEFAULT_PRUNE_METRIC_NAME)]
    pub prune_metric_name: String,

    /// Logging level: TRACE, DEBUG, INFO, WARN (WARNING), ERROR (CRITICAL)
    /// or OFF.
    #[arg(long = "logging_level", env = "LOGGING_LEVEL", default_value = "INFO")]
    pub logging_level: String,
}

impl Cli {
    pub fn prune_config(&self) -> pruner::Result<PruneConfig> {
        PruneConfig::new(
            self.prune_interval_seconds,
            &self.pushgateway_url,
            self.prune_threshold_seconds,
            self.requests_timeout,
            &self.prune_metric_name,
        )
    }

    pub fn log_level(&self) -> Result<LevelFilter> {
        parse_level(&self.logging_level)
    }
}

/// Accepts tracing level names plus the `WARNING`/`CRITICAL` spellings used
/// by other tooling, case-insensitively.
pub fn parse_level(level: &str) -> Result<LevelFilter> {
    Ok(match level.trim().to_ascii_uppercase().as_str() {
        "TRACE" => LevelFilter::TRACE,
        "DEBUG" => LevelFilter::DEBUG,
        "INFO" => LevelFilter::INFO,
        "WARN" | "WARNING" => LevelFilter::WARN,
        "ERROR" | "CRITICAL" => LevelFilter::ERROR,
        "OFF" => LevelFilter::OFF,
        _ => return Err(eyre!("invalid logging level {level:?}")),
    })
}

/// Log subscriber writing to stdout at `level`. `RUST_LOG` directives, when
/// set, refine it per target.
pub fn subscriber(level: LevelFilter) -> impl Subscriber + Send + Sync {
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .finish()
}

/// Resolves on SIGINT or, on Unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::error!(%error, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                tracing::error!(%error, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received SIGINT"),
        _ = terminate => tracing::info!("received SIGTERM"),
    }
}
