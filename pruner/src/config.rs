use std::time::Duration;

use reqwest::Url;

use crate::{exposition::validate_metric_name, group_url, Error, Result};

pub const DEFAULT_PRUNE_INTERVAL_SECS: u64 = 600;
pub const DEFAULT_PUSHGATEWAY_URL: &str = "http://localhost:9091/";
pub const DEFAULT_PRUNE_THRESHOLD_SECS: u64 = 600;
pub const DEFAULT_REQUESTS_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_PRUNE_METRIC_NAME: &str = "push_time_seconds";

/// Process-wide pruning parameters. Validated once, read-only afterwards.
#[derive(Debug, Clone)]
pub struct PruneConfig {
    /// Time between the starts of two prune cycles.
    pub prune_interval: Duration,
    /// Gateway base URL, without the `/metrics` suffix.
    pub pushgateway_url: Url,
    /// Groups whose last push is older than this get deleted.
    pub prune_threshold: Duration,
    /// Bound for each HTTP attempt.
    pub requests_timeout: Duration,
    /// Metric whose value records each group's last push time.
    pub prune_metric_name: String,
}

impl Default for PruneConfig {
    fn default() -> Self {
        Self {
            prune_interval: Duration::from_secs(DEFAULT_PRUNE_INTERVAL_SECS),
            pushgateway_url: Url::parse(DEFAULT_PUSHGATEWAY_URL)
                .expect("BUG: default gateway URL is invalid"),
            prune_threshold: Duration::from_secs(DEFAULT_PRUNE_THRESHOLD_SECS),
            requests_timeout: Duration::from_secs(DEFAULT_REQUESTS_TIMEOUT_SECS),
            prune_metric_name: DEFAULT_PRUNE_METRIC_NAME.to_owned(),
        }
    }
}

impl PruneConfig {
    /// Builds a config from raw option values, rejecting values the pruner
    /// cannot run with.
    pub fn new(
        prune_interval_seconds: u64,
        pushgateway_url: &str,
        prune_threshold_seconds: u64,
        requests_timeout: u64,
        prune_metric_name: &str,
    ) -> Result<Self> {
        if prune_interval_seconds == 0 {
            return Err(Error::Config("prune interval must be positive".to_owned()));
        }
        if requests_timeout == 0 {
            return Err(Error::Config("requests timeout must be positive".to_owned()));
        }
        let url = Url::parse(pushgateway_url)
            .map_err(|e| Error::Config(format!("invalid pushgateway URL {pushgateway_url:?}: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "pushgateway URL {pushgateway_url:?} must use http or https"
            )));
        }
        validate_metric_name(prune_metric_name).map_err(Error::Config)?;

        Ok(Self {
            prune_interval: Duration::from_secs(prune_interval_seconds),
            pushgateway_url: url,
            prune_threshold: Duration::from_secs(prune_threshold_seconds),
            requests_timeout: Duration::from_secs(requests_timeout),
            prune_metric_name: prune_metric_name.to_owned(),
        })
    }

    /// `<pushgateway_url>/metrics`, resolved like a relative reference.
    pub fn metrics_url(&self) -> Result<Url> {
        group_url::metrics_url(&self.pushgateway_url)
    }
}
