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

use time::OffsetDateTime;

use crate::{
    client::{GatewayClient, RetryPolicy},
    config::PruneConfig,
    exposition::{self, Sample},
    filter,
    group_url::build_group_url,
    Result,
};

/// Outcome of one prune cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Groups past the threshold.
    pub stale: usize,
    pub deleted: usize,
    pub failed: usize,
}

/// Runs fetch → parse → filter → delete passes against one gateway.
pub struct Pruner {
    config: PruneConfig,
    client: GatewayClient,
}

impl Pruner {
    pub fn new(config: PruneConfig) -> Result<Self> {
        let client = GatewayClient::new(config.requests_timeout, RetryPolicy::default())?;
        Ok(Self::with_client(config, client))
    }

    pub fn with_client(config: PruneConfig, client: GatewayClient) -> Self {
        Self { config, client }
    }

    /// One prune cycle. Failures are logged, never returned: a failed fetch
    /// or a malformed payload ends the cycle, a failed deletion only skips
    /// its group.
    pub async fn run_cycle(&self) {
        match self.prune().await {
            Ok(report) => tracing::info!(
                stale = report.stale,
                deleted = report.deleted,
                failed = report.failed,
                "prune cycle finished"
            ),
            Err(error) => tracing::error!(
                error = %error,
                source = ?std::error::Error::source(&error),
                "prune cycle aborted"
            ),
        }
    }

    /// The fallible body of [`Pruner::run_cycle`].
    ///
    /// Deletions are issued while the payload is still being parsed, so a
    /// parse error surfaces after the groups before it have been handled.
    pub async fn prune(&self) -> Result<CycleReport> {
        let config = &self.config;
        tracing::info!(
            url = %config.pushgateway_url,
            threshold_secs = config.prune_threshold.as_secs(),
            metric = %config.prune_metric_name,
            "starting prune cycle"
        );

        let metrics_url = config.metrics_url()?;
        let text = self.client.fetch(metrics_url.as_str()).await?;
        let now = OffsetDateTime::now_utc();

        let mut parse_error = None;
        let families = exposition::parse(&text).map_while(|family| {
            family.map_err(|e| parse_error = Some(e)).ok()
        });
        let mut report = CycleReport::default();
        for sample in filter::stale_samples(
            families,
            &config.prune_metric_name,
            config.prune_threshold,
            now,
        ) {
            report.stale += 1;
            match self.delete_group(&sample).await {
                Ok(()) => report.deleted += 1,
                Err(error) => {
                    report.failed += 1;
                    tracing::warn!(
                        error = %error,
                        source = ?std::error::Error::source(&error),
                        "failed to prune group"
                    );
                }
            }
        }

        match parse_error {
            Some(error) => Err(error),
            None => Ok(report),
        }
    }

    async fn delete_group(&self, sample: &Sample) -> Result<()> {
        let url = build_group_url(&sample.labels, &self.config.pushgateway_url)?;
        if sample.labels.has_only_empty_instance() {
            tracing::warn!(
                %url,
                "group keyed by job and an empty instance; the gateway may not match this deletion"
            );
        }
        self.client.delete(&url).await?;
        tracing::debug!(%url, push_time = sample.value, "sent delete request");
        Ok(())
    }
}
