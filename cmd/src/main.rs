use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};
use pruner::{Pruner, Scheduler};
use pushgateway_pruner::Cli;

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    let level = cli.log_level()?;

    // The runtime is single-threaded, so a thread-local default subscriber
    // covers every task it runs.
    tracing::subscriber::with_default(pushgateway_pruner::subscriber(level), || run(cli))
}

fn run(cli: Cli) -> Result<()> {
    let config = cli.prune_config().wrap_err("invalid configuration")?;
    tracing::info!(
        url = %config.pushgateway_url,
        interval = ?config.prune_interval,
        threshold = ?config.prune_threshold,
        timeout = ?config.requests_timeout,
        metric = %config.prune_metric_name,
        "starting pushgateway pruner"
    );

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .wrap_err("failed to start tokio runtime")?;
    rt.block_on(async {
        let scheduler = Scheduler::new(config.prune_interval);
        let pruner = Pruner::new(config).wrap_err("failed to create pruner")?;
        scheduler
            .run(|| pruner.run_cycle(), pushgateway_pruner::shutdown_signal())
            .await;
        Ok::<_, color_eyre::Report>(())
    })
}
