use std::{future::Future, time::Duration};

use tokio::time::{self, MissedTickBehavior};

/// Repeats a cycle at a fixed cadence until shut down.
///
/// The first cycle starts immediately and later ones start `period` after the
/// previous start. Cycles never overlap: when one outlasts the period, the
/// next starts as soon as it returns and the cadence continues from there.
#[derive(Debug, Clone, Copy)]
pub struct Scheduler {
    period: Duration,
}

impl Scheduler {
    /// # Panics
    ///
    /// Panics if `period` is zero.
    pub fn new(period: Duration) -> Self {
        assert!(period > Duration::ZERO, "scheduler period must be positive");
        Self { period }
    }

    /// Drives `cycle` until `shutdown` resolves. A cycle still running at
    /// that point is dropped at its next await and no further cycle starts.
    pub async fn run<F, Fut, S>(&self, mut cycle: F, shutdown: S)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ()>,
        S: Future<Output = ()>,
    {
        let mut ticker = time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                _ = ticker.tick() => {}
            }
            tracing::debug!(period = ?self.period, "starting scheduled cycle");
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    tracing::info!("shutdown requested, abandoning running cycle");
                    break;
                }
                _ = cycle() => {}
            }
        }
        tracing::info!("scheduler stopped");
    }
}
