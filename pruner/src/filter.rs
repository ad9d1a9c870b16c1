use std::{time::Duration, vec};

use time::OffsetDateTime;

use crate::exposition::{MetricFamily, Sample};

/// Selects the samples of the `metric_name` family whose value, read as the
/// Unix time of the group's last push, is more than `threshold` before `now`.
///
/// Samples come out lazily and in input order; every other family is skipped
/// without looking at its samples. Each sample stands for one group.
pub fn stale_samples<I>(
    families: I,
    metric_name: &str,
    threshold: Duration,
    now: OffsetDateTime,
) -> StaleSamples<'_, I::IntoIter>
where
    I: IntoIterator<Item = MetricFamily>,
{
    StaleSamples {
        families: families.into_iter(),
        metric_name,
        threshold: threshold.as_secs_f64(),
        now: unix_seconds(now),
        samples: Vec::new().into_iter(),
    }
}

pub struct StaleSamples<'a, I> {
    families: I,
    metric_name: &'a str,
    /// Seconds
    threshold: f64,
    /// Seconds since the Unix epoch
    now: f64,
    samples: vec::IntoIter<Sample>,
}

impl<I> Iterator for StaleSamples<'_, I>
where
    I: Iterator<Item = MetricFamily>,
{
    type Item = Sample;

    fn next(&mut self) -> Option<Sample> {
        loop {
            // NaN push times compare false and are never stale
            if let Some(sample) = self.samples.find(|s| self.now - s.value > self.threshold) {
                return Some(sample);
            }
            let family = self.families.find(|f| f.name == self.metric_name)?;
            self.samples = family.samples.into_iter();
        }
    }
}

fn unix_seconds(t: OffsetDateTime) -> f64 {
    t.unix_timestamp_nanos() as f64 / 1e9
}
