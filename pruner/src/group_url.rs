//! Grouping-key URLs for the Pushgateway deletion API.
//!
//! See https://github.com/prometheus/pushgateway#url

use base64::{engine::general_purpose::URL_SAFE, Engine};
use reqwest::Url;

use crate::{
    labels::{LabelSet, JOB_LABEL},
    Error, Result,
};

/// Path segment the gateway decodes as an empty label value.
const EMPTY_VALUE: &str = "=";

/// Builds `<base_url>/metrics/job/<job>{/<label>@base64/<value>}` for the
/// group identified by `labels`.
///
/// The job value is written as is. Every other label follows in label-set
/// order with its value in URL-safe base64 (padded), or `=` when the value is
/// empty. The gateway treats the grouping key as a set, so the order of the
/// trailing labels does not matter.
///
/// `base_url` is resolved like a relative reference: keep a trailing slash on
/// it when the gateway lives under a path prefix.
///
/// Known limitation: a group keyed only by `job` and an empty `instance`
/// yields `…/metrics/job/<job>/instance@base64/=`, which the gateway does not
/// match, so such groups are not removed. See
/// [`LabelSet::has_only_empty_instance`].
pub fn build_group_url(labels: &LabelSet, base_url: &Url) -> Result<String> {
    let job = labels.job().ok_or_else(|| Error::InvalidLabelSet {
        labels: labels.clone(),
    })?;
    let mut url = String::from(metrics_url(base_url)?.as_str());
    url.push_str("/job/");
    url.push_str(job);
    for (name, value) in labels.iter().filter(|(name, _)| *name != JOB_LABEL) {
        url.push('/');
        url.push_str(name);
        url.push_str("@base64/");
        if value.is_empty() {
            url.push_str(EMPTY_VALUE);
        } else {
            url.push_str(&URL_SAFE.encode(value));
        }
    }
    Ok(url)
}

/// Resolves `metrics` against `base_url`.
pub(crate) fn metrics_url(base_url: &Url) -> Result<Url> {
    base_url
        .join("metrics")
        .map_err(|e| Error::Config(format!("cannot resolve metrics path against {base_url}: {e}")))
}
