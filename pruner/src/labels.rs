use std::fmt;

use indexmap::IndexMap;
use itertools::Itertools;

pub const JOB_LABEL: &str = "job";
pub const INSTANCE_LABEL: &str = "instance";

/// `LabelSet` maps label names to label values.
///
/// Labels keep the order in which they were inserted; that order is used for
/// display and for the path segments of a grouping key, while equality
/// ignores it. An empty value is distinct from an absent label.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSet(IndexMap<String, String>);

impl LabelSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `name` to `value`, returning the previous value if the label was
    /// already present. The label keeps its original position in that case.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(name.into(), value.into())
    }

    /// Returns the value of the label with given name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Value of the `job` label, the mandatory part of a grouping key.
    pub fn job(&self) -> Option<&str> {
        self.get(JOB_LABEL)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True for `{job="…", instance=""}`, the one grouping key the gateway
    /// fails to match on deletion.
    pub fn has_only_empty_instance(&self) -> bool {
        self.len() == 2 && self.job().is_some() && self.get(INSTANCE_LABEL) == Some("")
    }
}

impl<K, V> FromIterator<(K, V)> for LabelSet
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl fmt::Display for LabelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{{}}}",
            self.0.iter().map(|(k, v)| format!("{k}={v:?}")).join(", ")
        )
    }
}
