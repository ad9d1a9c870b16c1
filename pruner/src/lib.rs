//! Removes stale groups from a Prometheus Pushgateway.
//!
//! A prune cycle scrapes the gateway's own `/metrics`, looks for groups whose
//! freshness metric (`push_time_seconds` by default) is older than a
//! threshold, and deletes those groups through the gateway's grouping-key API.
//! [`Scheduler`] repeats the cycle at a fixed cadence.

pub mod client;
pub mod config;
mod cycle;
mod error;
pub mod exposition;
pub mod filter;
pub mod group_url;
mod labels;
mod scheduler;

pub use {
    client::{GatewayClient, RetryPolicy},
    config::PruneConfig,
    cycle::{CycleReport, Pruner},
    error::{Error, RequestFailure, Result},
    labels::LabelSet,
    scheduler::Scheduler,
};
