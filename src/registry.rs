//! Metrics registry and publisher
//!
//! A custom prometheus registry holding a single gauge family,
//! `failover_time{namespace="..."}`: the last measured failover duration in
//! seconds for each monitored group. No default process collectors are
//! attached; scrapers see exactly one family.
//!
//! Every known group is zero-initialized at startup, so the absence of a
//! failover reads as a zero duration rather than a missing series. Gauge
//! writes are atomic per child, which gives the per-group linearizability
//! the concurrent scheduler writers and HTTP readers need.

use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};

use crate::error::Result;

/// Metric name served to scrapers
pub const METRIC_NAME: &str = "failover_time";

/// Label carrying the group identity
pub const NAMESPACE_LABEL: &str = "namespace";

const METRIC_HELP: &str = "Redis Sentinel failover duration (seconds)";

/// Shared registry: schedulers write, the HTTP exporter reads.
pub struct MetricsRegistry {
    registry: Registry,
    failover_time: GaugeVec,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let failover_time = GaugeVec::new(
            Opts::new(METRIC_NAME, METRIC_HELP),
            &[NAMESPACE_LABEL],
        )?;
        registry.register(Box::new(failover_time.clone()))?;

        Ok(Self {
            registry,
            failover_time,
        })
    }

    /// Make a group's series visible with an initial zero value.
    pub fn register_group(&self, namespace: &str) {
        self.failover_time.with_label_values(&[namespace]).set(0.0);
    }

    /// Overwrite the last measured duration for a group.
    pub fn set_duration(&self, namespace: &str, seconds: f64) {
        self.failover_time
            .with_label_values(&[namespace])
            .set(seconds);
    }

    /// Render the full text exposition body.
    pub fn render(&self) -> Result<String> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}
