//! Exporter configuration
//!
//! Plain data types describing what to monitor and how often. Built once at
//! startup from the CLI surface; immutable afterwards. Dynamic add/remove of
//! groups at runtime is not supported (restart required).

use std::collections::HashSet;
use std::time::Duration;

use crate::error::{Error, Result};

/// Default Redis Sentinel port
pub const DEFAULT_SENTINEL_PORT: u16 = 26379;

/// Default logical master name queried on each tick
pub const DEFAULT_MASTER_NAME: &str = "mymaster";

/// Default interval between polls (milliseconds)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 200;

/// Default number of consecutive agreeing observations confirming a failover
pub const DEFAULT_STABLE_THRESHOLD: u32 = 3;

/// Default per-query timeout (milliseconds)
pub const DEFAULT_QUERY_TIMEOUT_MS: u64 = 500;

/// Default metrics listen address
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:9121";

/// One sentinel quorum group to monitor
#[derive(Debug, Clone)]
pub struct MonitoredGroup {
    /// Metric namespace identifying the group
    pub namespace: String,
    /// Sentinel endpoints, tried in order on each query
    pub endpoints: Vec<(String, u16)>,
    /// Logical master name known to the sentinels
    pub master_name: String,
    /// Per-query connect/read timeout
    pub query_timeout: Duration,
}

impl MonitoredGroup {
    pub fn new(
        namespace: String,
        endpoints: Vec<(String, u16)>,
        master_name: String,
        query_timeout: Duration,
    ) -> Self {
        Self {
            namespace,
            endpoints,
            master_name,
            query_timeout,
        }
    }
}

/// Full exporter configuration
#[derive(Debug, Clone)]
pub struct ExporterConfig {
    /// Groups to monitor
    pub groups: Vec<MonitoredGroup>,
    /// Interval between polls, per group
    pub poll_interval: Duration,
    /// Consecutive agreeing observations required to confirm a failover
    pub stable_threshold: u32,
    /// Metrics HTTP listen address
    pub listen_addr: String,
    /// Log level (debug, verbose, notice, warning, nothing)
    pub loglevel: String,
    /// Log file path (empty logs to stderr)
    pub logfile: String,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            groups: Vec::new(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            stable_threshold: DEFAULT_STABLE_THRESHOLD,
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            loglevel: "notice".to_string(),
            logfile: String::new(),
        }
    }
}

impl ExporterConfig {
    /// Check the configuration before startup; a bad configuration is fatal.
    pub fn validate(&self) -> Result<()> {
        if self.groups.is_empty() {
            return Err(Error::Config("no sentinel groups configured".to_string()));
        }
        if self.stable_threshold == 0 {
            return Err(Error::Config("stable threshold must be at least 1".to_string()));
        }
        if self.poll_interval < Duration::from_millis(1) {
            return Err(Error::Config("poll interval must be at least 1ms".to_string()));
        }

        let mut seen = HashSet::new();
        for group in &self.groups {
            if group.namespace.is_empty() {
                return Err(Error::Config("group namespace must not be empty".to_string()));
            }
            if group.endpoints.is_empty() {
                return Err(Error::Config(format!(
                    "group '{}' has no sentinel endpoints",
                    group.namespace
                )));
            }
            if !seen.insert(group.namespace.as_str()) {
                return Err(Error::Config(format!(
                    "duplicate group namespace '{}'",
                    group.namespace
                )));
            }
        }
        Ok(())
    }
}

/// Derive a group's metric namespace from its sentinel hostname.
///
/// The final dot-separated label is the namespace, so
/// `redis-sentinel.redis-i1` maps to `redis-i1`. A bare hostname is its own
/// namespace.
pub fn namespace_for_host(host: &str) -> &str {
    host.rsplit('.').next().unwrap_or(host)
}

/// Parse a `host[:port]` endpoint, defaulting to the sentinel port.
pub fn parse_endpoint(spec: &str) -> Result<(String, u16)> {
    match spec.rsplit_once(':') {
        Some((host, port)) => {
            if host.is_empty() {
                return Err(Error::Config(format!("invalid endpoint '{}'", spec)));
            }
            let port = port
                .parse::<u16>()
                .map_err(|_| Error::Config(format!("invalid port in endpoint '{}'", spec)))?;
            Ok((host.to_string(), port))
        }
        None if !spec.is_empty() => Ok((spec.to_string(), DEFAULT_SENTINEL_PORT)),
        None => Err(Error::Config("empty endpoint".to_string())),
    }
}
