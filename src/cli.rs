use std::time::Duration;

use clap::Parser;

use crate::config::{
    self, ExporterConfig, MonitoredGroup, DEFAULT_LISTEN_ADDR, DEFAULT_MASTER_NAME,
    DEFAULT_POLL_INTERVAL_MS, DEFAULT_QUERY_TIMEOUT_MS, DEFAULT_STABLE_THRESHOLD,
};
use crate::error::Result;

#[derive(Parser, Debug)]
#[command(name = "sentinel-exporter")]
#[command(version)]
#[command(about = "Measures Redis Sentinel failover duration and exposes it for scraping", long_about = None)]
pub struct Cli {
    /// Sentinel endpoint to monitor, host[:port]; repeatable, one group per
    /// endpoint, with the group namespace taken from the hostname's final
    /// dot-separated label
    #[arg(long = "sentinel", value_name = "HOST[:PORT]", required = true)]
    pub sentinels: Vec<String>,

    /// Logical master name to query
    #[arg(long, default_value = DEFAULT_MASTER_NAME)]
    pub master_name: String,

    /// Poll interval in milliseconds
    #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL_MS)]
    pub poll_interval_ms: u64,

    /// Consecutive agreeing observations required to confirm a failover
    #[arg(long, default_value_t = DEFAULT_STABLE_THRESHOLD)]
    pub stable_threshold: u32,

    /// Per-query timeout in milliseconds
    #[arg(long, default_value_t = DEFAULT_QUERY_TIMEOUT_MS)]
    pub query_timeout_ms: u64,

    /// Metrics listen address
    #[arg(long, default_value = DEFAULT_LISTEN_ADDR)]
    pub listen: String,

    /// Log level (debug, verbose, notice, warning, nothing)
    #[arg(long, default_value = "notice")]
    pub loglevel: String,

    /// Log file path (empty logs to stderr)
    #[arg(long, default_value = "")]
    pub logfile: String,
}

impl Cli {
    /// Build and validate the exporter configuration.
    pub fn into_config(self) -> Result<ExporterConfig> {
        let query_timeout = Duration::from_millis(self.query_timeout_ms);

        let mut groups = Vec::with_capacity(self.sentinels.len());
        for spec in &self.sentinels {
            let (host, port) = config::parse_endpoint(spec)?;
            let namespace = config::namespace_for_host(&host).to_string();
            groups.push(MonitoredGroup::new(
                namespace,
                vec![(host, port)],
                self.master_name.clone(),
                query_timeout,
            ));
        }

        let cfg = ExporterConfig {
            groups,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            stable_threshold: self.stable_threshold,
            listen_addr: self.listen,
            loglevel: self.loglevel,
            logfile: self.logfile,
        };
        cfg.validate()?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_group_per_sentinel_flag() {
        let cli = Cli::parse_from([
            "sentinel-exporter",
            "--sentinel",
            "redis-sentinel.redis-i1",
            "--sentinel",
            "redis-sentinel.redis-i2:26380",
        ]);
        let cfg = cli.into_config().unwrap();

        assert_eq!(cfg.groups.len(), 2);
        assert_eq!(cfg.groups[0].namespace, "redis-i1");
        assert_eq!(cfg.groups[0].endpoints, vec![("redis-sentinel.redis-i1".to_string(), 26379)]);
        assert_eq!(cfg.groups[1].namespace, "redis-i2");
        assert_eq!(cfg.groups[1].endpoints[0].1, 26380);
        assert_eq!(cfg.groups[0].master_name, "mymaster");
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["sentinel-exporter", "--sentinel", "localhost"]);
        let cfg = cli.into_config().unwrap();

        assert_eq!(cfg.poll_interval, Duration::from_millis(200));
        assert_eq!(cfg.stable_threshold, 3);
        assert_eq!(cfg.listen_addr, "0.0.0.0:9121");
        assert_eq!(cfg.groups[0].query_timeout, Duration::from_millis(500));
    }

    #[test]
    fn test_bad_endpoint_is_rejected() {
        let cli = Cli::parse_from(["sentinel-exporter", "--sentinel", "host:notaport"]);
        assert!(cli.into_config().is_err());
    }

    #[test]
    fn test_duplicate_namespaces_are_rejected() {
        let cli = Cli::parse_from([
            "sentinel-exporter",
            "--sentinel",
            "a.same",
            "--sentinel",
            "b.same",
        ]);
        assert!(cli.into_config().is_err());
    }
}
