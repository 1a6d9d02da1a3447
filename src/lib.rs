//! Redis Sentinel failover-time exporter
//!
//! Watches the master address each monitored sentinel group reports and
//! measures how long a failover takes to settle, publishing the result as a
//! pull-based metric.
//!
//! Pieces:
//! - Failover detection state machine with per-group debounce
//! - Gauge registry rendered in the text exposition format
//! - One poll task per group, isolated from the others
//! - Minimal HTTP endpoint for scrapers

pub mod cli;
pub mod config;
pub mod detector;
pub mod error;
pub mod exporter;
pub mod exporter_main;
pub mod logging;
pub mod query;
pub mod registry;
pub mod resp;
pub mod scheduler;

pub use config::{ExporterConfig, MonitoredGroup};
pub use detector::{FailoverDetector, Observation};
pub use error::{Error, Result};
pub use registry::MetricsRegistry;
pub use scheduler::PollScheduler;
