//! Poll scheduling
//!
//! One task per monitored group, each running its own query-observe cycle at
//! the configured interval. A group's slow or failing endpoint only ever
//! delays that group's next tick; other groups keep their cadence.
//!
//! Shutdown goes through a watch channel: a task that receives the signal
//! finishes the tick in flight (the query completes or times out) and exits
//! without writing a partial metric.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{interval, MissedTickBehavior};

use crate::config::MonitoredGroup;
use crate::detector::{FailoverDetector, Observation};
use crate::query;
use crate::registry::MetricsRegistry;

pub struct PollScheduler {
    detector: Arc<FailoverDetector>,
    registry: Arc<MetricsRegistry>,
    poll_interval: Duration,
}

impl PollScheduler {
    pub fn new(
        detector: Arc<FailoverDetector>,
        registry: Arc<MetricsRegistry>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            detector,
            registry,
            poll_interval,
        }
    }

    /// Spawn one poll task per group into `tasks`.
    pub fn spawn_groups(
        &self,
        groups: Vec<MonitoredGroup>,
        tasks: &mut JoinSet<()>,
        shutdown: watch::Receiver<bool>,
    ) {
        for group in groups {
            tasks.spawn(Self::poll_group(
                self.detector.clone(),
                self.registry.clone(),
                group,
                self.poll_interval,
                shutdown.clone(),
            ));
        }
    }

    async fn poll_group(
        detector: Arc<FailoverDetector>,
        registry: Arc<MetricsRegistry>,
        group: MonitoredGroup,
        poll_interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        log::debug!(
            "[{}] polling every {:?} across {} endpoint(s)",
            group.namespace,
            poll_interval,
            group.endpoints.len()
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let observation = match query::query_master(&group).await {
                        Ok(addr) => Observation::Master(addr),
                        // No signal this tick; the state machine is not fed
                        // a master value it did not observe.
                        Err(_) => Observation::NoSignal,
                    };

                    if let Some(duration) = detector.observe(&group.namespace, observation) {
                        let seconds = duration.as_secs_f64();
                        registry.set_duration(&group.namespace, seconds);
                        log::info!(
                            "[{}] failover completed in {:.3}s",
                            group.namespace,
                            seconds
                        );
                    }
                }
                _ = shutdown.changed() => {
                    log::debug!("[{}] poll task stopping", group.namespace);
                    return;
                }
            }
        }
    }
}
