//! Exporter startup
//!
//! Wires the pieces together: registers every configured group with a zero
//! metric, performs the one-time initial master read per group, spawns the
//! poll tasks and the scrape server, then waits for shutdown.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::config::ExporterConfig;
use crate::detector::FailoverDetector;
use crate::error::Result;
use crate::exporter::MetricsServer;
use crate::query;
use crate::registry::MetricsRegistry;
use crate::scheduler::PollScheduler;

/// Run the exporter until shutdown.
pub async fn start_exporter(config: ExporterConfig) -> Result<()> {
    config.validate()?;

    let registry = Arc::new(MetricsRegistry::new()?);
    let detector = Arc::new(FailoverDetector::new(config.stable_threshold));

    // Registration pass. Every group gets a zero-valued series up front; a
    // group whose initial read fails stays visible at zero but is not
    // polled until the next restart.
    let mut active = Vec::new();
    for group in &config.groups {
        registry.register_group(&group.namespace);

        match query::query_master(group).await {
            Ok(master) => {
                log::info!(
                    "[{}] monitoring master '{}', currently at {}",
                    group.namespace,
                    group.master_name,
                    master
                );
                detector.register(&group.namespace, Some(master));
                active.push(group.clone());
            }
            Err(e) => {
                log::warn!(
                    "[{}] initial master read failed, group will not be polled: {}",
                    group.namespace,
                    e
                );
            }
        }
    }

    // A bind failure is fatal before any poll task starts.
    let listener = TcpListener::bind(&config.listen_addr).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks = JoinSet::new();

    let scheduler = PollScheduler::new(detector, registry.clone(), config.poll_interval);
    scheduler.spawn_groups(active, &mut tasks, shutdown_rx);

    let server = MetricsServer::new(registry);
    let mut server_task = tokio::spawn(async move { server.run(listener).await });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            log::info!("shutdown signal received");
        }
        result = &mut server_task => {
            match result {
                Ok(Ok(())) => log::info!("metrics server stopped"),
                Ok(Err(e)) => log::error!("metrics server failed: {}", e),
                Err(e) => log::error!("metrics server panicked: {}", e),
            }
        }
    }

    // Drain the poll tasks; each finishes its in-flight tick before exiting,
    // and the registry stays servable while they wind down.
    let _ = shutdown_tx.send(true);
    while tasks.join_next().await.is_some() {}
    server_task.abort();

    log::info!("exporter shut down");
    Ok(())
}
