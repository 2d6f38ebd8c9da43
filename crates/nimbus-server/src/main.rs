use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use nimbus_core::{Autoscaler, Broker, HeartbeatMonitor, NimbusConfig, WorkerRegistry};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

const CONFIG_PATHS: [&str; 2] = ["nimbus.toml", "/etc/nimbus/nimbus.toml"];

fn read_config(path: &Path) -> Result<NimbusConfig, Box<dyn std::error::Error>> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| format!("error reading {}: {e}", path.display()))?;
    let config = NimbusConfig::from_toml_str(&contents)
        .map_err(|e| format!("error parsing {}: {e}", path.display()))?;
    info!(path = %path.display(), "loaded configuration");
    Ok(config)
}

/// `NIMBUS_CONFIG` names an explicit file, which must exist. Otherwise the
/// first of the default paths that exists is used, or the defaults.
fn load_config() -> Result<NimbusConfig, Box<dyn std::error::Error>> {
    if let Some(path) = std::env::var_os("NIMBUS_CONFIG") {
        return read_config(&PathBuf::from(path));
    }
    for path in CONFIG_PATHS.iter().map(Path::new) {
        if path.exists() {
            return read_config(path);
        }
    }
    info!("no config file found, using defaults");
    Ok(NimbusConfig::default())
}

/// Periodically feed every queue's depth to the autoscaler until
/// `shutdown` flips.
async fn run_autoscaler(
    broker: Arc<Broker>,
    autoscaler: Autoscaler,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => break,
        }

        let queues = match broker.list_queues().await {
            Ok(queues) => queues,
            Err(e) => {
                warn!(error = %e, "autoscaler could not list queues");
                continue;
            }
        };
        for queue in queues {
            if let Some(result) = autoscaler.evaluate(&queue.config.name, queue.stats.depth) {
                debug!(
                    queue = %result.queue,
                    added = result.added.len(),
                    removed = result.removed.len(),
                    "autoscaler pass applied"
                );
            }
        }
    }
    info!("autoscaler stopped");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    nimbus_core::telemetry::init_tracing("info");

    let config = load_config()?;
    let NimbusConfig { broker, workers } = config;

    let broker = Arc::new(Broker::new(broker)?);
    let registry = Arc::new(WorkerRegistry::new(&workers));

    let mut monitor = HeartbeatMonitor::new(Arc::clone(&registry), workers.health.clone());
    monitor.start()?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let autoscaler_task = if workers.scaling.enabled {
        let autoscaler = Autoscaler::new(Arc::clone(&registry), &workers.scaling);
        let interval = Duration::from_millis(workers.scaling.evaluation_interval_ms.max(1));
        info!(interval_ms = workers.scaling.evaluation_interval_ms, "autoscaler started");
        Some(tokio::spawn(run_autoscaler(
            Arc::clone(&broker),
            autoscaler,
            interval,
            shutdown_rx,
        )))
    } else {
        None
    };

    info!("nimbus running");
    shutdown_signal().await;

    let _ = shutdown_tx.send(true);
    if let Some(task) = autoscaler_task {
        task.await?;
    }
    monitor.stop()?;

    match Arc::try_unwrap(broker) {
        Ok(broker) => broker.shutdown()?,
        // Drop still stops the scheduler once the last handle goes.
        Err(_) => warn!("broker still shared at shutdown"),
    }

    info!("nimbus stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {},
                    _ = sigterm.recv() => {},
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler, waiting for ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = ctrl_c.await {
            warn!(error = %e, "failed to listen for ctrl-c");
        }
    }

    info!("received shutdown signal");
}
