use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{RecvTimeoutError, Sender};
use tracing::{error, info, warn};

use crate::error::{MonitorError, RestartError};
use crate::worker::{Worker, WorkerHealthConfig, WorkerRegistry};

/// Hook invoked for workers demoted while `auto_restart` is on.
pub trait WorkerRestarter: Send + Sync + 'static {
    fn restart(&self, worker: &Worker) -> Result<(), RestartError>;
}

struct MonitorThread {
    shutdown_tx: Sender<()>,
    handle: thread::JoinHandle<()>,
}

/// Periodically scans the registry on a dedicated thread and demotes
/// workers that stopped sending heartbeats.
pub struct HeartbeatMonitor {
    registry: Arc<WorkerRegistry>,
    config: WorkerHealthConfig,
    restarter: Option<Arc<dyn WorkerRestarter>>,
    thread: Option<MonitorThread>,
}

impl HeartbeatMonitor {
    pub fn new(registry: Arc<WorkerRegistry>, config: WorkerHealthConfig) -> Self {
        Self {
            registry,
            config,
            restarter: None,
            thread: None,
        }
    }

    pub fn with_restarter(mut self, restarter: Arc<dyn WorkerRestarter>) -> Self {
        self.restarter = Some(restarter);
        self
    }

    pub fn is_running(&self) -> bool {
        self.thread.is_some()
    }

    pub fn start(&mut self) -> Result<(), MonitorError> {
        if self.thread.is_some() {
            return Err(MonitorError::AlreadyRunning);
        }
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);
        let registry = Arc::clone(&self.registry);
        let config = self.config.clone();
        let restarter = self.restarter.clone();
        let interval = Duration::from_millis(config.check_interval_ms.max(1));

        let handle = thread::Builder::new()
            .name("nimbus-heartbeat".to_string())
            .spawn(move || loop {
                match shutdown_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        scan(&registry, &config, restarter.as_deref(), crate::now_ms());
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })
            .map_err(|e| MonitorError::Spawn(e.to_string()))?;

        info!(interval_ms = self.config.check_interval_ms, "heartbeat monitor started");
        self.thread = Some(MonitorThread {
            shutdown_tx,
            handle,
        });
        Ok(())
    }

    /// Stop the monitor thread. Stopping a stopped monitor is a no-op.
    pub fn stop(&mut self) -> Result<(), MonitorError> {
        let Some(running) = self.thread.take() else {
            return Ok(());
        };
        let _ = running.shutdown_tx.send(());
        running.handle.join().map_err(|_| MonitorError::Panicked)?;
        info!("heartbeat monitor stopped");
        Ok(())
    }

    /// Run a single scan at `now`. Returns the number of workers demoted.
    pub fn check_once(&self, now: u64) -> usize {
        scan(&self.registry, &self.config, self.restarter.as_deref(), now)
    }
}

impl Drop for HeartbeatMonitor {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// The registry lock is released before any restart hook runs.
fn scan(
    registry: &WorkerRegistry,
    config: &WorkerHealthConfig,
    restarter: Option<&dyn WorkerRestarter>,
    now: u64,
) -> usize {
    let demoted = registry.check_heartbeats(now, config);
    if !config.auto_restart {
        return demoted.len();
    }
    let Some(restarter) = restarter else {
        if !demoted.is_empty() {
            warn!(count = demoted.len(), "auto_restart enabled but no restarter configured");
        }
        return demoted.len();
    };
    for worker in &demoted {
        info!(worker_id = %worker.id, "restarting unhealthy worker");
        if let Err(e) = restarter.restart(worker) {
            error!(worker_id = %worker.id, error = %e, "worker restart failed");
        }
    }
    demoted.len()
}
