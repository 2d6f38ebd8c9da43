//! Worker pool bookkeeping: registration, heartbeats, health and scaling.
//!
//! The registry is a plain table behind one mutex. Foreground calls and
//! the heartbeat monitor thread take the same lock, so a worker's miss
//! counter and status always change together.

pub mod autoscale;
pub mod config;
pub mod heartbeat;

use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::WorkerError;
use crate::metrics::Metrics;

pub use autoscale::{Autoscaler, ScalingPolicy};
pub use config::{ScalingConfig, WorkerConfig, WorkerHealthConfig};
pub use heartbeat::{HeartbeatMonitor, WorkerRestarter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Active,
    Idle,
    Processing,
    Inactive,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Worker {
    pub id: Uuid,
    pub name: String,
    pub queues: BTreeSet<String>,
    pub concurrency: u32,
    pub status: WorkerStatus,
    pub registered_at: u64,
    /// Registration order; scaling removes the lowest first.
    pub registration_seq: u64,
    pub last_heartbeat: u64,
    pub missed_heartbeats: u32,
    pub processed_count: u64,
    pub failed_count: u64,
}

impl Worker {
    pub fn serves(&self, queue: &str) -> bool {
        self.queues.contains(queue)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WorkerSpec {
    /// Generated (UUIDv7) when absent.
    pub id: Option<Uuid>,
    pub name: String,
    pub queues: Vec<String>,
    pub concurrency: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WorkerPatch {
    pub name: Option<String>,
    pub queues: Option<Vec<String>>,
    pub concurrency: Option<u32>,
    pub status: Option<WorkerStatus>,
}

#[derive(Debug, Clone, Default)]
pub struct WorkerFilter {
    pub queue: Option<String>,
    pub status: Option<WorkerStatus>,
}

impl WorkerFilter {
    fn matches(&self, worker: &Worker) -> bool {
        self.queue.as_deref().map_or(true, |q| worker.serves(q))
            && self.status.map_or(true, |s| worker.status == s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScaleResult {
    pub queue: String,
    pub previous_count: usize,
    pub target_count: usize,
    pub added: Vec<Uuid>,
    pub removed: Vec<Uuid>,
}

#[derive(Default)]
struct WorkerTable {
    workers: HashMap<Uuid, Worker>,
    next_seq: u64,
}

impl WorkerTable {
    fn insert(&mut self, spec: WorkerSpec, concurrency: u32, now: u64) -> Worker {
        self.next_seq += 1;
        let worker = Worker {
            id: spec.id.unwrap_or_else(Uuid::now_v7),
            name: spec.name,
            queues: spec.queues.into_iter().collect(),
            concurrency,
            status: WorkerStatus::Active,
            registered_at: now,
            registration_seq: self.next_seq,
            last_heartbeat: now,
            missed_heartbeats: 0,
            processed_count: 0,
            failed_count: 0,
        };
        self.workers.insert(worker.id, worker.clone());
        worker
    }

    /// Workers matching `filter`, in registration order.
    fn select(&self, filter: &WorkerFilter) -> Vec<&Worker> {
        let mut selected: Vec<&Worker> = self
            .workers
            .values()
            .filter(|w| filter.matches(w))
            .collect();
        selected.sort_by_key(|w| w.registration_seq);
        selected
    }
}

pub struct WorkerRegistry {
    table: Mutex<WorkerTable>,
    default_concurrency: u32,
    metrics: Metrics,
}

impl WorkerRegistry {
    pub fn new(config: &WorkerConfig) -> Self {
        Self::with_metrics(config, Metrics::new())
    }

    pub fn with_metrics(config: &WorkerConfig, metrics: Metrics) -> Self {
        Self {
            table: Mutex::new(WorkerTable::default()),
            default_concurrency: config.default_concurrency.max(1),
            metrics,
        }
    }

    /// A panic while holding the lock cannot leave the table half-updated
    /// in a way later calls care about, so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, WorkerTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(&self, spec: WorkerSpec) -> Result<Worker, WorkerError> {
        self.register_at(spec, crate::now_ms())
    }

    pub fn register_at(&self, spec: WorkerSpec, now: u64) -> Result<Worker, WorkerError> {
        let concurrency = spec.concurrency.unwrap_or(self.default_concurrency);
        if concurrency == 0 {
            return Err(WorkerError::InvalidConcurrency);
        }
        let mut table = self.lock();
        if let Some(id) = spec.id {
            if table.workers.contains_key(&id) {
                return Err(WorkerError::WorkerAlreadyExists(id));
            }
        }
        let worker = table.insert(spec, concurrency, now);
        info!(worker_id = %worker.id, name = %worker.name, "worker registered");
        Ok(worker)
    }

    pub fn get_status(&self, id: Uuid) -> Result<Worker, WorkerError> {
        self.lock()
            .workers
            .get(&id)
            .cloned()
            .ok_or(WorkerError::WorkerNotFound(id))
    }

    pub fn list(&self, filter: &WorkerFilter) -> Vec<Worker> {
        self.lock().select(filter).into_iter().cloned().collect()
    }

    pub fn update(&self, id: Uuid, patch: WorkerPatch) -> Result<Worker, WorkerError> {
        if patch.concurrency == Some(0) {
            return Err(WorkerError::InvalidConcurrency);
        }
        let mut table = self.lock();
        let worker = table
            .workers
            .get_mut(&id)
            .ok_or(WorkerError::WorkerNotFound(id))?;
        if let Some(name) = patch.name {
            worker.name = name;
        }
        if let Some(queues) = patch.queues {
            worker.queues = queues.into_iter().collect();
        }
        if let Some(concurrency) = patch.concurrency {
            worker.concurrency = concurrency;
        }
        if let Some(status) = patch.status {
            worker.status = status;
        }
        info!(worker_id = %id, "worker updated");
        Ok(worker.clone())
    }

    pub fn deregister(&self, id: Uuid) -> Result<Worker, WorkerError> {
        let worker = self
            .lock()
            .workers
            .remove(&id)
            .ok_or(WorkerError::WorkerNotFound(id))?;
        info!(worker_id = %id, "worker deregistered");
        Ok(worker)
    }

    pub fn heartbeat(&self, id: Uuid) -> Result<(), WorkerError> {
        self.heartbeat_at(id, crate::now_ms())
    }

    /// Refresh the heartbeat, clear missed beats and revive an inactive
    /// worker.
    pub fn heartbeat_at(&self, id: Uuid, now: u64) -> Result<(), WorkerError> {
        let mut table = self.lock();
        let worker = table
            .workers
            .get_mut(&id)
            .ok_or(WorkerError::WorkerNotFound(id))?;
        worker.last_heartbeat = now;
        worker.missed_heartbeats = 0;
        if worker.status == WorkerStatus::Inactive {
            worker.status = WorkerStatus::Active;
            info!(worker_id = %id, "worker reactivated by heartbeat");
        }
        Ok(())
    }

    pub fn record_result(&self, id: Uuid, success: bool) -> Result<(), WorkerError> {
        let mut table = self.lock();
        let worker = table
            .workers
            .get_mut(&id)
            .ok_or(WorkerError::WorkerNotFound(id))?;
        if success {
            worker.processed_count += 1;
        } else {
            worker.failed_count += 1;
        }
        Ok(())
    }

    /// Total concurrency of healthy workers subscribed to `queue`.
    pub fn capacity(&self, queue: &str) -> u64 {
        self.lock()
            .workers
            .values()
            .filter(|w| w.serves(queue) && w.status != WorkerStatus::Inactive)
            .map(|w| u64::from(w.concurrency))
            .sum()
    }

    /// Number of workers subscribed to `queue`, whatever their status.
    pub fn worker_count(&self, queue: &str) -> usize {
        self.lock().workers.values().filter(|w| w.serves(queue)).count()
    }

    pub fn scale(&self, queue: &str, target: usize) -> ScaleResult {
        self.scale_at(queue, target, crate::now_ms())
    }

    /// Add synthetic workers or remove the oldest-registered ones until
    /// exactly `target` workers serve `queue`.
    pub fn scale_at(&self, queue: &str, target: usize, now: u64) -> ScaleResult {
        let mut table = self.lock();
        let filter = WorkerFilter {
            queue: Some(queue.to_string()),
            status: None,
        };
        let current: Vec<Uuid> = table.select(&filter).iter().map(|w| w.id).collect();
        let previous_count = current.len();
        let mut added = Vec::new();
        let mut removed = Vec::new();

        if target > previous_count {
            for _ in previous_count..target {
                // Suffix is the registration sequence, never reused.
                let seq = table.next_seq + 1;
                let spec = WorkerSpec {
                    id: None,
                    name: format!("worker-{queue}-{seq}"),
                    queues: vec![queue.to_string()],
                    concurrency: None,
                };
                added.push(table.insert(spec, self.default_concurrency, now).id);
            }
        } else {
            for id in current.iter().take(previous_count - target) {
                table.workers.remove(id);
                removed.push(*id);
            }
        }
        drop(table);

        self.metrics.record_workers_scaled(queue, "up", added.len() as u64);
        self.metrics.record_workers_scaled(queue, "down", removed.len() as u64);
        if previous_count != target {
            info!(%queue, previous_count, target, "workers scaled");
        }
        ScaleResult {
            queue: queue.to_string(),
            previous_count,
            target_count: target,
            added,
            removed,
        }
    }

    /// One health pass. A worker whose last heartbeat is older than two
    /// check intervals accrues a miss; a fresh one has its misses cleared.
    /// Returns workers that crossed the threshold and were marked inactive
    /// by this pass.
    pub fn check_heartbeats(&self, now: u64, config: &WorkerHealthConfig) -> Vec<Worker> {
        let stale_after = config.check_interval_ms.saturating_mul(2);
        let threshold = config.unhealthy_threshold.max(1);
        let mut demoted = Vec::new();

        let mut table = self.lock();
        for worker in table.workers.values_mut() {
            if now.saturating_sub(worker.last_heartbeat) <= stale_after {
                worker.missed_heartbeats = 0;
                continue;
            }
            if worker.status == WorkerStatus::Inactive {
                continue;
            }
            worker.missed_heartbeats += 1;
            debug!(worker_id = %worker.id, missed = worker.missed_heartbeats, "heartbeat missed");
            if worker.missed_heartbeats >= threshold {
                worker.status = WorkerStatus::Inactive;
                warn!(worker_id = %worker.id, missed = worker.missed_heartbeats, "worker unhealthy, marking inactive");
                demoted.push(worker.clone());
            }
        }
        drop(table);

        for _ in &demoted {
            self.metrics.record_worker_demoted();
        }
        demoted.sort_by_key(|w| w.registration_seq);
        demoted
    }
}
