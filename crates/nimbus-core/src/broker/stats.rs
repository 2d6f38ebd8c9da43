use serde::Serialize;

use crate::queue::QueueConfig;

/// Aggregate stats for a single queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    /// Buffered messages, including delayed ones not yet available.
    pub depth: u64,
    pub in_flight: u64,
    pub published: u64,
    /// Leases granted.
    pub consumed: u64,
    pub acknowledged: u64,
    pub dead_lettered: u64,
    /// Discarded by the retention sweep.
    pub expired: u64,
    pub paused: bool,
}

/// A queue definition together with its runtime state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueInfo {
    pub config: QueueConfig,
    pub paused: bool,
    pub created_at: u64,
    pub updated_at: u64,
    pub stats: QueueStats,
}
