use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info};

use crate::worker::{ScaleResult, ScalingConfig, WorkerRegistry};

/// Target worker count from queue depth and the capacity already serving
/// it. Moves one worker at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScalingPolicy {
    pub min_workers: usize,
    pub max_workers: usize,
    pub scale_up_threshold: u64,
    pub scale_down_threshold: u64,
}

impl ScalingPolicy {
    pub fn from_config(config: &ScalingConfig) -> Self {
        Self {
            min_workers: config.min_workers,
            max_workers: config.max_workers,
            scale_up_threshold: config.scale_up_threshold,
            scale_down_threshold: config.scale_down_threshold,
        }
    }

    /// Scale up while the backlog beyond `capacity` exceeds the up
    /// threshold; scale down once depth alone falls under the down
    /// threshold.
    pub fn target(&self, depth: u64, capacity: u64, current: usize) -> usize {
        let lag = depth.saturating_sub(capacity);
        let desired = if lag > self.scale_up_threshold {
            current.saturating_add(1)
        } else if depth < self.scale_down_threshold {
            current.saturating_sub(1)
        } else {
            current
        };
        let max = self.max_workers.max(self.min_workers);
        desired.clamp(self.min_workers, max)
    }
}

/// Applies the scaling policy to queues, at most once per cooldown per
/// queue.
pub struct Autoscaler {
    registry: Arc<WorkerRegistry>,
    policy: ScalingPolicy,
    enabled: bool,
    cooldown_ms: u64,
    last_scaled: Mutex<HashMap<String, u64>>,
}

impl Autoscaler {
    pub fn new(registry: Arc<WorkerRegistry>, config: &ScalingConfig) -> Self {
        Self {
            registry,
            policy: ScalingPolicy::from_config(config),
            enabled: config.enabled,
            cooldown_ms: config.cooldown_secs.saturating_mul(1000),
            last_scaled: Mutex::new(HashMap::new()),
        }
    }

    pub fn evaluate(&self, queue: &str, depth: u64) -> Option<ScaleResult> {
        self.evaluate_at(queue, depth, crate::now_ms())
    }

    /// Scale the workers serving `queue` for the observed `depth`. Returns
    /// None when disabled, cooling down or already at target.
    pub fn evaluate_at(&self, queue: &str, depth: u64, now: u64) -> Option<ScaleResult> {
        if !self.enabled {
            return None;
        }
        let mut last_scaled = self
            .last_scaled
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(&at) = last_scaled.get(queue) {
            if now.saturating_sub(at) < self.cooldown_ms {
                debug!(%queue, "scaling cooldown active");
                return None;
            }
        }

        let current = self.registry.worker_count(queue);
        let capacity = self.registry.capacity(queue);
        let target = self.policy.target(depth, capacity, current);
        if target == current {
            return None;
        }
        let result = self.registry.scale_at(queue, target, now);
        last_scaled.insert(queue.to_string(), now);
        info!(%queue, depth, capacity, current, target, "autoscaler adjusted workers");
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::WorkerConfig;

    fn policy() -> ScalingPolicy {
        ScalingPolicy::from_config(&ScalingConfig {
            min_workers: 1,
            max_workers: 3,
            ..Default::default()
        })
    }

    #[test]
    fn target_follows_thresholds() {
        let p = policy();
        assert_eq!(p.target(500, 0, 1), 2);
        assert_eq!(p.target(50, 0, 2), 2);
        assert_eq!(p.target(5, 0, 2), 1);
    }

    #[test]
    fn capacity_absorbs_depth_before_scaling_up() {
        let p = policy();
        // 500 deep, 450 of it covered: lag 50 stays under the threshold.
        assert_eq!(p.target(500, 450, 2), 2);
        assert_eq!(p.target(500, 399, 2), 3);
        // Scale-down looks at depth, not lag.
        assert_eq!(p.target(5, 1_000, 3), 2);
    }

    #[test]
    fn target_is_clamped() {
        let p = policy();
        assert_eq!(p.target(500, 0, 3), 3);
        assert_eq!(p.target(0, 0, 1), 1);
        assert_eq!(p.target(50, 0, 0), 1);
        assert_eq!(p.target(50, 0, 7), 3);
    }

    #[test]
    fn inverted_bounds_do_not_panic() {
        let p = ScalingPolicy {
            min_workers: 5,
            max_workers: 2,
            scale_up_threshold: 100,
            scale_down_threshold: 10,
        };
        assert_eq!(p.target(50, 0, 0), 5);
    }

    fn autoscaler(enabled: bool) -> (Arc<WorkerRegistry>, Autoscaler) {
        let registry = Arc::new(WorkerRegistry::new(&WorkerConfig::default()));
        let config = ScalingConfig {
            enabled,
            min_workers: 1,
            max_workers: 3,
            cooldown_secs: 60,
            ..Default::default()
        };
        let scaler = Autoscaler::new(registry.clone(), &config);
        (registry, scaler)
    }

    #[test]
    fn evaluate_scales_and_respects_cooldown() {
        let (registry, scaler) = autoscaler(true);

        let first = scaler.evaluate_at("orders", 500, 0).unwrap();
        assert_eq!(first.target_count, 1);
        assert_eq!(registry.worker_count("orders"), 1);

        assert!(scaler.evaluate_at("orders", 500, 30_000).is_none());
        assert_eq!(registry.worker_count("orders"), 1);

        let second = scaler.evaluate_at("orders", 500, 60_000).unwrap();
        assert_eq!(second.previous_count, 1);
        assert_eq!(second.target_count, 2);

        // Two workers of concurrency 10 cover 20; lag 95 holds steady.
        assert!(scaler.evaluate_at("orders", 115, 120_000).is_none());
        assert_eq!(registry.worker_count("orders"), 2);

        // Cooldown is per queue.
        assert!(scaler.evaluate_at("emails", 500, 60_001).is_some());
    }

    #[test]
    fn evaluate_is_noop_when_disabled_or_at_target() {
        let (registry, scaler) = autoscaler(false);
        assert!(scaler.evaluate_at("orders", 500, 0).is_none());
        assert_eq!(registry.worker_count("orders"), 0);

        let (registry, scaler) = autoscaler(true);
        registry.scale("orders", 2);
        assert!(scaler.evaluate_at("orders", 50, 0).is_none());
    }
}
