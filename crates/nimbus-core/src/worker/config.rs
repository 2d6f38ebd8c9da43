use serde::Deserialize;

/// `[workers]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Concurrency for workers registered without one, including workers
    /// added by scaling.
    pub default_concurrency: u32,
    pub health: WorkerHealthConfig,
    pub scaling: ScalingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerHealthConfig {
    pub check_interval_ms: u64,
    /// Consecutive missed checks before a worker is marked inactive.
    pub unhealthy_threshold: u32,
    pub auto_restart: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScalingConfig {
    pub enabled: bool,
    pub min_workers: usize,
    pub max_workers: usize,
    /// Depth beyond the serving workers' combined concurrency above which
    /// one worker is added.
    pub scale_up_threshold: u64,
    /// Queue depth below which one worker is removed.
    pub scale_down_threshold: u64,
    pub cooldown_secs: u64,
    /// How often the server evaluates every queue.
    pub evaluation_interval_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            default_concurrency: 10,
            health: WorkerHealthConfig::default(),
            scaling: ScalingConfig::default(),
        }
    }
}

impl Default for WorkerHealthConfig {
    fn default() -> Self {
        Self {
            check_interval_ms: 60_000,
            unhealthy_threshold: 3,
            auto_restart: false,
        }
    }
}

impl Default for ScalingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            min_workers: 1,
            max_workers: 10,
            scale_up_threshold: 100,
            scale_down_threshold: 10,
            cooldown_secs: 300,
            evaluation_interval_ms: 30_000,
        }
    }
}
