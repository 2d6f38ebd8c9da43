use serde::Deserialize;

use crate::broker::BrokerConfig;
use crate::worker::WorkerConfig;

/// Whole-process configuration: the broker sections at the top level plus
/// `[workers]`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NimbusConfig {
    #[serde(flatten)]
    pub broker: BrokerConfig,
    pub workers: WorkerConfig,
}

impl NimbusConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }
}
