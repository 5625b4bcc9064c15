// CONSENSUS ROUND CONFIGURATION
// Policy constants for committee dissemination and the bounded waits of a round.
//
// All committee members must run with identical cluster and forwarding
// constants: cluster plans and lookup forwarders are computed locally without
// coordination.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Prefix of environment variables that override file settings.
pub const ENV_PREFIX: &str = "DSNODE";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    /// Committee members per dissemination cluster
    pub cluster_capacity: usize,

    /// Nominal committee size used to place the lookup forwarding range
    pub comm_size: usize,

    /// Width of the lookup forwarding range
    pub tx_sharing_cluster_size: usize,

    /// How long an inbound consensus message may wait to become admissible
    pub message_order_window_ms: u64,

    /// How long an early message waits for the round's session to be created
    pub consensus_object_timeout_ms: u64,

    /// How long the committee waits for shard micro-blocks before moving on
    pub sharding_timeout_ms: u64,

    /// Permissive test network: refresh the shard whitelist after rotation
    pub test_net_mode: bool,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        ConsensusConfig {
            cluster_capacity: 20,
            comm_size: 20,
            tx_sharing_cluster_size: 10,
            message_order_window_ms: 5_000,
            consensus_object_timeout_ms: 10_000,
            sharding_timeout_ms: 60_000,
            test_net_mode: false,
        }
    }
}

impl ConsensusConfig {
    /// Load from a configuration file, then apply `DSNODE_*` environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;
        let loaded: ConsensusConfig = settings.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cluster_capacity == 0 {
            return Err(ConfigError::Invalid("cluster_capacity must be > 0".to_string()));
        }
        if self.comm_size == 0 {
            return Err(ConfigError::Invalid("comm_size must be > 0".to_string()));
        }
        if self.message_order_window_ms == 0 {
            return Err(ConfigError::Invalid("message_order_window_ms must be > 0".to_string()));
        }
        Ok(())
    }

    pub fn message_order_window(&self) -> Duration {
        Duration::from_millis(self.message_order_window_ms)
    }

    pub fn consensus_object_timeout(&self) -> Duration {
        Duration::from_millis(self.consensus_object_timeout_ms)
    }

    pub fn sharding_timeout(&self) -> Duration {
        Duration::from_millis(self.sharding_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_is_valid() {
        let config = ConsensusConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.message_order_window(), Duration::from_secs(5));
    }

    #[test]
    fn test_zero_cluster_capacity_rejected() {
        let config = ConsensusConfig {
            cluster_capacity: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_load_partial_file_keeps_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "cluster_capacity = 5").unwrap();
        writeln!(file, "test_net_mode = true").unwrap();
        file.flush().unwrap();

        let config = ConsensusConfig::load(file.path()).unwrap();

        assert_eq!(config.cluster_capacity, 5);
        assert!(config.test_net_mode);
        assert_eq!(config.sharding_timeout_ms, ConsensusConfig::default().sharding_timeout_ms);
    }
}
