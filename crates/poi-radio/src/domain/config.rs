//! Radio configuration.

use std::time::Duration;

use thiserror::Error;

use super::entities::DEFAULT_PUNITIVE_COST_MODEL;
use super::schedule::{DEFAULT_CADENCE, DEFAULT_COMPARE_LAG, DEFAULT_OFFSET};
use super::topic::Topic;
use super::validity::{MinimumStakeCache, NonceDirectory, REPLAY_WINDOW_MS};

/// Rejected configuration values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Cadence must be at least one block")]
    ZeroCadence,

    /// The comparison clears every bucket, so it must run before the next send round.
    #[error("Compare lag ({compare_lag}) must be shorter than the cadence ({cadence})")]
    CompareLagTooLong { compare_lag: u64, cadence: u64 },

    #[error("At least one outbound report must be allowed in flight")]
    ZeroInFlight,

    #[error("Nonce TTL ({nonce_ttl_ms}ms) is shorter than the replay window ({replay_window_ms}ms)")]
    NonceTtlTooShort {
        nonce_ttl_ms: u64,
        replay_window_ms: u64,
    },
}

/// Radio configuration.
#[derive(Clone, Debug)]
pub struct RadioConfig {
    /// Topic namespace (`graphcast`, or `graphcast-test` on test networks)
    pub namespace: String,
    /// Protocol version segment of the topic
    pub protocol_version: String,
    /// Application segment of the topic
    pub application: String,
    /// Encoding segment of the topic
    pub encoding: String,
    /// Deployment added to the tracked set regardless of allocations, for manual testing
    pub test_topic: Option<String>,
    /// Blocks between report rounds
    pub cadence: u64,
    /// Blocks between the current block and the reported block
    pub offset: u64,
    /// Blocks to wait for peer reports before comparing
    pub compare_lag: u64,
    /// Maximum report age in ms
    pub replay_window_ms: u64,
    /// Idle (sender, topic) pairs are forgotten after this many ms
    pub nonce_ttl_ms: u64,
    /// Minimum stake requirement refresh interval in ms
    pub min_stake_ttl_ms: u64,
    /// Outbound reports computed and published concurrently
    pub max_in_flight: usize,
    /// Upper bound on computing and publishing one report
    pub publish_timeout: Duration,
    /// Model pushed for a diverging deployment
    pub cost_model: String,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            namespace: "graphcast".to_string(),
            protocol_version: "0".to_string(),
            application: "poi-crosschecker".to_string(),
            encoding: "proto".to_string(),
            test_topic: None,
            cadence: DEFAULT_CADENCE,
            offset: DEFAULT_OFFSET,
            compare_lag: DEFAULT_COMPARE_LAG,
            replay_window_ms: REPLAY_WINDOW_MS,
            nonce_ttl_ms: NonceDirectory::DEFAULT_TTL_MS,
            min_stake_ttl_ms: MinimumStakeCache::DEFAULT_TTL_MS,
            max_in_flight: 8,
            publish_timeout: Duration::from_secs(10),
            cost_model: DEFAULT_PUNITIVE_COST_MODEL.to_string(),
        }
    }
}

impl RadioConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cadence == 0 {
            return Err(ConfigError::ZeroCadence);
        }
        if self.compare_lag >= self.cadence {
            return Err(ConfigError::CompareLagTooLong {
                compare_lag: self.compare_lag,
                cadence: self.cadence,
            });
        }
        if self.max_in_flight == 0 {
            return Err(ConfigError::ZeroInFlight);
        }
        if self.nonce_ttl_ms < self.replay_window_ms {
            return Err(ConfigError::NonceTtlTooShort {
                nonce_ttl_ms: self.nonce_ttl_ms,
                replay_window_ms: self.replay_window_ms,
            });
        }
        Ok(())
    }

    /// Topic family without a deployment.
    pub fn base_topic(&self) -> Topic {
        Topic::new(
            self.namespace.clone(),
            self.protocol_version.clone(),
            self.application.clone(),
            None,
            self.encoding.clone(),
        )
    }

    /// Topic a deployment's reports are gossiped on.
    pub fn topic_for(&self, deployment: &str) -> String {
        self.base_topic().with_deployment(deployment).to_string()
    }
}
