//! Node configuration, from flags or the environment.

use std::time::Duration;

use clap::Parser;
use poi_radio::{LocalWallet, RadioConfig};
use radio_telemetry::TelemetryConfig;
use thiserror::Error;

/// Configuration errors detected at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid operator private key: {0}")]
    InvalidPrivateKey(String),

    #[error("{name} must be greater than zero")]
    Zero { name: &'static str },
}

/// Graphcast POI radio node.
#[derive(Parser, Debug, Clone)]
#[command(name = "radio-node")]
#[command(about = "Gossips proofs of indexing and flags deployments that diverge from the stake majority")]
#[command(version)]
pub struct NodeConfig {
    /// Ethereum JSON-RPC endpoint (a bare host:port is taken as http)
    #[arg(long, env = "ETH_NODE")]
    pub eth_node: String,

    /// Hex secp256k1 key of the gossip operator
    #[arg(long, env = "RADIO_OPERATOR_PRIVATE_KEY", hide_env_values = true)]
    pub private_key: String,

    /// Network subgraph GraphQL endpoint (stake, disputes, allocations)
    #[arg(long, env = "NETWORK_SUBGRAPH")]
    pub network_subgraph: String,

    /// Registry subgraph GraphQL endpoint (gossip operators)
    #[arg(long, env = "REGISTRY_SUBGRAPH")]
    pub registry_subgraph: String,

    /// Graph-node index status endpoint
    #[arg(long, env = "GRAPH_NODE_STATUS")]
    pub graph_node_status: String,

    /// Indexer management server endpoint
    #[arg(long, env = "INDEXER_MANAGEMENT_SERVER")]
    pub indexer_management_server: String,

    /// Deployment to track regardless of allocations
    #[arg(long, env = "RADIO_TEST_TOPIC")]
    pub test_topic: Option<String>,

    /// Topic namespace
    #[arg(long, env = "RADIO_NAMESPACE", default_value = "graphcast")]
    pub namespace: String,

    /// Chain head polling interval
    #[arg(long, env = "BLOCK_POLL_INTERVAL_MS", default_value_t = 2_000)]
    pub block_poll_interval_ms: u64,

    /// Outbound reports computed and published concurrently
    #[arg(long, env = "RADIO_MAX_IN_FLIGHT", default_value_t = 8)]
    pub max_in_flight: usize,

    /// Upper bound on computing and publishing one report
    #[arg(long, env = "RADIO_PUBLISH_TIMEOUT_SECS", default_value_t = 10)]
    pub publish_timeout_secs: u64,

    /// Timeout of every HTTP request
    #[arg(long, env = "HTTP_TIMEOUT_SECS", default_value_t = 10)]
    pub http_timeout_secs: u64,

    /// Log filter, a level or a full directive such as `poi_radio=debug`
    #[arg(long, env = "RADIO_LOG_LEVEL")]
    pub log_level: Option<String>,
}

impl NodeConfig {
    /// Check the values clap cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.block_poll_interval_ms == 0 {
            return Err(ConfigError::Zero {
                name: "BLOCK_POLL_INTERVAL_MS",
            });
        }
        if self.http_timeout_secs == 0 {
            return Err(ConfigError::Zero {
                name: "HTTP_TIMEOUT_SECS",
            });
        }
        self.wallet().map(|_| ())
    }

    /// Operator wallet from the configured key.
    pub fn wallet(&self) -> Result<LocalWallet, ConfigError> {
        LocalWallet::from_hex_key(&self.private_key)
            .map_err(|e| ConfigError::InvalidPrivateKey(e.to_string()))
    }

    /// Engine configuration derived from the node flags.
    pub fn radio_config(&self) -> RadioConfig {
        RadioConfig {
            namespace: self.namespace.clone(),
            test_topic: self.test_topic.clone(),
            max_in_flight: self.max_in_flight,
            publish_timeout: Duration::from_secs(self.publish_timeout_secs),
            ..RadioConfig::default()
        }
    }

    /// Telemetry settings from the environment, with the log filter flag applied.
    pub fn telemetry_config(&self) -> TelemetryConfig {
        let telemetry = TelemetryConfig::from_env();
        match &self.log_level {
            Some(level) => telemetry.with_log_level(level.as_str()),
            None => telemetry,
        }
    }

    pub fn eth_node_url(&self) -> String {
        with_scheme(&self.eth_node)
    }

    pub fn block_poll_interval(&self) -> Duration {
        Duration::from_millis(self.block_poll_interval_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

fn with_scheme(endpoint: &str) -> String {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!("http://{endpoint}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "0000000000000000000000000000000000000000000000000000000000000001";

    fn args(extra: &[&str]) -> Vec<String> {
        let mut args = vec![
            "radio-node",
            "--eth-node",
            "localhost:8545",
            "--private-key",
            KEY,
            "--network-subgraph",
            "http://network/graphql",
            "--registry-subgraph",
            "http://registry/graphql",
            "--graph-node-status",
            "http://graph-node:8030/graphql",
            "--indexer-management-server",
            "http://indexer-agent:18000",
        ];
        args.extend_from_slice(extra);
        args.into_iter().map(str::to_string).collect()
    }

    #[test]
    fn test_defaults() {
        let config = NodeConfig::try_parse_from(args(&[])).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.eth_node_url(), "http://localhost:8545");
        assert_eq!(config.block_poll_interval(), Duration::from_secs(2));

        let radio = config.radio_config();
        assert_eq!(radio.namespace, "graphcast");
        assert_eq!(radio.max_in_flight, 8);
        assert_eq!(radio.cadence, 5);
        assert!(radio.test_topic.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = NodeConfig::try_parse_from(args(&[
            "--test-topic",
            "QmTest",
            "--namespace",
            "graphcast-test",
            "--max-in-flight",
            "2",
            "--publish-timeout-secs",
            "3",
        ]))
        .unwrap();

        let radio = config.radio_config();
        assert_eq!(radio.test_topic.as_deref(), Some("QmTest"));
        assert_eq!(radio.topic_for("QmTest"), "/graphcast-test/0/poi-crosschecker/QmTest/proto");
        assert_eq!(radio.max_in_flight, 2);
        assert_eq!(radio.publish_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_wallet_from_key() {
        let config = NodeConfig::try_parse_from(args(&[])).unwrap();
        assert_eq!(
            config.wallet().unwrap().address_string(),
            "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf"
        );
    }

    #[test]
    fn test_malformed_key_rejected() {
        let mut raw = args(&[]);
        raw[4] = "not-a-key".to_string();
        let config = NodeConfig::try_parse_from(raw).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidPrivateKey(_))
        ));
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let config =
            NodeConfig::try_parse_from(args(&["--block-poll-interval-ms", "0"])).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Zero { .. })));
    }

    #[test]
    fn test_log_level_flag_reaches_telemetry() {
        let config =
            NodeConfig::try_parse_from(args(&["--log-level", "poi_radio=debug"])).unwrap();
        assert_eq!(config.telemetry_config().log_level, "poi_radio=debug");
    }

    #[test]
    fn test_explicit_scheme_kept() {
        assert_eq!(with_scheme("https://rpc.example"), "https://rpc.example");
    }
}
