//! # Graphcast POI Radio Runtime
//!
//! Wires the radio engine to the outside world.
//!
//! ## Startup Sequence
//!
//! 1. Parse `NodeConfig` from flags and environment
//! 2. Validate the operator key and intervals
//! 3. Build the HTTP adapters (chain, subgraphs, graph-node, indexer management)
//! 4. Resolve the operator's indexer and tracked deployments
//! 5. Start the block watcher and the radio loop
//!
//! ```text
//! ETH_NODE ──poll──→ block watcher ──block numbers──→ RadioService
//!                                                        │   ↑
//!                                     gossip transport ←─┘   └── inbound reports
//! ```
//!
//! ## Transport
//!
//! The node ships with [`InMemoryTransport`] only. It does not join a peer
//! network: the radio hears its own reports and nothing else, so it never
//! sees a divergence. A network transport plugs in through
//! [`poi_radio::GossipTransport`] via [`RadioRuntime::with_transport`].

pub mod adapters;
pub mod config;

use std::sync::Arc;
use std::time::Duration;

use poi_radio::{
    spawn_block_watcher, ChainSource, GossipRadioApi, GossipTransport, InMemoryTransport,
    RadioDependencies, RadioError, RadioService,
};
use reqwest::Client;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::adapters::{
    EthRpcClient, GraphNodeStatus, GraphQlClient, IndexerManagement, NetworkSubgraph,
};
pub use crate::config::{ConfigError, NodeConfig};

/// Runtime construction and startup errors.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Radio(#[from] RadioError),

    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

/// The running radio node.
pub struct RadioRuntime {
    service: Arc<RadioService>,
    chain: Arc<dyn ChainSource>,
    poll_interval: Duration,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl RadioRuntime {
    /// Build every adapter and the radio service over a local, in-process
    /// transport. The node does not reach any peer in this mode.
    pub fn new(config: &NodeConfig) -> Result<Self, RuntimeError> {
        warn!("Gossip runs over an in-process transport; no peers will be reached");
        Self::with_transport(config, Arc::new(InMemoryTransport::new()))
    }

    /// Build every adapter and the radio service over the given gossip transport.
    pub fn with_transport(
        config: &NodeConfig,
        transport: Arc<dyn GossipTransport>,
    ) -> Result<Self, RuntimeError> {
        config.validate()?;

        let client = Client::builder()
            .timeout(config.http_timeout())
            .connect_timeout(Duration::from_secs(2))
            .build()?;

        let chain: Arc<dyn ChainSource> =
            Arc::new(EthRpcClient::new(client.clone(), config.eth_node_url()));
        let oracle = Arc::new(NetworkSubgraph::new(
            GraphQlClient::new(client.clone(), &config.network_subgraph),
            GraphQlClient::new(client.clone(), &config.registry_subgraph),
        ));
        let poi_source = Arc::new(GraphNodeStatus::new(GraphQlClient::new(
            client.clone(),
            &config.graph_node_status,
        )));
        let cost_models = Arc::new(IndexerManagement::new(GraphQlClient::new(
            client,
            &config.indexer_management_server,
        )));

        let service = RadioService::new(RadioDependencies {
            transport,
            chain: chain.clone(),
            oracle,
            poi_source,
            cost_models,
            wallet: config.wallet()?,
            config: config.radio_config(),
        })?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            service: Arc::new(service),
            chain,
            poll_interval: config.block_poll_interval(),
            shutdown_tx,
            shutdown_rx,
        })
    }

    /// Resolve the tracked deployments, then start the block watcher and the radio loop.
    pub async fn start(&self) -> JoinHandle<()> {
        info!("===========================================");
        info!("  Graphcast POI Radio");
        info!("  Operator: {}", self.service.operator_address());
        info!("===========================================");

        let topics = self.service.initialize().await;
        info!(topics = topics.len(), "Tracking deployments");

        let blocks = spawn_block_watcher(
            self.chain.clone(),
            self.poll_interval,
            self.shutdown_rx.clone(),
        );

        let service = self.service.clone();
        let shutdown = self.shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = service.run(blocks, shutdown).await {
                error!(error = %e, "Radio stopped");
            }
        })
    }

    /// Signal every task to stop.
    pub fn shutdown(&self) {
        info!("Initiating graceful shutdown...");
        if let Err(e) = self.shutdown_tx.send(true) {
            error!("Failed to send shutdown signal: {}", e);
        }
    }

    pub fn service(&self) -> Arc<RadioService> {
        Arc::clone(&self.service)
    }
}
