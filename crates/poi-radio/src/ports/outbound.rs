//! Driven ports (Outbound dependencies)
//!
//! Everything the radio needs from the outside world: the gossip transport,
//! the chain, the network and registry subgraphs, graph-node, the indexer
//! management server, and a clock.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::domain::{BlockPointer, CostModel, Dispute};

/// Failure of an outbound collaborator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PortError {
    /// Service could not be reached or answered with a transport error.
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Service answered but the response could not be interpreted.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Service refused the request.
    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Request timed out")]
    Timeout,
}

/// Raw message delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Publish/subscribe gossip transport.
#[async_trait]
pub trait GossipTransport: Send + Sync {
    /// Start receiving messages on `topics`.
    ///
    /// Messages for other topics are never delivered on the returned channel.
    async fn subscribe(&self, topics: &[String])
        -> Result<mpsc::Receiver<InboundMessage>, PortError>;

    /// Publish encoded envelope bytes on a topic.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PortError>;
}

/// Source of block numbers and hashes.
#[async_trait]
pub trait ChainSource: Send + Sync {
    async fn current_block_number(&self) -> Result<u64, PortError>;

    async fn block(&self, number: u64) -> Result<BlockPointer, PortError>;
}

/// Stake, identity and allocation queries.
///
/// Indexer and operator ids are lower-case hex addresses. Token amounts are
/// in GRT wei.
#[async_trait]
pub trait StakeOracle: Send + Sync {
    /// Indexer a gossip operator signs for, if any.
    async fn indexer_for_operator(&self, operator: &str) -> Result<Option<String>, PortError>;

    async fn stake_of(&self, indexer: &str) -> Result<u128, PortError>;

    async fn minimum_stake(&self) -> Result<u128, PortError>;

    /// Undecided or accepted disputes against an indexer.
    async fn open_disputes(&self, indexer: &str) -> Result<Vec<Dispute>, PortError>;

    /// IPFS hashes of deployments the indexer has open allocations on.
    async fn allocated_deployments(&self, indexer: &str) -> Result<Vec<String>, PortError>;
}

/// Local proof of indexing, from graph-node.
#[async_trait]
pub trait PoiSource: Send + Sync {
    /// `Ok(None)` when the node has not indexed the deployment up to `block`.
    async fn proof_of_indexing(
        &self,
        deployment: &str,
        block: &BlockPointer,
        indexer: &str,
    ) -> Result<Option<String>, PortError>;
}

/// Indexer management server, where query pricing is set.
#[async_trait]
pub trait CostModelSink: Send + Sync {
    async fn set_cost_model(&self, model: CostModel) -> Result<(), PortError>;
}

/// Wall clock in milliseconds since the Unix epoch.
pub trait TimeSource: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Default time source using system time
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now_ms(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_time_is_milliseconds() {
        // Any date after 2020-01-01 in ms
        assert!(SystemTimeSource.now_ms() > 1_577_836_800_000);
    }
}
