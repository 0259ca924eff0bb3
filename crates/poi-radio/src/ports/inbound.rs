//! Driving ports (Inbound API)

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{Attestation, DecodeError, Divergence, IdentityError, Rejection};
use crate::ports::outbound::{InboundMessage, PortError};

/// Why an inbound message did not become an attestation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MessageError {
    #[error("Decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("Sender recovery failed: {0}")]
    Identity(#[from] IdentityError),

    #[error("Payload does not carry a deployment nPOI: {0}")]
    Payload(String),

    #[error("Report for {deployment} arrived on foreign topic {topic}")]
    TopicMismatch { deployment: String, topic: String },

    #[error("Report for block {block} arrived after block {compared} was compared")]
    LateReport { block: u64, compared: u64 },

    #[error("Rejected: {0}")]
    Rejected(#[from] Rejection),
}

impl MessageError {
    /// Short label used for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            MessageError::Decode(_) => "decode",
            MessageError::Identity(_) => "identity",
            MessageError::Payload(_) => "payload",
            MessageError::TopicMismatch { .. } => "topic_mismatch",
            MessageError::LateReport { .. } => "late_report",
            MessageError::Rejected(r) => r.reason(),
        }
    }
}

/// Radio lifecycle errors.
#[derive(Debug, Error)]
pub enum RadioError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] crate::domain::ConfigError),

    #[error("Transport error: {0}")]
    Transport(PortError),
}

/// Outcome of one send round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendReport {
    pub target_block: u64,
    /// Deployments whose report was published
    pub published: Vec<String>,
    /// Deployments with no local nPOI (not synced, or graph-node failed)
    pub unavailable: Vec<String>,
    /// Deployments with a local nPOI whose publish failed or timed out
    pub failed: Vec<String>,
}

/// Outcome of one block tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub block: u64,
    pub sent: Option<SendReport>,
    pub divergences: Vec<Divergence>,
}

/// Primary radio API.
#[async_trait]
pub trait GossipRadioApi: Send + Sync {
    /// Resolve the local indexer and its allocations into the tracked topic set.
    ///
    /// Oracle failures leave the set empty rather than failing startup.
    async fn initialize(&self) -> Vec<String>;

    /// Decode, authenticate and validate one gossip message, storing it on success.
    async fn handle_message(&self, message: InboundMessage) -> Result<Attestation, MessageError>;

    /// Run whatever the block schedule says is due on `block`.
    async fn handle_block(&self, block: u64) -> TickReport;

    /// Deployments whose reports this radio sends and compares.
    fn tracked_deployments(&self) -> Vec<String>;
}
