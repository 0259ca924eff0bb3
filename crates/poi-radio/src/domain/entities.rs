//! Core value types shared across the radio.

use serde::{Deserialize, Serialize};

/// 32-byte Keccak digest.
pub type Hash = [u8; 32];

/// 20-byte Ethereum address.
pub type Address = [u8; 20];

/// Lower-case `0x`-prefixed rendering used as the canonical key for addresses.
pub fn format_address(address: &Address) -> String {
    format!("0x{}", hex::encode(address))
}

/// Immutable snapshot of a chain block, used as the freshness anchor of a report.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockPointer {
    pub number: u64,
    pub hash: String,
}

impl BlockPointer {
    pub fn new(number: u64, hash: impl Into<String>) -> Self {
        Self {
            number,
            hash: hash.into(),
        }
    }
}

/// Application payload of the POI cross-checker.
///
/// Field names match the JSON carried on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NpoiPayload {
    /// Deployment IPFS hash
    pub subgraph: String,
    /// Normalised proof of indexing
    #[serde(rename = "nPOI")]
    pub npoi: String,
}

impl NpoiPayload {
    pub fn new(subgraph: impl Into<String>, npoi: impl Into<String>) -> Self {
        Self {
            subgraph: subgraph.into(),
            npoi: npoi.into(),
        }
    }
}

/// A validated, stake-weighted claim about a deployment's nPOI at a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attestation {
    pub value: String,
    pub deployment: String,
    pub block_number: u64,
    /// Lower-case operator address that signed the report
    pub reporter: String,
    /// Indexer stake at validation time, in GRT wei
    pub stake_weight: u128,
}

/// Dispute raised against an indexer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dispute {
    pub id: String,
    pub tokens_slashed: u128,
}

/// Query price model pushed to the indexer management server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostModel {
    /// Deployment in bytes32 hex form
    pub deployment: String,
    pub model: String,
    pub variables: Option<String>,
}

/// Punitive model applied to deployments whose nPOI disagrees with the majority.
pub const DEFAULT_PUNITIVE_COST_MODEL: &str = "default => 100000;";
