//! # Attestation Store & Consensus
//!
//! Validated reports are bucketed by `(deployment, block)`. At comparison time
//! a bucket is grouped by reported value, stake is summed per group, and the
//! heaviest group is the majority attestation. Ties go to the group whose
//! first report arrived first.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use super::deployment::cost_model_key;
use super::entities::Attestation;

/// Stake-weighted view of one reported value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MajorityAttestation {
    pub value: String,
    pub stake_weight: u128,
    /// Reporters in arrival order
    pub reporters: Vec<String>,
}

/// A local value that lost to the stake majority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Divergence {
    pub deployment: String,
    pub block_number: u64,
    pub local_value: String,
    pub majority: MajorityAttestation,
    /// bytes32 hex key for the cost model, absent if the id is not a sha2-256 multihash
    pub cost_model_key: Option<String>,
}

/// Group attestations by value, in first-encountered order.
pub fn group_by_value(attestations: &[Attestation]) -> Vec<MajorityAttestation> {
    let mut groups: Vec<MajorityAttestation> = Vec::new();
    for attestation in attestations {
        match groups.iter_mut().find(|g| g.value == attestation.value) {
            Some(group) => {
                group.stake_weight = group.stake_weight.saturating_add(attestation.stake_weight);
                group.reporters.push(attestation.reporter.clone());
            }
            None => groups.push(MajorityAttestation {
                value: attestation.value.clone(),
                stake_weight: attestation.stake_weight,
                reporters: vec![attestation.reporter.clone()],
            }),
        }
    }
    groups
}

/// Heaviest group; the earliest group wins a tie.
pub fn majority_attestation(attestations: &[Attestation]) -> Option<MajorityAttestation> {
    group_by_value(attestations)
        .into_iter()
        .fold(None, |best: Option<MajorityAttestation>, group| match best {
            Some(b) if b.stake_weight >= group.stake_weight => Some(b),
            _ => Some(group),
        })
}

/// Locally computed nPOIs, `deployment → block → value`.
#[derive(Debug, Default, Clone)]
pub struct LocalReports {
    values: BTreeMap<String, BTreeMap<u64, String>>,
}

impl LocalReports {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, deployment: impl Into<String>, block: u64, value: impl Into<String>) {
        self.values
            .entry(deployment.into())
            .or_default()
            .insert(block, value.into());
    }

    pub fn get(&self, deployment: &str, block: u64) -> Option<&str> {
        self.values
            .get(deployment)
            .and_then(|blocks| blocks.get(&block))
            .map(String::as_str)
    }

    /// Deployments with a local value at `block`, in sorted order.
    pub fn at_block(&self, block: u64) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().filter_map(move |(deployment, blocks)| {
            blocks
                .get(&block)
                .map(|value| (deployment.as_str(), value.as_str()))
        })
    }

    pub fn len(&self) -> usize {
        self.values.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

/// Validated remote attestations keyed by `(deployment, block)`.
#[derive(Debug, Default)]
pub struct AttestationStore {
    buckets: HashMap<(String, u64), Vec<Attestation>>,
}

impl AttestationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an attestation to its bucket.
    ///
    /// Zero-weight attestations are ignored. A reporter holds one slot per
    /// bucket: a newer report replaces its value in place, so resending cannot
    /// multiply its stake. Returns whether the store changed.
    pub fn record(&mut self, attestation: Attestation) -> bool {
        if attestation.stake_weight == 0 {
            return false;
        }
        let bucket = self
            .buckets
            .entry((attestation.deployment.clone(), attestation.block_number))
            .or_default();

        match bucket.iter_mut().find(|a| a.reporter == attestation.reporter) {
            Some(existing) => *existing = attestation,
            None => bucket.push(attestation),
        }
        true
    }

    pub fn attestations(&self, deployment: &str, block: u64) -> &[Attestation] {
        self.buckets
            .get(&(deployment.to_string(), block))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Compare local values at `target_block` with the stake majority.
    ///
    /// A deployment with no remote attestations is never reported.
    pub fn detect_divergence(&self, local: &LocalReports, target_block: u64) -> Vec<Divergence> {
        local
            .at_block(target_block)
            .filter_map(|(deployment, local_value)| {
                let majority = majority_attestation(self.attestations(deployment, target_block))?;
                if majority.value == local_value {
                    return None;
                }
                Some(Divergence {
                    deployment: deployment.to_string(),
                    block_number: target_block,
                    local_value: local_value.to_string(),
                    majority,
                    cost_model_key: cost_model_key(deployment).ok(),
                })
            })
            .collect()
    }

    /// Majority per tracked deployment at `block`, for logging.
    pub fn summary(&self, block: u64) -> BTreeMap<String, MajorityAttestation> {
        self.buckets
            .iter()
            .filter(|((_, b), _)| *b == block)
            .filter_map(|((deployment, _), bucket)| {
                majority_attestation(bucket).map(|m| (deployment.clone(), m))
            })
            .collect()
    }

    /// Number of stored attestations.
    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Drop every bucket.
    pub fn clear(&mut self) {
        self.buckets.clear();
    }
}
