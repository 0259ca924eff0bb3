//! # Validity Gates
//!
//! Pure checks applied to every inbound report, plus the two pieces of state
//! the filter owns: the per-(sender, topic) nonce directory and the cached
//! minimum stake requirement.
//!
//! ## Gate Order
//!
//! 1. Identity (operator → indexer)
//! 2. Stake (indexer stake ≥ minimum, never zero)
//! 3. Disputes (no slashed tokens)
//! 4. Freshness (0 < age < replay window, block hash anchored)
//! 5. Nonce monotonicity per (sender, topic)

use std::collections::HashMap;

use thiserror::Error;

use super::entities::{BlockPointer, Dispute};

/// Maximum age of an accepted report (1 hour).
pub const REPLAY_WINDOW_MS: u64 = 3_600_000;

/// Why a report was refused. A rejected report carries no stake weight.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("Sender {0} is not an operator of any indexer")]
    NotAnOperator(String),

    #[error("Indexer stake {stake} is below the minimum {minimum}")]
    InsufficientStake { stake: u128, minimum: u128 },

    #[error("Indexer has {0} slashed tokens in disputes")]
    Slashed(u128),

    #[error("Message nonce {nonce} is not in the past (now {now})")]
    FutureMessage { nonce: u64, now: u64 },

    #[error("Message is {age_ms}ms old, outside the replay window")]
    StaleMessage { age_ms: u64 },

    #[error("Block {0} could not be fetched")]
    BlockUnavailable(u64),

    #[error("Block {number} hash mismatch: claimed {claimed}, chain has {actual}")]
    BlockHashMismatch {
        number: u64,
        claimed: String,
        actual: String,
    },

    #[error("Nonce {nonce} does not exceed last accepted nonce {last}")]
    NonceNotIncreasing { nonce: u64, last: u64 },
}

impl Rejection {
    /// Short label used for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            Rejection::NotAnOperator(_) => "not_an_operator",
            Rejection::InsufficientStake { .. } => "insufficient_stake",
            Rejection::Slashed(_) => "slashed",
            Rejection::FutureMessage { .. } => "future_message",
            Rejection::StaleMessage { .. } => "stale_message",
            Rejection::BlockUnavailable(_) => "block_unavailable",
            Rejection::BlockHashMismatch { .. } => "block_hash_mismatch",
            Rejection::NonceNotIncreasing { .. } => "nonce_not_increasing",
        }
    }
}

/// Stake gate. Zero stake never passes, even against a zero minimum.
pub fn check_stake(stake: u128, minimum: u128) -> Result<(), Rejection> {
    if stake == 0 || stake < minimum {
        return Err(Rejection::InsufficientStake { stake, minimum });
    }
    Ok(())
}

/// Dispute gate. Any slashing history disqualifies.
pub fn check_disputes(disputes: &[Dispute]) -> Result<(), Rejection> {
    let slashed = disputes
        .iter()
        .fold(0u128, |acc, d| acc.saturating_add(d.tokens_slashed));
    if slashed > 0 {
        return Err(Rejection::Slashed(slashed));
    }
    Ok(())
}

/// Freshness gate on the nonce timestamp.
pub fn check_freshness(nonce: u64, now_ms: u64, replay_window_ms: u64) -> Result<(), Rejection> {
    if nonce >= now_ms {
        return Err(Rejection::FutureMessage { nonce, now: now_ms });
    }
    let age_ms = now_ms - nonce;
    if age_ms >= replay_window_ms {
        return Err(Rejection::StaleMessage { age_ms });
    }
    Ok(())
}

/// The claimed block must match the chain's block at that height.
pub fn check_block_anchor(claimed: &BlockPointer, actual: &BlockPointer) -> Result<(), Rejection> {
    if claimed.number != actual.number || !claimed.hash.eq_ignore_ascii_case(&actual.hash) {
        return Err(Rejection::BlockHashMismatch {
            number: claimed.number,
            claimed: claimed.hash.clone(),
            actual: actual.hash.clone(),
        });
    }
    Ok(())
}

#[derive(Debug, Clone, Copy)]
struct NonceEntry {
    nonce: u64,
    last_seen_ms: u64,
}

/// Last accepted nonce per (sender, topic).
///
/// Pairs unseen for longer than the TTL are evicted. The TTL must be at least
/// the replay window: anything a forgotten pair could replay is already stale.
#[derive(Debug)]
pub struct NonceDirectory {
    entries: HashMap<String, HashMap<String, NonceEntry>>,
    ttl_ms: u64,
    last_prune_ms: u64,
    prune_interval_ms: u64,
}

impl NonceDirectory {
    /// Default eviction TTL: 2x the replay window.
    pub const DEFAULT_TTL_MS: u64 = 2 * REPLAY_WINDOW_MS;

    /// Default prune interval.
    pub const DEFAULT_PRUNE_INTERVAL_MS: u64 = 60_000;

    pub fn new(ttl_ms: u64) -> Self {
        Self {
            entries: HashMap::new(),
            ttl_ms,
            last_prune_ms: 0,
            prune_interval_ms: Self::DEFAULT_PRUNE_INTERVAL_MS,
        }
    }

    /// Nonce monotonicity gate.
    ///
    /// The first message of a pair is accepted and becomes the baseline.
    /// Later messages must carry a strictly greater nonce.
    pub fn check_and_update(
        &mut self,
        sender: &str,
        topic: &str,
        nonce: u64,
        now_ms: u64,
    ) -> Result<(), Rejection> {
        if now_ms.saturating_sub(self.last_prune_ms) > self.prune_interval_ms {
            self.prune(now_ms);
        }

        let topics = self.entries.entry(sender.to_string()).or_default();
        if let Some(entry) = topics.get(topic) {
            if nonce <= entry.nonce {
                return Err(Rejection::NonceNotIncreasing {
                    nonce,
                    last: entry.nonce,
                });
            }
        }

        topics.insert(
            topic.to_string(),
            NonceEntry {
                nonce,
                last_seen_ms: now_ms,
            },
        );
        Ok(())
    }

    pub fn last_nonce(&self, sender: &str, topic: &str) -> Option<u64> {
        self.entries
            .get(sender)
            .and_then(|topics| topics.get(topic))
            .map(|entry| entry.nonce)
    }

    /// Evict pairs not seen within the TTL. Returns the number evicted.
    pub fn prune(&mut self, now_ms: u64) -> usize {
        let expiry_threshold = now_ms.saturating_sub(self.ttl_ms);
        let before = self.len();

        for topics in self.entries.values_mut() {
            topics.retain(|_, entry| entry.last_seen_ms > expiry_threshold);
        }
        self.entries.retain(|_, topics| !topics.is_empty());
        self.last_prune_ms = now_ms;

        before - self.len()
    }

    /// Number of tracked (sender, topic) pairs.
    pub fn len(&self) -> usize {
        self.entries.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for NonceDirectory {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TTL_MS)
    }
}

/// Network minimum indexer stake, refreshed on a TTL.
///
/// Until a fetch succeeds the requirement is `u128::MAX`, so the stake gate
/// fails closed. A failed refresh keeps the last known value and leaves the
/// cache due, so the next message retries.
#[derive(Debug, Clone)]
pub struct MinimumStakeCache {
    value: Option<u128>,
    fetched_at_ms: Option<u64>,
    ttl_ms: u64,
}

impl MinimumStakeCache {
    /// Default refresh interval (10 minutes).
    pub const DEFAULT_TTL_MS: u64 = 600_000;

    pub fn new(ttl_ms: u64) -> Self {
        Self {
            value: None,
            fetched_at_ms: None,
            ttl_ms,
        }
    }

    pub fn needs_refresh(&self, now_ms: u64) -> bool {
        match self.fetched_at_ms {
            Some(fetched_at) => now_ms.saturating_sub(fetched_at) >= self.ttl_ms,
            None => true,
        }
    }

    pub fn update(&mut self, value: u128, now_ms: u64) {
        self.value = Some(value);
        self.fetched_at_ms = Some(now_ms);
    }

    /// Effective requirement for the stake gate.
    pub fn current(&self) -> u128 {
        self.value.unwrap_or(u128::MAX)
    }
}

impl Default for MinimumStakeCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TTL_MS)
    }
}
