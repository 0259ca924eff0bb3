//! Validity filter: runs the validity gates against live oracle data.
//!
//! Every oracle failure maps to the value that makes the message fail:
//! no operator, zero stake, an unknown (infinite) minimum, or an unfetchable
//! block. Disputes are the one exception; an unreachable dispute list counts
//! as empty, since disputes only ever add reasons to reject.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::domain::{
    check_block_anchor, check_disputes, check_freshness, check_stake, BlockPointer,
    MinimumStakeCache, NonceDirectory, RadioConfig, Rejection,
};
use crate::ports::{ChainSource, StakeOracle};

/// A message that passed identity recovery, awaiting validation.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    /// Recovered lower-case signer address
    pub sender: &'a str,
    pub topic: &'a str,
    pub nonce: u64,
    pub block: &'a BlockPointer,
}

/// Stateful validity filter. Owns the nonce directory and minimum stake cache.
pub struct ValidityFilter {
    oracle: Arc<dyn StakeOracle>,
    chain: Arc<dyn ChainSource>,
    nonces: NonceDirectory,
    minimum_stake: MinimumStakeCache,
    replay_window_ms: u64,
}

impl ValidityFilter {
    pub fn new(
        oracle: Arc<dyn StakeOracle>,
        chain: Arc<dyn ChainSource>,
        config: &RadioConfig,
    ) -> Self {
        Self {
            oracle,
            chain,
            nonces: NonceDirectory::new(config.nonce_ttl_ms),
            minimum_stake: MinimumStakeCache::new(config.min_stake_ttl_ms),
            replay_window_ms: config.replay_window_ms,
        }
    }

    /// Run all gates in order. Returns the indexer stake to weight the report by.
    pub async fn validate(
        &mut self,
        candidate: Candidate<'_>,
        now_ms: u64,
    ) -> Result<u128, Rejection> {
        // 1. Identity
        let indexer = self.resolve_indexer(candidate.sender).await?;

        // 2. Stake
        let minimum = self.minimum_stake(now_ms).await;
        let stake = self.stake_of(&indexer).await;
        check_stake(stake, minimum)?;

        // 3. Disputes
        let disputes = match self.oracle.open_disputes(&indexer).await {
            Ok(disputes) => disputes,
            Err(e) => {
                warn!(indexer = %indexer, error = %e, "Dispute lookup failed, assuming none");
                Vec::new()
            }
        };
        check_disputes(&disputes)?;

        // 4. Freshness, then the block anchor
        check_freshness(candidate.nonce, now_ms, self.replay_window_ms)?;
        let actual = self
            .chain
            .block(candidate.block.number)
            .await
            .map_err(|e| {
                warn!(block = candidate.block.number, error = %e, "Block lookup failed");
                Rejection::BlockUnavailable(candidate.block.number)
            })?;
        check_block_anchor(candidate.block, &actual)?;

        // 5. Nonce
        self.nonces
            .check_and_update(candidate.sender, candidate.topic, candidate.nonce, now_ms)?;

        debug!(
            sender = %candidate.sender,
            indexer = %indexer,
            stake = %stake,
            "Message passed validity filter"
        );
        Ok(stake)
    }

    /// Evict idle nonce pairs.
    pub fn prune_nonces(&mut self, now_ms: u64) -> usize {
        self.nonces.prune(now_ms)
    }

    pub fn nonce_directory(&self) -> &NonceDirectory {
        &self.nonces
    }

    async fn resolve_indexer(&self, sender: &str) -> Result<String, Rejection> {
        match self.oracle.indexer_for_operator(sender).await {
            Ok(Some(indexer)) => Ok(indexer.to_lowercase()),
            Ok(None) => Err(Rejection::NotAnOperator(sender.to_string())),
            Err(e) => {
                warn!(sender = %sender, error = %e, "Operator lookup failed");
                Err(Rejection::NotAnOperator(sender.to_string()))
            }
        }
    }

    async fn minimum_stake(&mut self, now_ms: u64) -> u128 {
        if self.minimum_stake.needs_refresh(now_ms) {
            match self.oracle.minimum_stake().await {
                Ok(minimum) => self.minimum_stake.update(minimum, now_ms),
                Err(e) => warn!(error = %e, "Minimum stake refresh failed"),
            }
        }
        self.minimum_stake.current()
    }

    async fn stake_of(&self, indexer: &str) -> u128 {
        self.oracle.stake_of(indexer).await.unwrap_or_else(|e| {
            warn!(indexer = %indexer, error = %e, "Stake lookup failed");
            0
        })
    }
}
