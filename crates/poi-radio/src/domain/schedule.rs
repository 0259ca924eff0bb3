//! # Block Schedule
//!
//! Drives the radio from the chain's block stream.
//!
//! ```text
//! block b, b % cadence == 0  →  SendReports { target: b - offset }
//!                               compare scheduled at b + compare_lag
//! block b == scheduled       →  Compare { target: b - offset - compare_lag }
//! ```
//!
//! With the default constants (5, 5, 3) reports for block 95 are sent at 100
//! and compared at 103.

use serde::{Deserialize, Serialize};

/// Default blocks between report rounds.
pub const DEFAULT_CADENCE: u64 = 5;

/// Default sync-lag buffer between the current block and the reported block.
pub const DEFAULT_OFFSET: u64 = 5;

/// Default blocks to wait for peer reports before comparing.
pub const DEFAULT_COMPARE_LAG: u64 = 3;

/// Work due on a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockAction {
    /// Compute, sign and publish local nPOIs for `target`.
    SendReports { target: u64 },
    /// Compare local nPOIs for `target` with the stake majority, then clear.
    Compare { target: u64 },
}

/// Pure cadence state machine.
#[derive(Debug, Clone)]
pub struct BlockSchedule {
    cadence: u64,
    offset: u64,
    compare_lag: u64,
    pending_compare: Option<u64>,
    last_block: Option<u64>,
}

impl BlockSchedule {
    /// `cadence` must be non-zero.
    pub fn new(cadence: u64, offset: u64, compare_lag: u64) -> Self {
        Self {
            cadence: cadence.max(1),
            offset,
            compare_lag,
            pending_compare: None,
            last_block: None,
        }
    }

    /// Actions due on `block`, comparison first.
    ///
    /// A block at or below the last seen one is ignored. A send round whose
    /// target would precede genesis is skipped.
    pub fn on_block(&mut self, block: u64) -> Vec<BlockAction> {
        if self.last_block.is_some_and(|last| block <= last) {
            return Vec::new();
        }
        self.last_block = Some(block);

        let mut actions = Vec::new();

        // A compare block can be missed if the chain source skips heights
        if let Some(scheduled) = self.pending_compare {
            if block >= scheduled {
                self.pending_compare = None;
                if let Some(target) = scheduled.checked_sub(self.offset + self.compare_lag) {
                    actions.push(BlockAction::Compare { target });
                }
            }
        }

        if block % self.cadence == 0 {
            if let Some(target) = block.checked_sub(self.offset) {
                actions.push(BlockAction::SendReports { target });
                self.pending_compare = Some(block + self.compare_lag);
            }
        }

        actions
    }

    pub fn pending_compare(&self) -> Option<u64> {
        self.pending_compare
    }
}

impl Default for BlockSchedule {
    fn default() -> Self {
        Self::new(DEFAULT_CADENCE, DEFAULT_OFFSET, DEFAULT_COMPARE_LAG)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_then_compare() {
        let mut schedule = BlockSchedule::default();

        assert_eq!(
            schedule.on_block(100),
            vec![BlockAction::SendReports { target: 95 }]
        );
        assert!(schedule.on_block(101).is_empty());
        assert!(schedule.on_block(102).is_empty());
        assert_eq!(
            schedule.on_block(103),
            vec![BlockAction::Compare { target: 95 }]
        );
        assert!(schedule.on_block(104).is_empty());
        assert_eq!(
            schedule.on_block(105),
            vec![BlockAction::SendReports { target: 100 }]
        );
    }

    #[test]
    fn test_non_cadence_blocks_do_nothing() {
        let mut schedule = BlockSchedule::default();
        for block in [101, 102, 104, 106] {
            assert!(schedule.on_block(block).is_empty());
        }
    }

    #[test]
    fn test_skipped_compare_block_still_compares() {
        let mut schedule = BlockSchedule::default();
        schedule.on_block(100);
        assert_eq!(
            schedule.on_block(104),
            vec![BlockAction::Compare { target: 95 }]
        );
    }

    #[test]
    fn test_compare_runs_before_send_on_same_block() {
        // cadence 3, lag 3: the compare for 6 lands on 9, also a send block
        let mut schedule = BlockSchedule::new(3, 2, 3);
        schedule.on_block(6);
        assert_eq!(
            schedule.on_block(9),
            vec![
                BlockAction::Compare { target: 4 },
                BlockAction::SendReports { target: 7 },
            ]
        );
        assert_eq!(schedule.pending_compare(), Some(12));
    }

    #[test]
    fn test_genesis_underflow_skipped() {
        let mut schedule = BlockSchedule::default();
        assert!(schedule.on_block(0).is_empty());
        assert_eq!(
            schedule.on_block(5),
            vec![BlockAction::SendReports { target: 0 }]
        );
    }

    #[test]
    fn test_stale_blocks_ignored() {
        let mut schedule = BlockSchedule::default();
        schedule.on_block(100);
        assert!(schedule.on_block(100).is_empty());
        assert!(schedule.on_block(99).is_empty());
        assert_eq!(schedule.pending_compare(), Some(103));
    }

    #[test]
    fn test_zero_cadence_is_clamped() {
        let mut schedule = BlockSchedule::new(0, 0, 0);
        assert_eq!(
            schedule.on_block(1),
            vec![BlockAction::SendReports { target: 1 }]
        );
    }
}
