//! Block watcher: turns chain polling into an ordered stream of block numbers.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::ports::ChainSource;

/// Most blocks replayed after a gap; older heights are skipped.
pub const MAX_CATCH_UP: u64 = 64;

/// Poll `chain` every `poll_interval` and emit each new block number once, in order.
///
/// The first poll emits only the current head. The task stops on shutdown or
/// when the receiver is dropped.
pub fn spawn_block_watcher(
    chain: Arc<dyn ChainSource>,
    poll_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> mpsc::Receiver<u64> {
    let (tx, rx) = mpsc::channel(MAX_CATCH_UP as usize);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last: Option<u64> = None;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("Block watcher stopped");
                        return;
                    }
                    continue;
                }
            }

            let current = match chain.current_block_number().await {
                Ok(number) => number,
                Err(e) => {
                    warn!(error = %e, "Block number poll failed");
                    continue;
                }
            };

            for block in new_blocks(last, current) {
                if tx.send(block).await.is_err() {
                    return;
                }
                last = Some(block);
            }
        }
    });

    rx
}

/// Heights to emit after `last` when the chain head is `current`.
fn new_blocks(last: Option<u64>, current: u64) -> Vec<u64> {
    match last {
        None => vec![current],
        Some(last) if current <= last => Vec::new(),
        Some(last) => {
            let start = (last + 1).max(current.saturating_sub(MAX_CATCH_UP - 1));
            (start..=current).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::BlockPointer;
    use crate::ports::PortError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct MockChain {
        head: AtomicU64,
    }

    #[async_trait]
    impl ChainSource for MockChain {
        async fn current_block_number(&self) -> Result<u64, PortError> {
            Ok(self.head.load(Ordering::SeqCst))
        }

        async fn block(&self, number: u64) -> Result<BlockPointer, PortError> {
            Ok(BlockPointer::new(number, format!("0x{number:04x}")))
        }
    }

    #[test]
    fn test_new_blocks() {
        assert_eq!(new_blocks(None, 10), vec![10]);
        assert_eq!(new_blocks(Some(10), 10), Vec::<u64>::new());
        assert_eq!(new_blocks(Some(10), 9), Vec::<u64>::new());
        assert_eq!(new_blocks(Some(10), 13), vec![11, 12, 13]);
    }

    #[test]
    fn test_catch_up_is_bounded() {
        let blocks = new_blocks(Some(0), 1_000);
        assert_eq!(blocks.len(), MAX_CATCH_UP as usize);
        assert_eq!(blocks.first(), Some(&(1_000 - MAX_CATCH_UP + 1)));
        assert_eq!(blocks.last(), Some(&1_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_watcher_emits_each_new_block() {
        let chain = Arc::new(MockChain {
            head: AtomicU64::new(10),
        });
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut blocks = spawn_block_watcher(chain.clone(), Duration::from_secs(1), shutdown_rx);

        assert_eq!(blocks.recv().await, Some(10));

        chain.head.store(13, Ordering::SeqCst);
        assert_eq!(blocks.recv().await, Some(11));
        assert_eq!(blocks.recv().await, Some(12));
        assert_eq!(blocks.recv().await, Some(13));
    }

    #[tokio::test(start_paused = true)]
    async fn test_watcher_stops_on_shutdown() {
        let chain = Arc::new(MockChain {
            head: AtomicU64::new(1),
        });
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut blocks = spawn_block_watcher(chain, Duration::from_secs(1), shutdown_rx);

        assert_eq!(blocks.recv().await, Some(1));
        shutdown_tx.send(true).unwrap();
        assert_eq!(blocks.recv().await, None);
    }
}
