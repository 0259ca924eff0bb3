//! # Gossip Flow Integration Tests
//!
//! Two radios share one in-memory gossip mesh, one chain and one stake
//! oracle. Each runs its own service loop, driven by block numbers pushed
//! through a channel the way the block watcher does in production.
//!
//! The heavier indexer and the lighter indexer disagree on a deployment's
//! nPOI; only the lighter one must see a divergence and push the punitive
//! cost model.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use k256::ecdsa::SigningKey;
use parking_lot::Mutex;
use poi_radio::{
    BlockPointer, ChainSource, CostModel, CostModelSink, Dispute, GossipRadioApi,
    InMemoryTransport, LocalWallet, PoiSource, PortError, RadioConfig, RadioDependencies,
    RadioService, StakeOracle, TimeSource,
};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;

// =============================================================================
// TEST HELPERS
// =============================================================================

struct SharedChain;

#[async_trait]
impl ChainSource for SharedChain {
    async fn current_block_number(&self) -> Result<u64, PortError> {
        Ok(100)
    }

    async fn block(&self, number: u64) -> Result<BlockPointer, PortError> {
        Ok(BlockPointer::new(number, format!("0x{number:064x}")))
    }
}

#[derive(Default)]
struct SharedOracle {
    operators: Mutex<HashMap<String, String>>,
    stakes: Mutex<HashMap<String, u128>>,
    allocations: Mutex<HashMap<String, Vec<String>>>,
}

#[async_trait]
impl StakeOracle for SharedOracle {
    async fn indexer_for_operator(&self, operator: &str) -> Result<Option<String>, PortError> {
        Ok(self.operators.lock().get(operator).cloned())
    }

    async fn stake_of(&self, indexer: &str) -> Result<u128, PortError> {
        Ok(self.stakes.lock().get(indexer).copied().unwrap_or(0))
    }

    async fn minimum_stake(&self) -> Result<u128, PortError> {
        Ok(1)
    }

    async fn open_disputes(&self, _indexer: &str) -> Result<Vec<Dispute>, PortError> {
        Ok(Vec::new())
    }

    async fn allocated_deployments(&self, indexer: &str) -> Result<Vec<String>, PortError> {
        Ok(self
            .allocations
            .lock()
            .get(indexer)
            .cloned()
            .unwrap_or_default())
    }
}

struct FixedPoi(String);

#[async_trait]
impl PoiSource for FixedPoi {
    async fn proof_of_indexing(
        &self,
        _deployment: &str,
        _block: &BlockPointer,
        _indexer: &str,
    ) -> Result<Option<String>, PortError> {
        Ok(Some(self.0.clone()))
    }
}

#[derive(Default)]
struct RecordingCostModels(Mutex<Vec<CostModel>>);

#[async_trait]
impl CostModelSink for RecordingCostModels {
    async fn set_cost_model(&self, model: CostModel) -> Result<(), PortError> {
        self.0.lock().push(model);
        Ok(())
    }
}

/// Wall clock that never returns the same millisecond twice, so a report
/// delivered back to its sender within one millisecond is not future-dated.
struct TickingClock(AtomicU64);

impl TickingClock {
    fn new() -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self(AtomicU64::new(now))
    }
}

impl TimeSource for TickingClock {
    fn now_ms(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }
}

struct RunningRadio {
    service: Arc<RadioService>,
    cost_models: Arc<RecordingCostModels>,
    blocks: mpsc::Sender<u64>,
    handle: JoinHandle<()>,
}

fn make_deployment() -> String {
    let mut multihash = vec![0x12u8, 0x20];
    multihash.extend_from_slice(&[0xab; 32]);
    bs58::encode(multihash).into_string()
}

async fn start_radio(
    transport: Arc<InMemoryTransport>,
    oracle: Arc<SharedOracle>,
    clock: Arc<TickingClock>,
    indexer: &str,
    stake: u128,
    npoi: &str,
    shutdown: watch::Receiver<bool>,
) -> RunningRadio {
    let wallet = LocalWallet::new(SigningKey::random(&mut rand::thread_rng()));
    oracle
        .operators
        .lock()
        .insert(wallet.address_string(), indexer.to_string());
    oracle.stakes.lock().insert(indexer.to_string(), stake);
    oracle
        .allocations
        .lock()
        .insert(indexer.to_string(), vec![make_deployment()]);

    let cost_models = Arc::new(RecordingCostModels::default());
    let service = Arc::new(
        RadioService::new(RadioDependencies {
            transport,
            chain: Arc::new(SharedChain),
            oracle,
            poi_source: Arc::new(FixedPoi(npoi.to_string())),
            cost_models: cost_models.clone(),
            wallet,
            config: RadioConfig::default(),
        })
        .unwrap()
        .with_time_source(clock),
    );
    service.initialize().await;

    let (blocks, rx) = mpsc::channel(16);
    let runner = service.clone();
    let handle = tokio::spawn(async move {
        runner.run(rx, shutdown).await.unwrap();
    });

    RunningRadio {
        service,
        cost_models,
        blocks,
        handle,
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

// =============================================================================
// TESTS
// =============================================================================

#[tokio::test]
async fn test_minority_radio_detects_divergence() {
    let transport = Arc::new(InMemoryTransport::new());
    let oracle = Arc::new(SharedOracle::default());
    let clock = Arc::new(TickingClock::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let heavy = start_radio(
        transport.clone(),
        oracle.clone(),
        clock.clone(),
        "0xheavy",
        1_000,
        "0xaaaa",
        shutdown_rx.clone(),
    )
    .await;
    let light = start_radio(
        transport.clone(),
        oracle.clone(),
        clock.clone(),
        "0xlight",
        10,
        "0xbbbb",
        shutdown_rx,
    )
    .await;
    wait_until(|| transport.subscriber_count() == 2).await;

    // Send round for block 95
    for radio in [&heavy, &light] {
        radio.blocks.send(100).await.unwrap();
    }
    wait_until(|| {
        heavy.service.attestation_count() == 2 && light.service.attestation_count() == 2
    })
    .await;

    let deployment = make_deployment();
    let stored = light.service.attestations(&deployment, 95);
    assert_eq!(stored.len(), 2);
    assert!(stored
        .iter()
        .any(|a| a.value == "0xaaaa" && a.stake_weight == 1_000));

    // Compare round
    for radio in [&heavy, &light] {
        radio.blocks.send(103).await.unwrap();
    }
    wait_until(|| !light.cost_models.0.lock().is_empty()).await;
    wait_until(|| heavy.service.attestation_count() == 0).await;

    let applied = light.cost_models.0.lock().clone();
    assert_eq!(applied.len(), 1);
    assert_eq!(applied[0].deployment, format!("0x{}", "ab".repeat(32)));
    assert_eq!(applied[0].model, "default => 100000;");
    assert!(heavy.cost_models.0.lock().is_empty());
    assert_eq!(light.service.attestation_count(), 0);

    shutdown_tx.send(true).unwrap();
    for radio in [heavy, light] {
        timeout(Duration::from_secs(5), radio.handle)
            .await
            .unwrap()
            .unwrap();
    }
}

#[tokio::test]
async fn test_unstaked_radio_is_ignored() {
    let transport = Arc::new(InMemoryTransport::new());
    let oracle = Arc::new(SharedOracle::default());
    let clock = Arc::new(TickingClock::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let staked = start_radio(
        transport.clone(),
        oracle.clone(),
        clock.clone(),
        "0xstaked",
        100,
        "0xaaaa",
        shutdown_rx.clone(),
    )
    .await;
    let unstaked = start_radio(
        transport.clone(),
        oracle.clone(),
        clock.clone(),
        "0xunstaked",
        0,
        "0xbbbb",
        shutdown_rx,
    )
    .await;
    wait_until(|| transport.subscriber_count() == 2).await;

    for radio in [&staked, &unstaked] {
        radio.blocks.send(100).await.unwrap();
    }
    wait_until(|| transport.messages_published() == 2).await;
    wait_until(|| unstaked.service.attestation_count() == 1).await;

    // Only the staked report is ever stored
    tokio::time::sleep(Duration::from_millis(50)).await;
    for radio in [&staked, &unstaked] {
        let stored = radio.service.attestations(&make_deployment(), 95);
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].value, "0xaaaa");
    }

    shutdown_tx.send(true).unwrap();
    for radio in [staked, unstaked] {
        timeout(Duration::from_secs(5), radio.handle)
            .await
            .unwrap()
            .unwrap();
    }
}
