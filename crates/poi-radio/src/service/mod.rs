//! Radio Service - Core business logic
//!
//! # Architecture
//! - Inbound: bytes → decode → recover sender → validity filter → store
//! - Outbound: graph-node POI → sign → encode → publish, bounded by a
//!   semaphore with a per-report timeout
//! - Block ticks drive the send rounds and the stake-weighted comparison
//!
//! All mutable state (nonce directory, attestation store, local reports,
//! schedule) is owned by the service and only touched through its methods.

mod block_watcher;
mod filter;

pub use block_watcher::{spawn_block_watcher, MAX_CATCH_UP};
pub use filter::{Candidate, ValidityFilter};

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use radio_telemetry::metrics;

use crate::domain::{
    decode, encode, recover_sender, sign, Attestation, AttestationStore, BlockAction,
    BlockPointer, BlockSchedule, CostModel, Divergence, LocalReports, LocalWallet, NpoiPayload,
    RadioConfig, Topic, TypedSchema,
};
use crate::ports::{
    ChainSource, CostModelSink, GossipRadioApi, GossipTransport, InboundMessage, MessageError,
    PoiSource, RadioError, SendReport, StakeOracle, SystemTimeSource, TickReport, TimeSource,
};

/// Dependencies for RadioService
pub struct RadioDependencies {
    pub transport: Arc<dyn GossipTransport>,
    pub chain: Arc<dyn ChainSource>,
    pub oracle: Arc<dyn StakeOracle>,
    pub poi_source: Arc<dyn PoiSource>,
    pub cost_models: Arc<dyn CostModelSink>,
    pub wallet: LocalWallet,
    pub config: RadioConfig,
}

/// Who this radio reports for, resolved at startup.
#[derive(Debug, Default, Clone)]
struct RadioIdentity {
    indexer: Option<String>,
    deployments: Vec<String>,
}

/// Graphcast POI radio.
pub struct RadioService {
    transport: Arc<dyn GossipTransport>,
    chain: Arc<dyn ChainSource>,
    oracle: Arc<dyn StakeOracle>,
    poi_source: Arc<dyn PoiSource>,
    cost_models: Arc<dyn CostModelSink>,
    wallet: Arc<LocalWallet>,
    schema: Arc<TypedSchema>,
    config: RadioConfig,
    time_source: Arc<dyn TimeSource>,
    identity: RwLock<RadioIdentity>,
    // Held across oracle calls, so inbound messages are validated one at a time
    filter: tokio::sync::Mutex<ValidityFilter>,
    store: Mutex<AttestationStore>,
    local: Mutex<LocalReports>,
    schedule: Mutex<BlockSchedule>,
    last_compared: Mutex<Option<u64>>,
}

impl RadioService {
    /// Create a new RadioService
    pub fn new(deps: RadioDependencies) -> Result<Self, RadioError> {
        deps.config.validate()?;

        let filter = ValidityFilter::new(deps.oracle.clone(), deps.chain.clone(), &deps.config);
        let schedule = BlockSchedule::new(
            deps.config.cadence,
            deps.config.offset,
            deps.config.compare_lag,
        );

        Ok(Self {
            transport: deps.transport,
            chain: deps.chain,
            oracle: deps.oracle,
            poi_source: deps.poi_source,
            cost_models: deps.cost_models,
            wallet: Arc::new(deps.wallet),
            schema: Arc::new(TypedSchema::npoi()),
            config: deps.config,
            time_source: Arc::new(SystemTimeSource),
            identity: RwLock::new(RadioIdentity::default()),
            filter: tokio::sync::Mutex::new(filter),
            store: Mutex::new(AttestationStore::new()),
            local: Mutex::new(LocalReports::new()),
            schedule: Mutex::new(schedule),
            last_compared: Mutex::new(None),
        })
    }

    /// Set custom time source (for testing)
    pub fn with_time_source(mut self, time_source: Arc<dyn TimeSource>) -> Self {
        self.time_source = time_source;
        self
    }

    /// Lower-case address of the local operator key.
    pub fn operator_address(&self) -> String {
        self.wallet.address_string()
    }

    /// Indexer the local operator signs for, once resolved.
    pub fn local_indexer(&self) -> Option<String> {
        self.identity.read().indexer.clone()
    }

    /// Topics of every tracked deployment.
    pub fn topics(&self) -> Vec<String> {
        self.identity
            .read()
            .deployments
            .iter()
            .map(|d| self.config.topic_for(d))
            .collect()
    }

    pub fn config(&self) -> &RadioConfig {
        &self.config
    }

    /// Stored attestations for one bucket.
    pub fn attestations(&self, deployment: &str, block: u64) -> Vec<Attestation> {
        self.store.lock().attestations(deployment, block).to_vec()
    }

    pub fn attestation_count(&self) -> usize {
        self.store.lock().len()
    }

    /// Local nPOI recorded for a deployment at a block.
    pub fn local_value(&self, deployment: &str, block: u64) -> Option<String> {
        self.local.lock().get(deployment, block).map(str::to_string)
    }

    /// Subscribe to the tracked topics and serve messages and blocks until shutdown.
    ///
    /// Messages and blocks are handled one at a time, in arrival order.
    pub async fn run(
        &self,
        mut blocks: mpsc::Receiver<u64>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), RadioError> {
        let topics = self.topics();
        let mut inbound = self
            .transport
            .subscribe(&topics)
            .await
            .map_err(RadioError::Transport)?;

        info!(topics = topics.len(), "Radio listening");

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Radio shutting down");
                        break;
                    }
                }
                Some(message) = inbound.recv() => {
                    // Outcome is logged and counted inside
                    let _ = self.handle_message(message).await;
                }
                Some(block) = blocks.recv() => {
                    self.handle_block(block).await;
                }
                else => break,
            }
        }

        Ok(())
    }

    async fn process_message(&self, message: &InboundMessage) -> Result<Attestation, MessageError> {
        let envelope = decode(&message.payload)?;
        let block = envelope.block();

        let sender = recover_sender(
            &self.schema,
            &envelope.radio_payload,
            envelope.nonce,
            &block,
            &envelope.signature,
        )?;

        let payload: NpoiPayload = serde_json::from_str(&envelope.radio_payload)
            .map_err(|e| MessageError::Payload(e.to_string()))?;

        if let Ok(Topic {
            deployment: Some(deployment),
            ..
        }) = Topic::parse(&message.topic)
        {
            if deployment != payload.subgraph {
                return Err(MessageError::TopicMismatch {
                    deployment: payload.subgraph,
                    topic: message.topic.clone(),
                });
            }
        }

        let last_compared = *self.last_compared.lock();
        if let Some(compared) = last_compared {
            if block.number <= compared {
                return Err(MessageError::LateReport {
                    block: block.number,
                    compared,
                });
            }
        }

        let now_ms = self.time_source.now_ms();
        let stake = self
            .filter
            .lock()
            .await
            .validate(
                Candidate {
                    sender: &sender,
                    topic: &message.topic,
                    nonce: envelope.nonce,
                    block: &block,
                },
                now_ms,
            )
            .await?;

        let attestation = Attestation {
            value: payload.npoi,
            deployment: payload.subgraph,
            block_number: block.number,
            reporter: sender,
            stake_weight: stake,
        };
        self.store.lock().record(attestation.clone());
        Ok(attestation)
    }

    /// Compute, sign and publish the local nPOI of every tracked deployment at `target_block`.
    pub async fn send_reports(&self, target_block: u64) -> SendReport {
        let mut report = SendReport {
            target_block,
            ..SendReport::default()
        };

        let RadioIdentity {
            indexer,
            deployments,
        } = self.identity.read().clone();
        if deployments.is_empty() {
            debug!(block = target_block, "No tracked deployments, nothing to report");
            return report;
        }

        let Some(indexer) = indexer else {
            warn!(
                block = target_block,
                "Operator has no indexer, cannot query proofs of indexing"
            );
            mark_unavailable(&mut report, deployments);
            return report;
        };

        let block = match self.chain.block(target_block).await {
            Ok(block) => block,
            Err(e) => {
                warn!(block = target_block, error = %e, "Report block unavailable");
                mark_unavailable(&mut report, deployments);
                return report;
            }
        };

        let context = ReportContext {
            poi_source: self.poi_source.clone(),
            transport: self.transport.clone(),
            wallet: self.wallet.clone(),
            schema: self.schema.clone(),
            time_source: self.time_source.clone(),
            base_topic: self.config.base_topic(),
            indexer,
            block,
        };

        let semaphore = Arc::new(Semaphore::new(self.config.max_in_flight));
        let publish_timeout = self.config.publish_timeout;
        let mut tasks = JoinSet::new();

        for deployment in deployments {
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    error!(deployment = %deployment, error = %e, "Report semaphore closed");
                    report.failed.push(deployment);
                    continue;
                }
            };
            let context = context.clone();
            tasks.spawn(async move {
                let _permit = permit;
                let outcome = tokio::time::timeout(publish_timeout, context.publish(&deployment))
                    .await
                    .unwrap_or(ReportOutcome::TimedOut);
                (deployment, outcome)
            });
        }

        let mut local_values = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let (deployment, outcome) = match joined {
                Ok(result) => result,
                Err(e) => {
                    error!(block = target_block, error = %e, "Report task failed");
                    continue;
                }
            };
            match outcome {
                ReportOutcome::Published { npoi } => {
                    metrics::record_report_published();
                    debug!(deployment = %deployment, block = target_block, npoi = %npoi, "Report published");
                    local_values.push((deployment.clone(), npoi));
                    report.published.push(deployment);
                }
                ReportOutcome::Unavailable(reason) => {
                    metrics::record_deployment_unavailable();
                    debug!(deployment = %deployment, block = target_block, reason = %reason, "No local nPOI");
                    report.unavailable.push(deployment);
                }
                ReportOutcome::Failed { npoi, reason } => {
                    warn!(deployment = %deployment, block = target_block, error = %reason, "Report publish failed");
                    if let Some(npoi) = npoi {
                        local_values.push((deployment.clone(), npoi));
                    }
                    report.failed.push(deployment);
                }
                ReportOutcome::TimedOut => {
                    warn!(deployment = %deployment, block = target_block, "Report timed out");
                    report.failed.push(deployment);
                }
            }
        }

        {
            let mut local = self.local.lock();
            for (deployment, npoi) in local_values {
                local.record(deployment, target_block, npoi);
            }
        }

        report.published.sort();
        report.unavailable.sort();
        report.failed.sort();

        if !report.unavailable.is_empty() {
            warn!(
                block = target_block,
                unavailable = ?report.unavailable,
                "Deployments unavailable for this report round"
            );
        }
        info!(
            block = target_block,
            published = report.published.len(),
            unavailable = report.unavailable.len(),
            failed = report.failed.len(),
            "Report round complete"
        );

        report
    }

    /// Compare local nPOIs at `target_block` with the stake majority, then clear all state.
    pub async fn compare(&self, target_block: u64) -> Vec<Divergence> {
        let divergences = {
            let mut store = self.store.lock();
            let mut local = self.local.lock();
            let divergences = store.detect_divergence(&local, target_block);

            for (deployment, majority) in store.summary(target_block) {
                debug!(
                    deployment = %deployment,
                    block = target_block,
                    value = %majority.value,
                    stake = %majority.stake_weight,
                    reporters = ?majority.reporters,
                    "Majority attestation"
                );
            }
            info!(
                block = target_block,
                attestations = store.len(),
                local_reports = local.len(),
                divergences = divergences.len(),
                "Comparison complete"
            );

            store.clear();
            local.clear();
            divergences
        };
        *self.last_compared.lock() = Some(target_block);

        let pruned = self
            .filter
            .lock()
            .await
            .prune_nonces(self.time_source.now_ms());
        if pruned > 0 {
            debug!(pruned, "Evicted idle nonce entries");
        }

        for divergence in &divergences {
            metrics::record_divergence();
            warn!(
                deployment = %divergence.deployment,
                block = divergence.block_number,
                local = %divergence.local_value,
                majority = %divergence.majority.value,
                majority_stake = %divergence.majority.stake_weight,
                "Local nPOI diverges from the stake majority"
            );
            self.apply_cost_model(divergence).await;
        }

        divergences
    }

    /// Push the punitive cost model. Failures are logged and not retried this cycle.
    async fn apply_cost_model(&self, divergence: &Divergence) {
        let Some(key) = divergence.cost_model_key.clone() else {
            metrics::record_cost_model_failure();
            warn!(
                deployment = %divergence.deployment,
                "Deployment id is not a sha2-256 multihash, cost model not updated"
            );
            return;
        };

        let model = CostModel {
            deployment: key,
            model: self.config.cost_model.clone(),
            variables: None,
        };
        match self.cost_models.set_cost_model(model).await {
            Ok(()) => info!(deployment = %divergence.deployment, "Punitive cost model applied"),
            Err(e) => {
                metrics::record_cost_model_failure();
                warn!(deployment = %divergence.deployment, error = %e, "Cost model update failed");
            }
        }
    }
}

#[async_trait]
impl GossipRadioApi for RadioService {
    async fn initialize(&self) -> Vec<String> {
        let operator = self.operator_address();

        let indexer = match self.oracle.indexer_for_operator(&operator).await {
            Ok(Some(indexer)) => Some(indexer.to_lowercase()),
            Ok(None) => {
                warn!(operator = %operator, "Operator is not registered for any indexer");
                None
            }
            Err(e) => {
                warn!(operator = %operator, error = %e, "Operator lookup failed");
                None
            }
        };

        let mut deployments: Vec<String> = Vec::new();
        if let Some(indexer) = &indexer {
            match self.oracle.allocated_deployments(indexer).await {
                Ok(allocated) => deployments.extend(allocated),
                Err(e) => warn!(indexer = %indexer, error = %e, "Allocation lookup failed"),
            }
        }
        if let Some(test_topic) = &self.config.test_topic {
            deployments.push(test_topic.clone());
        }
        let mut seen = std::collections::HashSet::new();
        deployments.retain(|d| seen.insert(d.clone()));

        *self.identity.write() = RadioIdentity {
            indexer: indexer.clone(),
            deployments,
        };

        let topics = self.topics();
        info!(
            operator = %operator,
            indexer = ?indexer,
            topics = topics.len(),
            "Radio initialized"
        );
        topics
    }

    async fn handle_message(&self, message: InboundMessage) -> Result<Attestation, MessageError> {
        metrics::record_message_received();

        let result = self.process_message(&message).await;
        match &result {
            Ok(attestation) => {
                metrics::record_attestation_stored();
                debug!(
                    deployment = %attestation.deployment,
                    block = attestation.block_number,
                    sender = %attestation.reporter,
                    stake = %attestation.stake_weight,
                    "Attestation stored"
                );
            }
            Err(e) => {
                metrics::record_message_rejected(e.reason());
                match e {
                    MessageError::Decode(_) => {
                        warn!(topic = %message.topic, error = %e, "Dropping undecodable message")
                    }
                    _ => debug!(
                        topic = %message.topic,
                        reason = e.reason(),
                        error = %e,
                        "Message rejected"
                    ),
                }
            }
        }
        result
    }

    async fn handle_block(&self, block: u64) -> TickReport {
        let actions = self.schedule.lock().on_block(block);

        let mut tick = TickReport {
            block,
            ..TickReport::default()
        };
        for action in actions {
            match action {
                BlockAction::Compare { target } => tick.divergences = self.compare(target).await,
                BlockAction::SendReports { target } => {
                    tick.sent = Some(self.send_reports(target).await)
                }
            }
        }
        tick
    }

    fn tracked_deployments(&self) -> Vec<String> {
        self.identity.read().deployments.clone()
    }
}

fn mark_unavailable(report: &mut SendReport, deployments: Vec<String>) {
    for _ in &deployments {
        metrics::record_deployment_unavailable();
    }
    report.unavailable = deployments;
}

/// Result of one deployment's report task.
#[derive(Debug)]
enum ReportOutcome {
    Published { npoi: String },
    Unavailable(String),
    Failed { npoi: Option<String>, reason: String },
    TimedOut,
}

/// Everything a spawned report task needs, owned.
#[derive(Clone)]
struct ReportContext {
    poi_source: Arc<dyn PoiSource>,
    transport: Arc<dyn GossipTransport>,
    wallet: Arc<LocalWallet>,
    schema: Arc<TypedSchema>,
    time_source: Arc<dyn TimeSource>,
    base_topic: Topic,
    indexer: String,
    block: BlockPointer,
}

impl ReportContext {
    async fn publish(&self, deployment: &str) -> ReportOutcome {
        let npoi = match self
            .poi_source
            .proof_of_indexing(deployment, &self.block, &self.indexer)
            .await
        {
            Ok(Some(npoi)) => npoi,
            Ok(None) => return ReportOutcome::Unavailable("not indexed at block".to_string()),
            Err(e) => return ReportOutcome::Unavailable(e.to_string()),
        };

        let payload = match serde_json::to_string(&NpoiPayload::new(deployment, npoi.clone())) {
            Ok(payload) => payload,
            Err(e) => {
                return ReportOutcome::Failed {
                    npoi: Some(npoi),
                    reason: e.to_string(),
                }
            }
        };

        let nonce = self.time_source.now_ms();
        let signature = match sign(&self.wallet, &self.schema, &payload, nonce, &self.block) {
            Ok(signature) => signature,
            Err(e) => {
                return ReportOutcome::Failed {
                    npoi: Some(npoi),
                    reason: e.to_string(),
                }
            }
        };

        let bytes = encode(&payload, nonce, &self.block, &signature);
        let topic = self.base_topic.with_deployment(deployment).to_string();
        match self.transport.publish(&topic, bytes).await {
            Ok(()) => ReportOutcome::Published { npoi },
            Err(e) => ReportOutcome::Failed {
                npoi: Some(npoi),
                reason: e.to_string(),
            },
        }
    }
}
