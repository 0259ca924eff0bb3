//! # Graphcast POI Radio
//!
//! Gossips signed normalized proofs of indexing (nPOIs) between indexers,
//! weighs every report by the reporter's stake, and flags deployments where
//! the local nPOI diverges from the stake majority.
//!
//! ## Message Pipeline
//!
//! ```text
//! bytes ─decode─→ Envelope ─recover─→ sender ─filter─→ Attestation ─→ store
//!                                               │
//!        identity → stake → disputes → freshness/block → nonce
//! ```
//!
//! Every gate fails closed: an unreachable oracle rejects the message,
//! except for the dispute list which only ever adds reasons to reject.
//!
//! ## Block Cadence
//!
//! | Event | Block | Effect |
//! |-------|-------|--------|
//! | Send | `b % cadence == 0` | Publish nPOIs for `b - offset` |
//! | Compare | `b + compare_lag` | Majority vs local, then clear |
//!
//! Defaults are cadence 5, offset 5, compare lag 3. A divergence pushes the
//! punitive cost model `default => 100000;` to the indexer management server.
//!
//! ## Module Structure (Hexagonal Architecture)
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  adapters/ - In-memory gossip transport                         │
//! └─────────────────────────────────────────────────────────────────┘
//!                          ↑ implements ↑
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  ports/inbound.rs  - GossipRadioApi trait                       │
//! │  ports/outbound.rs - GossipTransport, ChainSource, StakeOracle, │
//! │                      PoiSource, CostModelSink, TimeSource       │
//! └─────────────────────────────────────────────────────────────────┘
//!                          ↑ uses ↑
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  domain/envelope.rs    - protobuf wire envelope                 │
//! │  domain/typed_data.rs  - EIP-712 schema and digest              │
//! │  domain/identity.rs    - secp256k1 signing and recovery         │
//! │  domain/validity.rs    - validity gates, nonce directory        │
//! │  domain/attestation.rs - stake-weighted store, divergences      │
//! │  domain/schedule.rs    - send/compare block schedule            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! let service = RadioService::new(RadioDependencies {
//!     transport, chain, oracle, poi_source, cost_models,
//!     wallet: LocalWallet::from_hex_key(&key)?,
//!     config: RadioConfig::default(),
//! })?;
//! service.initialize().await;
//! service.run(blocks, shutdown).await?;
//! ```

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

pub use adapters::*;
pub use domain::*;
pub use ports::*;
pub use service::{
    spawn_block_watcher, Candidate, RadioDependencies, RadioService, ValidityFilter,
    MAX_CATCH_UP,
};
