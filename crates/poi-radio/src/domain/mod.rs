//! Domain layer for the gossip attestation engine
//!
//! Pure logic only: no I/O, no clocks, no async. Time is always passed in as
//! milliseconds since the Unix epoch.

mod attestation;
mod config;
mod deployment;
mod entities;
mod envelope;
mod errors;
mod identity;
mod schedule;
mod topic;
mod typed_data;
mod validity;

pub use attestation::*;
pub use config::*;
pub use deployment::*;
pub use entities::*;
pub use envelope::*;
pub use errors::*;
pub use identity::*;
pub use schedule::*;
pub use topic::*;
pub use typed_data::*;
pub use validity::*;
