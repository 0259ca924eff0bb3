//! Adapters layer
//!
//! Network-facing adapters (GraphQL, JSON-RPC) live in the runtime crate.

pub mod memory;

pub use memory::InMemoryTransport;
