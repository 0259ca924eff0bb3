//! HTTP adapters implementing the radio's outbound ports.

mod eth_rpc;
mod graph_node;
mod graphql;
mod indexer_management;
mod network_subgraph;

pub use eth_rpc::EthRpcClient;
pub use graph_node::GraphNodeStatus;
pub use graphql::GraphQlClient;
pub use indexer_management::IndexerManagement;
pub use network_subgraph::NetworkSubgraph;
