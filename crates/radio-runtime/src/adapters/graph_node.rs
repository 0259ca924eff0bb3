//! Proof of indexing source backed by graph-node's index status API.

use async_trait::async_trait;
use poi_radio::{BlockPointer, PoiSource, PortError};
use serde::Deserialize;
use serde_json::json;

use super::graphql::GraphQlClient;

const PROOF_OF_INDEXING: &str = r#"
query proofOfIndexing($subgraph: String!, $blockNumber: Int!, $blockHash: Bytes!, $indexer: Bytes) {
  proofOfIndexing(
    subgraph: $subgraph,
    blockNumber: $blockNumber,
    blockHash: $blockHash,
    indexer: $indexer
  )
}"#;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PoiData {
    proof_of_indexing: Option<String>,
}

pub struct GraphNodeStatus {
    client: GraphQlClient,
}

impl GraphNodeStatus {
    pub fn new(client: GraphQlClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PoiSource for GraphNodeStatus {
    async fn proof_of_indexing(
        &self,
        deployment: &str,
        block: &BlockPointer,
        indexer: &str,
    ) -> Result<Option<String>, PortError> {
        let data: PoiData = self
            .client
            .query(
                PROOF_OF_INDEXING,
                json!({
                    "subgraph": deployment,
                    "blockNumber": block.number,
                    "blockHash": block.hash,
                    "indexer": indexer,
                }),
            )
            .await?;

        if data.proof_of_indexing.is_none() {
            radio_telemetry::log_gossip_event!(
                debug,
                "graph-node has no proof of indexing",
                deployment,
                block.number
            );
        }
        Ok(data.proof_of_indexing)
    }
}
