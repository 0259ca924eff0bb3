//! Stake oracle backed by the network and registry subgraphs.

use async_trait::async_trait;
use poi_radio::{Dispute, PortError, StakeOracle};
use serde::Deserialize;
use serde_json::json;

use super::graphql::{parse_tokens, GraphQlClient};

const GOSSIP_OPERATOR_OF: &str = r#"
query gossipOperatorOf($address: String!) {
  graphAccount(id: $address) {
    id
    gossipOperatorOf {
      id
    }
  }
}"#;

const INDEXER_STAKE: &str = r#"
query indexer($address: String!) {
  indexer(id: $address) {
    stakedTokens
  }
}"#;

const MINIMUM_STAKE: &str = r#"
{
  graphNetwork(id: "1") {
    minimumIndexerStake
  }
}"#;

const INDEXER_DISPUTES: &str = r#"
query disputes($address: String!) {
  disputes(where: { indexer: $address }) {
    id
    tokensSlashed
  }
}"#;

const INDEXER_ALLOCATIONS: &str = r#"
query indexer($address: String!) {
  indexer(id: $address) {
    allocations {
      subgraphDeployment {
        ipfsHash
      }
    }
  }
}"#;

#[derive(Debug, Deserialize)]
struct AccountId {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphAccount {
    gossip_operator_of: Option<AccountId>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperatorData {
    graph_account: Option<GraphAccount>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexerStake {
    staked_tokens: String,
}

#[derive(Debug, Deserialize)]
struct StakeData {
    indexer: Option<IndexerStake>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphNetwork {
    minimum_indexer_stake: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NetworkData {
    graph_network: Option<GraphNetwork>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DisputeEntry {
    id: String,
    tokens_slashed: String,
}

#[derive(Debug, Deserialize)]
struct DisputeData {
    disputes: Vec<DisputeEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Deployment {
    ipfs_hash: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Allocation {
    subgraph_deployment: Deployment,
}

#[derive(Debug, Deserialize)]
struct IndexerAllocations {
    allocations: Vec<Allocation>,
}

#[derive(Debug, Deserialize)]
struct AllocationData {
    indexer: Option<IndexerAllocations>,
}

/// Stake, dispute and allocation data from the network subgraph; operator
/// registrations from the registry subgraph.
pub struct NetworkSubgraph {
    network: GraphQlClient,
    registry: GraphQlClient,
}

impl NetworkSubgraph {
    pub fn new(network: GraphQlClient, registry: GraphQlClient) -> Self {
        Self { network, registry }
    }
}

#[async_trait]
impl StakeOracle for NetworkSubgraph {
    async fn indexer_for_operator(&self, operator: &str) -> Result<Option<String>, PortError> {
        let data: OperatorData = self
            .registry
            .query(GOSSIP_OPERATOR_OF, json!({ "address": operator.to_lowercase() }))
            .await?;
        Ok(indexer_of(data))
    }

    async fn stake_of(&self, indexer: &str) -> Result<u128, PortError> {
        let data: StakeData = self
            .network
            .query(INDEXER_STAKE, json!({ "address": indexer }))
            .await?;
        stake_from(data)
    }

    async fn minimum_stake(&self) -> Result<u128, PortError> {
        let data: NetworkData = self.network.query(MINIMUM_STAKE, json!({})).await?;
        minimum_stake_from(data)
    }

    async fn open_disputes(&self, indexer: &str) -> Result<Vec<Dispute>, PortError> {
        let data: DisputeData = self
            .network
            .query(INDEXER_DISPUTES, json!({ "address": indexer }))
            .await?;
        disputes_from(data)
    }

    async fn allocated_deployments(&self, indexer: &str) -> Result<Vec<String>, PortError> {
        let data: AllocationData = self
            .network
            .query(INDEXER_ALLOCATIONS, json!({ "address": indexer }))
            .await?;
        Ok(deployments_from(data))
    }
}

fn indexer_of(data: OperatorData) -> Option<String> {
    data.graph_account
        .and_then(|account| account.gossip_operator_of)
        .map(|indexer| indexer.id.to_lowercase())
}

// An indexer the subgraph does not know has no stake
fn stake_from(data: StakeData) -> Result<u128, PortError> {
    match data.indexer {
        Some(indexer) => parse_tokens(&indexer.staked_tokens),
        None => Ok(0),
    }
}

fn minimum_stake_from(data: NetworkData) -> Result<u128, PortError> {
    let network = data
        .graph_network
        .ok_or_else(|| PortError::InvalidResponse("graph network not found".to_string()))?;
    parse_tokens(&network.minimum_indexer_stake)
}

fn disputes_from(data: DisputeData) -> Result<Vec<Dispute>, PortError> {
    data.disputes
        .into_iter()
        .map(|dispute| {
            Ok(Dispute {
                id: dispute.id,
                tokens_slashed: parse_tokens(&dispute.tokens_slashed)?,
            })
        })
        .collect()
}

fn deployments_from(data: AllocationData) -> Vec<String> {
    data.indexer
        .map(|indexer| {
            indexer
                .allocations
                .into_iter()
                .map(|allocation| allocation.subgraph_deployment.ipfs_hash)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::graphql::{into_data, GraphQlResponse};

    fn parse<T: serde::de::DeserializeOwned>(body: &str) -> T {
        let response: GraphQlResponse<T> = serde_json::from_str(body).unwrap();
        into_data(response).unwrap()
    }

    #[test]
    fn test_operator_resolves_to_indexer() {
        let data: OperatorData = parse(
            r#"{"data":{"graphAccount":{"id":"0xop","gossipOperatorOf":{"id":"0xABCdef"}}}}"#,
        );
        assert_eq!(indexer_of(data).as_deref(), Some("0xabcdef"));
    }

    #[test]
    fn test_unregistered_operator() {
        let data: OperatorData =
            parse(r#"{"data":{"graphAccount":{"id":"0xop","gossipOperatorOf":null}}}"#);
        assert_eq!(indexer_of(data), None);

        let data: OperatorData = parse(r#"{"data":{"graphAccount":null}}"#);
        assert_eq!(indexer_of(data), None);
    }

    #[test]
    fn test_stake_parsing() {
        let data: StakeData =
            parse(r#"{"data":{"indexer":{"stakedTokens":"100000000000000000000000"}}}"#);
        assert_eq!(stake_from(data).unwrap(), 100_000 * 10u128.pow(18));

        let data: StakeData = parse(r#"{"data":{"indexer":null}}"#);
        assert_eq!(stake_from(data).unwrap(), 0);
    }

    #[test]
    fn test_minimum_stake_parsing() {
        let data: NetworkData = parse(
            r#"{"data":{"graphNetwork":{"minimumIndexerStake":"100000000000000000000000"}}}"#,
        );
        assert_eq!(minimum_stake_from(data).unwrap(), 100_000 * 10u128.pow(18));

        let data: NetworkData = parse(r#"{"data":{"graphNetwork":null}}"#);
        assert!(minimum_stake_from(data).is_err());
    }

    #[test]
    fn test_disputes_parsing() {
        let data: DisputeData = parse(
            r#"{"data":{"disputes":[{"id":"0xd1","tokensSlashed":"0"},{"id":"0xd2","tokensSlashed":"500"}]}}"#,
        );
        let disputes = disputes_from(data).unwrap();
        assert_eq!(disputes.len(), 2);
        assert_eq!(disputes[1].tokens_slashed, 500);
    }

    #[test]
    fn test_allocations_parsing() {
        let data: AllocationData = parse(
            r#"{"data":{"indexer":{"allocations":[
                {"subgraphDeployment":{"ipfsHash":"QmA"}},
                {"subgraphDeployment":{"ipfsHash":"QmB"}}
            ]}}}"#,
        );
        assert_eq!(deployments_from(data), vec!["QmA", "QmB"]);

        let data: AllocationData = parse(r#"{"data":{"indexer":null}}"#);
        assert!(deployments_from(data).is_empty());
    }
}
