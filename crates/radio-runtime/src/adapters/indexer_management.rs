//! Cost model sink backed by the indexer management server.

use async_trait::async_trait;
use poi_radio::{CostModel, CostModelSink, PortError};
use serde::Deserialize;
use serde_json::{json, Value};

use super::graphql::GraphQlClient;

const SET_COST_MODEL: &str = r#"
mutation setCostModel($costModel: CostModelInput!) {
  setCostModel(costModel: $costModel) {
    deployment
    model
    variables
  }
}"#;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetCostModelData {
    set_cost_model: Option<Value>,
}

pub struct IndexerManagement {
    client: GraphQlClient,
}

impl IndexerManagement {
    pub fn new(client: GraphQlClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CostModelSink for IndexerManagement {
    async fn set_cost_model(&self, model: CostModel) -> Result<(), PortError> {
        let data: SetCostModelData = self
            .client
            .query(SET_COST_MODEL, cost_model_variables(&model))
            .await?;
        match data.set_cost_model {
            Some(_) => Ok(()),
            None => Err(PortError::Rejected(format!(
                "cost model for {} not stored",
                model.deployment
            ))),
        }
    }
}

fn cost_model_variables(model: &CostModel) -> Value {
    json!({ "costModel": model })
}
