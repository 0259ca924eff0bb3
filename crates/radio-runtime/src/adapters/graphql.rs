//! Minimal GraphQL-over-HTTP client shared by the subgraph adapters.

use poi_radio::PortError;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Serialize)]
struct GraphQlRequest<'a> {
    query: &'a str,
    variables: Value,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

/// A single GraphQL endpoint.
#[derive(Clone)]
pub struct GraphQlClient {
    client: Client,
    endpoint: String,
}

impl GraphQlClient {
    pub fn new(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    /// Run a query and deserialize its `data` field.
    pub async fn query<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: Value,
    ) -> Result<T, PortError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&GraphQlRequest { query, variables })
            .send()
            .await
            .map_err(|e| http_error(&self.endpoint, e))?;

        if !response.status().is_success() {
            return Err(PortError::Unavailable(format!(
                "{} returned {}",
                self.endpoint,
                response.status()
            )));
        }

        let body: GraphQlResponse<T> = response
            .json()
            .await
            .map_err(|e| PortError::InvalidResponse(e.to_string()))?;
        into_data(body)
    }
}

/// Unwrap a response, turning GraphQL errors into port errors.
pub(crate) fn into_data<T>(response: GraphQlResponse<T>) -> Result<T, PortError> {
    if !response.errors.is_empty() {
        let messages: Vec<String> = response.errors.into_iter().map(|e| e.message).collect();
        return Err(PortError::Rejected(messages.join("; ")));
    }
    response
        .data
        .ok_or_else(|| PortError::InvalidResponse("missing data".to_string()))
}

/// Map a transport failure onto the port error the service understands.
pub(crate) fn http_error(endpoint: &str, e: reqwest::Error) -> PortError {
    if e.is_timeout() {
        PortError::Timeout
    } else if e.is_connect() {
        PortError::Unavailable(format!("cannot connect to {endpoint}"))
    } else {
        PortError::Unavailable(e.to_string())
    }
}

/// Parse a GraphQL `BigInt` (decimal string) token amount.
pub(crate) fn parse_tokens(raw: &str) -> Result<u128, PortError> {
    raw.parse::<u128>()
        .map_err(|_| PortError::InvalidResponse(format!("invalid token amount: {raw}")))
}
