//! Chain source over Ethereum JSON-RPC.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use poi_radio::{BlockPointer, ChainSource, PortError};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::graphql::http_error;

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: Value,
    id: u64,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcBlock {
    number: String,
    hash: String,
}

/// JSON-RPC client for an Ethereum node.
pub struct EthRpcClient {
    client: Client,
    endpoint: String,
    request_id: AtomicU64,
}

impl EthRpcClient {
    pub fn new(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            request_id: AtomicU64::new(1),
        }
    }

    async fn call<R: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<Option<R>, PortError> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id: self.request_id.fetch_add(1, Ordering::Relaxed),
        };

        let response: JsonRpcResponse<R> = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| http_error(&self.endpoint, e))?
            .json()
            .await
            .map_err(|e| PortError::InvalidResponse(e.to_string()))?;

        rpc_result(response)
    }
}

#[async_trait]
impl ChainSource for EthRpcClient {
    async fn current_block_number(&self) -> Result<u64, PortError> {
        let number: String = self
            .call("eth_blockNumber", json!([]))
            .await?
            .ok_or_else(|| PortError::InvalidResponse("missing block number".to_string()))?;
        parse_quantity(&number)
    }

    async fn block(&self, number: u64) -> Result<BlockPointer, PortError> {
        let block: RpcBlock = self
            .call("eth_getBlockByNumber", json!([format!("{number:#x}"), false]))
            .await?
            .ok_or_else(|| PortError::Unavailable(format!("block {number} not found")))?;
        block_pointer(block)
    }
}

fn rpc_result<T>(response: JsonRpcResponse<T>) -> Result<Option<T>, PortError> {
    if let Some(error) = response.error {
        return Err(PortError::Rejected(format!(
            "{} (code {})",
            error.message, error.code
        )));
    }
    Ok(response.result)
}

fn block_pointer(block: RpcBlock) -> Result<BlockPointer, PortError> {
    Ok(BlockPointer::new(parse_quantity(&block.number)?, block.hash))
}

/// Parse a hex-encoded JSON-RPC quantity.
fn parse_quantity(raw: &str) -> Result<u64, PortError> {
    let digits = raw
        .strip_prefix("0x")
        .ok_or_else(|| PortError::InvalidResponse(format!("quantity without 0x: {raw}")))?;
    u64::from_str_radix(digits, 16)
        .map_err(|_| PortError::InvalidResponse(format!("invalid quantity: {raw}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("0x0").unwrap(), 0);
        assert_eq!(parse_quantity("0x10d4f").unwrap(), 68_943);
        assert!(parse_quantity("10").is_err());
        assert!(parse_quantity("0xzz").is_err());
    }

    #[test]
    fn test_block_response() {
        let response: JsonRpcResponse<RpcBlock> = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":1,"result":{"number":"0x5f","hash":"0xabc","parentHash":"0x0"}}"#,
        )
        .unwrap();
        let block = rpc_result(response).unwrap().unwrap();
        assert_eq!(
            block_pointer(block).unwrap(),
            BlockPointer::new(95, "0xabc")
        );
    }

    #[test]
    fn test_missing_block() {
        let response: JsonRpcResponse<RpcBlock> =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"result":null}"#).unwrap();
        assert!(rpc_result(response).unwrap().is_none());
    }

    #[test]
    fn test_rpc_error() {
        let response: JsonRpcResponse<String> = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"header not found"}}"#,
        )
        .unwrap();
        assert_eq!(
            rpc_result(response),
            Err(PortError::Rejected("header not found (code -32000)".to_string()))
        );
    }

    #[test]
    fn test_request_shape() {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method: "eth_getBlockByNumber",
            params: json!([format!("{:#x}", 95u64), false]),
            id: 3,
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"jsonrpc":"2.0","method":"eth_getBlockByNumber","params":["0x5f",false],"id":3})
        );
    }
}
