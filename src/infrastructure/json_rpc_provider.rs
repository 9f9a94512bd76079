//! Ethereum JSON-RPC access over HTTP

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

use crate::domain::transactions::{BlockchainProvider, TxReceipt};
use crate::shared::errors::ProviderError;

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// Receipt as returned by `eth_getTransactionReceipt`, quantities hex-encoded
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    block_hash: String,
    block_number: String,
    contract_address: Option<String>,
    from: String,
    status: Option<String>,
    to: Option<String>,
    transaction_hash: String,
    transaction_index: String,
}

impl RawReceipt {
    fn normalize(self) -> Result<TxReceipt, ProviderError> {
        Ok(TxReceipt {
            block_hash: self.block_hash,
            block_number: parse_quantity(&self.block_number)?,
            contract_address: self.contract_address,
            from: self.from,
            status: self.status.as_deref().map(parse_quantity).transpose()?,
            to: self.to,
            transaction_hash: self.transaction_hash,
            transaction_index: parse_quantity(&self.transaction_index)?,
        })
    }
}

fn parse_quantity(value: &str) -> Result<u64, ProviderError> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    u64::from_str_radix(digits, 16)
        .map_err(|e| ProviderError::InvalidResponse(format!("bad quantity {:?}: {}", value, e)))
}

pub struct JsonRpcProvider {
    http_client: Client,
    rpc_url: String,
    request_id: AtomicU64,
}

impl JsonRpcProvider {
    pub fn new(rpc_url: impl Into<String>, timeout: Duration) -> Result<Self, ProviderError> {
        let http_client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            rpc_url: rpc_url.into(),
            request_id: AtomicU64::new(1),
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<Option<T>, ProviderError> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.request_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };
        debug!("RPC {} #{}", method, request.id);

        let response = self
            .http_client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ProviderError::Network(format!(
                "{} returned status {}",
                method,
                response.status()
            )));
        }

        let body: RpcResponse<T> = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        if let Some(error) = body.error {
            return Err(ProviderError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        Ok(body.result)
    }
}

#[async_trait]
impl BlockchainProvider for JsonRpcProvider {
    async fn get_transaction_receipt(&self, hash: &str) -> Result<Option<TxReceipt>, ProviderError> {
        let raw: Option<RawReceipt> = self
            .call("eth_getTransactionReceipt", serde_json::json!([hash]))
            .await?;
        raw.map(RawReceipt::normalize).transpose()
    }

    async fn block_number(&self) -> Result<u64, ProviderError> {
        let value: Option<String> = self.call("eth_blockNumber", serde_json::json!([])).await?;
        let value = value.ok_or_else(|| ProviderError::InvalidResponse("empty eth_blockNumber result".to_string()))?;
        parse_quantity(&value)
    }
}
