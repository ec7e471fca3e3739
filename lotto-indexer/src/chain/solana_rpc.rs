// Copyright (c) BCLot, Inc.
// SPDX-License-Identifier: Apache-2.0

// Simple async JSON-RPC client for Solana fullnodes.
// Covers the four calls the adapter needs; no websocket subscriptions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{IndexerError, IndexerResult};

#[derive(Clone, Debug)]
pub struct SolanaRpcClient {
    http_client: reqwest::Client,
    rpc_url: String,
    request_id: Arc<AtomicU64>,
}

#[derive(Debug, Serialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    method: String,
    params: Vec<Value>,
    id: u64,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    result: Option<Value>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// One entry from `getSignaturesForAddress`, newest first.
#[derive(Debug, Clone, Deserialize)]
pub struct SignatureInfo {
    pub signature: String,
    pub slot: u64,
    pub err: Option<Value>,
    #[serde(rename = "blockTime")]
    pub block_time: Option<i64>,
}

impl SolanaRpcClient {
    pub fn new(rpc_url: impl Into<String>) -> Self {
        fn shared_http_client() -> reqwest::Client {
            static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();
            CLIENT
                .get_or_init(|| {
                    reqwest::Client::builder()
                        .pool_max_idle_per_host(64)
                        .tcp_keepalive(Some(Duration::from_secs(30)))
                        .connect_timeout(Duration::from_secs(2))
                        .timeout(Duration::from_secs(30))
                        .build()
                        .unwrap_or_default()
                })
                .clone()
        }

        Self {
            http_client: shared_http_client(),
            rpc_url: rpc_url.into(),
            request_id: Arc::new(AtomicU64::new(1)),
        }
    }

    async fn call(&self, method: &str, params: Vec<Value>) -> IndexerResult<Value> {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);

        let request = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
            id,
        };

        let response = self
            .http_client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| IndexerError::from_rpc_message(format!("{method}: {e}")))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(IndexerError::RateLimited(format!(
                "{method}: HTTP 429 from {}",
                self.rpc_url
            )));
        }
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(IndexerError::from_rpc_message(format!(
                "{method}: HTTP {status} - {error_text}"
            )));
        }

        let parsed: JsonRpcResponse = response
            .json()
            .await
            .map_err(|e| IndexerError::from_rpc_message(format!("{method}: {e}")))?;

        if let Some(err) = parsed.error {
            return Err(IndexerError::from_rpc_message(format!(
                "{method}: rpc error {}: {}",
                err.code, err.message
            )));
        }
        // A null result (e.g. an unknown transaction) deserializes as None
        Ok(parsed.result.unwrap_or(Value::Null))
    }

    pub async fn get_slot(&self) -> IndexerResult<u64> {
        let result = self
            .call("getSlot", vec![json!({"commitment": "finalized"})])
            .await?;
        result
            .as_u64()
            .ok_or_else(|| IndexerError::RpcError(format!("getSlot: non-numeric result {result}")))
    }

    pub async fn get_signatures_for_address(
        &self,
        address: &str,
        before: Option<&str>,
        limit: usize,
    ) -> IndexerResult<Vec<SignatureInfo>> {
        let mut options = json!({"limit": limit, "commitment": "finalized"});
        if let Some(before) = before {
            options["before"] = json!(before);
        }
        let result = self
            .call(
                "getSignaturesForAddress",
                vec![json!(address), options],
            )
            .await?;
        serde_json::from_value(result).map_err(|e| {
            IndexerError::RpcError(format!("getSignaturesForAddress: bad response: {e}"))
        })
    }

    /// Full transaction with metadata, or `None` when the node no longer has it.
    pub async fn get_transaction(&self, signature: &str) -> IndexerResult<Option<Value>> {
        let result = self
            .call(
                "getTransaction",
                vec![
                    json!(signature),
                    json!({
                        "encoding": "json",
                        "commitment": "finalized",
                        "maxSupportedTransactionVersion": 0,
                    }),
                ],
            )
            .await?;
        if result.is_null() {
            return Ok(None);
        }
        Ok(Some(result))
    }

    /// Raw account data, base64-decoded, or `None` for a missing account.
    pub async fn get_account_data(&self, pubkey: &str) -> IndexerResult<Option<Vec<u8>>> {
        let result = self
            .call(
                "getAccountInfo",
                vec![json!(pubkey), json!({"encoding": "base64"})],
            )
            .await?;
        let value = &result["value"];
        if value.is_null() {
            return Ok(None);
        }
        let encoded = value["data"][0]
            .as_str()
            .ok_or_else(|| IndexerError::RpcError("getAccountInfo: missing data".to_string()))?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| IndexerError::RpcError(format!("getAccountInfo: bad base64: {e}")))?;
        Ok(Some(bytes))
    }
}
