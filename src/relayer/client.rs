//! HTTP client for the transaction relayer

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

use super::auth::AuthHeaders;
use crate::common::errors::{EngineError, Result};
use crate::common::traits::ChainGateway;
use crate::common::types::{normalize_address, TxReceipt};
use crate::config::types::{ApiCredentials, RelayerConfig};
use crate::indexer::messages::parse_amount;

#[derive(Debug, Deserialize)]
struct AllowanceResponse {
    allowance: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    tx_hash: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApproveRequest<'a> {
    token: &'a str,
    spender: &'a str,
    amount: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BuyRequest<'a> {
    curve: &'a str,
    tickets: u64,
    max_cost: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SellRequest<'a> {
    curve: &'a str,
    tickets: u64,
    min_proceeds: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReceiptResponse {
    tx_hash: String,
    status: String,
    #[serde(default)]
    block_number: Option<u64>,
}

/// Relayer that signs and broadcasts transactions for one account
#[derive(Debug, Clone)]
pub struct RelayerClient {
    client: Client,
    base_url: String,
    credentials: ApiCredentials,
    account: String,
    settlement_token: String,
}

impl RelayerClient {
    pub fn new(config: &RelayerConfig, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::Internal(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            credentials: ApiCredentials::from(config),
            account: normalize_address(&config.account),
            settlement_token: normalize_address(&config.settlement_token),
        })
    }

    /// Account the relayer trades for
    pub fn account(&self) -> &str {
        &self.account
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<String>,
    ) -> Result<Option<T>> {
        let url = format!("{}{}", self.base_url, path);
        debug!("{} {}", method, url);

        let body = body.unwrap_or_default();
        let headers = AuthHeaders::sign(&self.credentials, method.as_str(), path, &body)?;
        let mut request = self.client.request(method, &url);
        if !body.is_empty() {
            request = request
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body);
        }
        let response = headers.apply_to_request(request).send().await?;

        let status = response.status();
        match status {
            StatusCode::NOT_FOUND => return Ok(None),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(EngineError::Authentication(format!(
                    "Relayer rejected credentials: {}",
                    status
                )));
            }
            _ => {}
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let err = format!("Relayer returned status {}: {}", status, text);
            return Err(if status.is_server_error() {
                EngineError::Unavailable(err)
            } else {
                EngineError::InvalidResponse(err)
            });
        }

        Ok(Some(response.json().await?))
    }

    async fn submit<B: Serialize>(&self, path: &str, body: &B) -> Result<String> {
        let body = serde_json::to_string(body)?;
        let response: SubmitResponse = self
            .send(Method::POST, path, Some(body))
            .await?
            .ok_or_else(|| EngineError::InvalidResponse(format!("{} not found", path)))?;
        Ok(response.tx_hash)
    }
}

#[async_trait]
impl ChainGateway for RelayerClient {
    #[instrument(skip(self))]
    async fn allowance(&self, owner: &str, spender: &str) -> Result<u128> {
        let path = format!(
            "/allowance?owner={}&spender={}&token={}",
            normalize_address(owner),
            normalize_address(spender),
            self.settlement_token
        );
        let response: AllowanceResponse = self
            .send(Method::GET, &path, None)
            .await?
            .ok_or_else(|| EngineError::InvalidResponse("allowance not found".to_string()))?;
        parse_amount("allowance", &response.allowance)
    }

    #[instrument(skip(self))]
    async fn approve(&self, spender: &str, amount: u128) -> Result<String> {
        let spender = normalize_address(spender);
        let request = ApproveRequest {
            token: &self.settlement_token,
            spender: &spender,
            amount: amount.to_string(),
        };
        self.submit("/approve", &request).await
    }

    #[instrument(skip(self))]
    async fn buy_tickets(&self, curve_address: &str, tickets: u64, max_cost: u128) -> Result<String> {
        let curve = normalize_address(curve_address);
        let request = BuyRequest {
            curve: &curve,
            tickets,
            max_cost: max_cost.to_string(),
        };
        self.submit("/buy", &request).await
    }

    #[instrument(skip(self))]
    async fn sell_tickets(
        &self,
        curve_address: &str,
        tickets: u64,
        min_proceeds: u128,
    ) -> Result<String> {
        let curve = normalize_address(curve_address);
        let request = SellRequest {
            curve: &curve,
            tickets,
            min_proceeds: min_proceeds.to_string(),
        };
        self.submit("/sell", &request).await
    }

    #[instrument(skip(self))]
    async fn receipt(&self, tx_hash: &str) -> Result<Option<TxReceipt>> {
        let path = format!("/receipts/{}", tx_hash);
        let Some(response) = self.send::<ReceiptResponse>(Method::GET, &path, None).await? else {
            return Ok(None);
        };
        match response.status.as_str() {
            "pending" => Ok(None),
            "confirmed" | "success" => Ok(Some(TxReceipt {
                tx_hash: response.tx_hash,
                success: true,
                block_number: response.block_number,
            })),
            "reverted" | "failed" => Ok(Some(TxReceipt {
                tx_hash: response.tx_hash,
                success: false,
                block_number: response.block_number,
            })),
            other => Err(EngineError::InvalidResponse(format!(
                "Unknown receipt status: {}",
                other
            ))),
        }
    }
}
