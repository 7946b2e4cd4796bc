//! REST client for the chain indexer

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

use super::messages::*;
use crate::common::errors::{EngineError, Result};
use crate::common::traits::{
    CurveStateSource, MarketRegistry, OraclePriceSource, PositionEventSource,
};
use crate::common::types::{
    normalize_address, MarketInfo, OraclePrice, PositionUpdateEvent, SeasonId,
};
use crate::curve::CurveState;

/// REST client for the chain indexer
///
/// Serves position events, curve state, oracle prices and the market
/// registry from one base URL.
#[derive(Debug, Clone)]
pub struct IndexerRestClient {
    client: Client,
    base_url: String,
}

impl IndexerRestClient {
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeout(base_url, Duration::from_secs(30))
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/');
        let parsed = Url::parse(base_url)
            .map_err(|e| EngineError::Configuration(format!("invalid indexer url {}: {}", base_url, e)))?;
        if parsed.cannot_be_a_base() {
            return Err(EngineError::Configuration(format!(
                "indexer url {} cannot take a path",
                base_url
            )));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::Internal(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Base URL extended by percent-encoded path segments
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| EngineError::Configuration(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| EngineError::Configuration(format!("{} cannot take a path", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// GET a JSON document; `Ok(None)` on 404
    async fn get_optional<T: DeserializeOwned>(&self, url: &Url) -> Result<Option<T>> {
        debug!("Fetching from: {}", url);
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(map_transport)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Unavailable(format!(
                "Indexer returned status {}: {}",
                status, body
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::InvalidResponse(format!(
                "Indexer returned status {}: {}",
                status, body
            )));
        }

        Ok(Some(response.json().await?))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T> {
        self.get_optional(url)
            .await?
            .ok_or_else(|| EngineError::Unavailable(format!("Not found: {}", url)))
    }
}

/// Connection-level failures mean the source is unreachable
fn map_transport(err: reqwest::Error) -> EngineError {
    if err.is_timeout() {
        EngineError::Timeout(err.to_string())
    } else if err.is_connect() {
        EngineError::Unavailable(err.to_string())
    } else {
        EngineError::HttpRequest(err)
    }
}

#[async_trait]
impl PositionEventSource for IndexerRestClient {
    #[instrument(skip(self))]
    async fn latest_block(&self) -> Result<u64> {
        let url = self.endpoint(&["blocks", "latest"])?;
        let block: LatestBlockResponse = self.get_json(&url).await?;
        Ok(block.number)
    }

    #[instrument(skip(self))]
    async fn position_events(
        &self,
        season_id: SeasonId,
        curve_address: &str,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<PositionUpdateEvent>> {
        let season = season_id.to_string();
        let curve = normalize_address(curve_address);
        let mut url = self.endpoint(&["seasons", &season, "curves", &curve, "position-events"])?;
        url.query_pairs_mut()
            .append_pair("fromBlock", &from_block.to_string())
            .append_pair("toBlock", &to_block.to_string());
        let response: PositionEventsResponse = self.get_json(&url).await?;
        Ok(response.events)
    }
}

#[async_trait]
impl CurveStateSource for IndexerRestClient {
    #[instrument(skip(self))]
    async fn curve_state(&self, curve_address: &str) -> Result<CurveState> {
        let curve = normalize_address(curve_address);
        let url = self.endpoint(&["curves", &curve, "state"])?;
        let response: CurveStateResponse = self.get_json(&url).await?;
        CurveState::try_from(response)
    }
}

#[async_trait]
impl OraclePriceSource for IndexerRestClient {
    #[instrument(skip(self))]
    async fn oracle_price(&self, market_id: &str) -> Result<Option<OraclePrice>> {
        let url = self.endpoint(&["oracle", "markets", market_id])?;
        match self.get_optional::<OraclePriceResponse>(&url).await? {
            Some(response) => response.into_price(),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl MarketRegistry for IndexerRestClient {
    #[instrument(skip(self))]
    async fn active_markets(&self, season_id: SeasonId) -> Result<Vec<MarketInfo>> {
        let season = season_id.to_string();
        let url = self.endpoint(&["seasons", &season, "markets"])?;
        let response: MarketsResponse = self.get_json(&url).await?;
        Ok(response
            .markets
            .into_iter()
            .map(|m| m.into_market(season_id))
            .filter(|m| m.active)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = IndexerRestClient::new("https://indexer.example.org");
        assert!(client.is_ok());
    }

    #[test]
    fn test_url_normalization() {
        let client = IndexerRestClient::new("https://indexer.example.org/").unwrap();
        assert!(!client.base_url().ends_with('/'));
        assert!(IndexerRestClient::new("not a url").is_err());
    }

    #[test]
    fn test_path_segments_are_encoded() {
        let client = IndexerRestClient::new("https://indexer.example.org/api/").unwrap();
        let url = client.endpoint(&["oracle", "markets", "s1/alice?x=1#top"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://indexer.example.org/api/oracle/markets/s1%2Falice%3Fx=1%23top"
        );
    }
}
