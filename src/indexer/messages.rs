//! Indexer wire types
//!
//! Amounts in the smallest settlement unit travel as decimal strings since
//! they do not fit a JSON number.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::common::errors::{EngineError, Result};
use crate::common::types::{MarketInfo, OraclePrice, PositionUpdateEvent, SeasonId};
use crate::curve::{BondStep, CurveState};

/// `GET /blocks/latest`
#[derive(Debug, Clone, Deserialize)]
pub struct LatestBlockResponse {
    pub number: u64,
}

/// `GET /seasons/{season}/curves/{curve}/position-events`
#[derive(Debug, Clone, Deserialize)]
pub struct PositionEventsResponse {
    #[serde(default)]
    pub events: Vec<PositionUpdateEvent>,
}

/// One step of the curve schedule as served by the indexer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResponse {
    pub step_index: u32,
    pub range_to: u64,
    pub price: String,
}

/// `GET /curves/{curve}/state`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurveStateResponse {
    pub supply: u64,
    pub reserves: String,
    pub current_step: u32,
    #[serde(default)]
    pub accumulated_fees: Option<String>,
    pub buy_fee_bps: u32,
    pub sell_fee_bps: u32,
    pub steps: Vec<StepResponse>,
}

impl TryFrom<CurveStateResponse> for CurveState {
    type Error = EngineError;

    fn try_from(response: CurveStateResponse) -> Result<Self> {
        let steps = response
            .steps
            .into_iter()
            .map(|s| {
                Ok(BondStep::new(
                    s.step_index,
                    s.range_to,
                    parse_amount("step price", &s.price)?,
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(CurveState {
            supply: response.supply,
            reserves: parse_amount("reserves", &response.reserves)?,
            current_step: response.current_step,
            steps,
            accumulated_fees: match response.accumulated_fees {
                Some(fees) => parse_amount("accumulatedFees", &fees)?,
                None => 0,
            },
            buy_fee_bps: response.buy_fee_bps,
            sell_fee_bps: response.sell_fee_bps,
        })
    }
}

/// `GET /oracle/markets/{marketId}`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OraclePriceResponse {
    pub market_id: String,
    pub raffle_probability_bps: u32,
    pub market_sentiment_bps: u32,
    pub hybrid_price_bps: u32,
    /// Unix seconds; zero when no price was ever recorded
    pub last_update: i64,
}

impl OraclePriceResponse {
    /// `None` when the oracle has never recorded a price for the market
    pub fn into_price(self) -> Result<Option<OraclePrice>> {
        if self.last_update <= 0 {
            return Ok(None);
        }
        let last_update = DateTime::<Utc>::from_timestamp(self.last_update, 0).ok_or_else(|| {
            EngineError::InvalidResponse(format!("Invalid lastUpdate: {}", self.last_update))
        })?;
        Ok(Some(OraclePrice {
            market_id: self.market_id,
            raffle_probability_bps: self.raffle_probability_bps,
            market_sentiment_bps: self.market_sentiment_bps,
            hybrid_price_bps: self.hybrid_price_bps,
            last_update,
        }))
    }
}

/// Market entry from `GET /seasons/{season}/markets`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketEntry {
    pub market_id: String,
    pub player: String,
    #[serde(default)]
    pub market_type: Option<String>,
    #[serde(default)]
    pub contract: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl MarketEntry {
    pub fn into_market(self, season_id: SeasonId) -> MarketInfo {
        MarketInfo {
            market_id: self.market_id,
            season_id,
            player: self.player,
            market_type: self.market_type,
            contract: self.contract,
            active: self.active,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketsResponse {
    #[serde(default)]
    pub markets: Vec<MarketEntry>,
}

/// Subscribe message for the position feed
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedSubscribeMessage {
    #[serde(rename = "type")]
    pub message_type: &'static str,
    pub season_id: SeasonId,
    pub curve: String,
}

impl FeedSubscribeMessage {
    pub fn new(season_id: SeasonId, curve: &str) -> Self {
        Self {
            message_type: "subscribe",
            season_id,
            curve: curve.to_string(),
        }
    }
}

/// Parse a base-10 amount string
pub fn parse_amount(field: &str, value: &str) -> Result<u128> {
    value
        .trim()
        .parse::<u128>()
        .map_err(|e| EngineError::InvalidResponse(format!("Invalid {} {:?}: {}", field, value, e)))
}
