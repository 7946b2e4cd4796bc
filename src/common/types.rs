//! Unified types shared by the ledger, oracle reader, detector and source adapters

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::errors::{EngineError, Result};

/// Basis-point denominator (100.00%)
pub const BPS_DENOMINATOR: u32 = 10_000;

/// Decimals of the curve's settlement token
pub const SETTLEMENT_DECIMALS: u32 = 18;

/// Raffle season identifier
pub type SeasonId = u64;

/// Normalize an account or contract address for comparisons and map keys
pub fn normalize_address(address: &str) -> String {
    address.trim().to_lowercase()
}

/// `0x` followed by 20 hex-encoded bytes
pub fn is_valid_address(address: &str) -> bool {
    match address.trim().strip_prefix("0x") {
        Some(body) => body.len() == 40 && hex::decode(body).is_ok(),
        None => false,
    }
}

/// Convert an amount in the smallest settlement unit into whole units
///
/// Fails with `Validation` if the amount does not fit a 96-bit decimal mantissa.
pub fn to_display_units(amount: u128) -> Result<Decimal> {
    let signed = i128::try_from(amount)
        .map_err(|_| EngineError::Validation(format!("amount {} out of range", amount)))?;
    Decimal::try_from_i128_with_scale(signed, SETTLEMENT_DECIMALS)
        .map_err(|e| EngineError::Validation(format!("amount {} out of range: {}", amount, e)))
}

/// Convert basis points into a decimal fraction (10000 bps = 1.0)
pub fn bps_to_fraction(bps: u32) -> Decimal {
    Decimal::from(bps) / Decimal::from(BPS_DENOMINATOR)
}

/// Direction of a curve trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl std::fmt::Display for TradeSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeSide::Buy => write!(f, "buy"),
            TradeSide::Sell => write!(f, "sell"),
        }
    }
}

/// Append-only record of one participant's ticket balance change
///
/// `new_tickets` is the absolute balance after the event, not a delta.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionUpdateEvent {
    pub season_id: SeasonId,
    pub player: String,
    pub old_tickets: u64,
    pub new_tickets: u64,
    /// Curve-wide ticket total when the event was emitted; stale once others trade
    #[serde(rename = "totalTickets")]
    pub total_tickets_at_event_time: u64,
    pub block_number: u64,
    pub log_index: u32,
}

impl PositionUpdateEvent {
    /// Causal ordering key
    pub fn ordering_key(&self) -> (u64, u32) {
        (self.block_number, self.log_index)
    }
}

/// Externally computed blended probability for one market
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OraclePrice {
    pub market_id: String,
    pub raffle_probability_bps: u32,
    pub market_sentiment_bps: u32,
    pub hybrid_price_bps: u32,
    pub last_update: DateTime<Utc>,
}

impl OraclePrice {
    /// Reject readings with a component outside [0, 10000] bps
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("raffleProbabilityBps", self.raffle_probability_bps),
            ("marketSentimentBps", self.market_sentiment_bps),
            ("hybridPriceBps", self.hybrid_price_bps),
        ] {
            if value > BPS_DENOMINATOR {
                return Err(EngineError::Validation(format!(
                    "{} = {} for market {} exceeds {}",
                    name, value, self.market_id, BPS_DENOMINATOR
                )));
            }
        }
        Ok(())
    }
}

/// Prediction market registered for a season
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketInfo {
    pub market_id: String,
    pub season_id: SeasonId,
    /// Player whose win this market prices
    pub player: String,
    #[serde(default)]
    pub market_type: Option<String>,
    #[serde(default)]
    pub contract: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

/// Mined transaction outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxReceipt {
    pub tx_hash: String,
    pub success: bool,
    #[serde(default)]
    pub block_number: Option<u64>,
}

/// Connection status for the live position feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    Disconnected(Option<String>),
    Reconnecting { attempt: u32 },
    Error(String),
}

/// Events forwarded by the live position feed
#[derive(Debug, Clone)]
pub enum FeedEvent {
    /// A streamed position update
    Position(PositionUpdateEvent),
    /// Connection status change
    ConnectionStatus(ConnectionStatus),
    /// Server heartbeat
    Heartbeat,
}
