use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::common::errors::{EngineError, Result};
use crate::common::types::SeasonId;
use crate::config::types::DetectorConfig;

/// Upper bound accepted for the profitability threshold (10000%)
pub const MAX_PROFITABILITY_BPS: u32 = 1_000_000;

/// Upper bound for the notional used in profit estimates
pub const MAX_NOTIONAL_UNITS: u64 = 1_000_000_000_000;

/// Which venue to buy on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Raffle tickets are cheaper than the market-implied price
    BuyRaffle,
    /// Market exposure is cheaper than raffle tickets
    BuyMarket,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::BuyRaffle => write!(f, "buy_raffle"),
            Direction::BuyMarket => write!(f, "buy_market"),
        }
    }
}

/// A threshold-exceeding gap between raffle and market prices for one player
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArbitrageOpportunity {
    pub market_id: String,
    pub player: String,
    pub season_id: SeasonId,
    /// Curve marginal ticket price, in whole settlement units
    pub raffle_price: Decimal,
    /// Hybrid oracle price scaled into the same unit
    pub market_price: Decimal,
    pub price_difference: Decimal,
    pub direction: Direction,
    /// Percentage gap relative to the more expensive leg
    pub profitability: Decimal,
    /// `price_difference` times the notional unit size
    pub estimated_profit: Decimal,
    /// Player's current raffle win probability, when the ledger has it
    #[serde(default)]
    pub win_probability_bps: Option<u32>,
    pub last_updated: DateTime<Utc>,
}

/// Caller-supplied filters for one detection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectionOptions {
    pub min_profitability_bps: u32,
    pub max_results: usize,
}

impl DetectionOptions {
    pub fn validate(&self) -> Result<()> {
        if self.max_results == 0 {
            return Err(EngineError::Validation("max_results must be positive".to_string()));
        }
        if self.min_profitability_bps > MAX_PROFITABILITY_BPS {
            return Err(EngineError::Validation(format!(
                "min_profitability_bps {} exceeds {}",
                self.min_profitability_bps, MAX_PROFITABILITY_BPS
            )));
        }
        Ok(())
    }
}

impl From<&DetectorConfig> for DetectionOptions {
    fn from(config: &DetectorConfig) -> Self {
        Self {
            min_profitability_bps: config.min_profitability_bps,
            max_results: config.max_results,
        }
    }
}

/// Detector-wide settings
#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub notional_units: u64,
    /// Settlement value of one winning market share, in curve currency
    pub market_unit_scale: Decimal,
    pub fetch_timeout: Duration,
}

impl DetectorSettings {
    pub fn validate(&self) -> Result<()> {
        if self.notional_units == 0 || self.notional_units > MAX_NOTIONAL_UNITS {
            return Err(EngineError::Validation(format!(
                "notional_units must be in 1..={}",
                MAX_NOTIONAL_UNITS
            )));
        }
        if self.market_unit_scale <= Decimal::ZERO {
            return Err(EngineError::Validation(
                "market_unit_scale must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl From<&DetectorConfig> for DetectorSettings {
    fn from(config: &DetectorConfig) -> Self {
        Self {
            notional_units: config.notional_units,
            market_unit_scale: config.market_unit_scale,
            fetch_timeout: Duration::from_millis(config.fetch_timeout_ms),
        }
    }
}

/// A market left out of a cycle, with the reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketFailure {
    pub market_id: String,
    pub reason: String,
}

/// Result of one detection cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionReport {
    pub season_id: SeasonId,
    pub curve_address: String,
    pub opportunities: Vec<ArbitrageOpportunity>,
    /// False when any input was unavailable or stale this cycle
    pub live: bool,
    pub markets_scanned: usize,
    pub failed_markets: Vec<MarketFailure>,
    /// Set when this report was returned from a previous cycle because
    /// another cycle was still in flight
    pub reused: bool,
    pub generated_at: DateTime<Utc>,
}

impl DetectionReport {
    pub(crate) fn empty(season_id: SeasonId, curve_address: &str, live: bool) -> Self {
        Self {
            season_id,
            curve_address: curve_address.to_string(),
            opportunities: Vec::new(),
            live,
            markets_scanned: 0,
            failed_markets: Vec::new(),
            reused: false,
            generated_at: Utc::now(),
        }
    }
}
