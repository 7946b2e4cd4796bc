//! Raffle versus prediction-market arbitrage detection

mod detector;
mod types;

pub use detector::{evaluate, ArbitrageDetector, PriceGap};
pub use types::{
    ArbitrageOpportunity, DetectionOptions, DetectionReport, DetectorSettings, Direction,
    MarketFailure, MAX_NOTIONAL_UNITS, MAX_PROFITABILITY_BPS,
};
