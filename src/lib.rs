//! Raffle Arbitrage Engine
//!
//! Prices raffle tickets on a stepped bonding curve, tracks each holder's win
//! probability from the on-chain position log, reads a hybrid oracle price
//! per prediction market and reports gaps between the two venues.

pub mod arbitrage;
pub mod common;
pub mod config;
pub mod curve;
pub mod flows;
pub mod indexer;
pub mod ledger;
pub mod oracle;
pub mod relayer;

// Re-export commonly used types
pub use arbitrage::{
    ArbitrageDetector, ArbitrageOpportunity, DetectionOptions, DetectionReport, Direction,
};
pub use common::errors::{EngineError, Result};
pub use common::types::{MarketInfo, OraclePrice, PositionUpdateEvent, SeasonId, TradeSide};
pub use config::types::AppConfig;
pub use curve::{apply_slippage, BondStep, BondingCurve, CurveState, TradeQuote};
pub use flows::{FlowExecutor, FlowStage, TradeFlow};
pub use indexer::{IndexerRestClient, PositionFeedClient};
pub use ledger::{get_holders, HolderPosition, HolderTracker, LedgerSnapshot};
pub use oracle::{HybridOracleReader, OracleReading};
pub use relayer::RelayerClient;
