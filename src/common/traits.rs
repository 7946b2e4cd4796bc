//! Trait definitions for the remote sources the engine consumes
//!
//! The indexer adapters implement the four read traits and the relayer
//! implements `ChainGateway`; tests substitute in-memory fakes or `mockall` mocks.

use async_trait::async_trait;

use super::errors::Result;
use super::types::{MarketInfo, OraclePrice, PositionUpdateEvent, SeasonId, TxReceipt};
use crate::curve::CurveState;

/// Ordered position-update event source, keyed by season + curve address
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PositionEventSource: Send + Sync {
    /// Latest block height known to the source
    async fn latest_block(&self) -> Result<u64>;

    /// Events in `[from_block, to_block]`, ordered by `(block_number, log_index)`
    async fn position_events(
        &self,
        season_id: SeasonId,
        curve_address: &str,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<PositionUpdateEvent>>;
}

/// Curve state source (supply, step schedule, fees) per curve address
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CurveStateSource: Send + Sync {
    async fn curve_state(&self, curve_address: &str) -> Result<CurveState>;
}

/// Oracle price source per market id
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OraclePriceSource: Send + Sync {
    /// Returns `Ok(None)` when no price has been recorded for the market yet
    async fn oracle_price(&self, market_id: &str) -> Result<Option<OraclePrice>>;
}

/// Registry of prediction markets per season
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketRegistry: Send + Sync {
    /// Active markets for the season, with player identity
    async fn active_markets(&self, season_id: SeasonId) -> Result<Vec<MarketInfo>>;
}

/// Write access to the chain for trade flows
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainGateway: Send + Sync {
    /// Settlement-token allowance `owner` has granted `spender`
    async fn allowance(&self, owner: &str, spender: &str) -> Result<u128>;

    /// Submit an approval, returning the transaction hash
    async fn approve(&self, spender: &str, amount: u128) -> Result<String>;

    /// Submit a ticket purchase bounded by `max_cost`
    async fn buy_tickets(&self, curve_address: &str, tickets: u64, max_cost: u128)
        -> Result<String>;

    /// Submit a ticket sale bounded below by `min_proceeds`
    async fn sell_tickets(
        &self,
        curve_address: &str,
        tickets: u64,
        min_proceeds: u128,
    ) -> Result<String>;

    /// Receipt for a transaction, `None` while it is not yet mined
    async fn receipt(&self, tx_hash: &str) -> Result<Option<TxReceipt>>;
}
