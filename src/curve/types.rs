use serde::{Deserialize, Serialize};

use crate::common::types::TradeSide;

/// One step of the bonding curve's price schedule
///
/// Prices units `(previous.range_to, range_to]` at `price` (smallest settlement unit).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BondStep {
    pub step_index: u32,
    pub range_to: u64,
    pub price: u128,
}

impl BondStep {
    pub fn new(step_index: u32, range_to: u64, price: u128) -> Self {
        Self {
            step_index,
            range_to,
            price,
        }
    }
}

/// Snapshot of one season's curve contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurveState {
    /// Tickets issued so far
    pub supply: u64,
    /// Settlement tokens held by the curve
    pub reserves: u128,
    pub current_step: u32,
    pub steps: Vec<BondStep>,
    pub accumulated_fees: u128,
    pub buy_fee_bps: u32,
    pub sell_fee_bps: u32,
}

/// Cost or proceeds of a curve trade, split into base amount and fee
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeQuote {
    pub side: TradeSide,
    pub tickets: u64,
    /// Step-integrated amount before fees
    pub base: u128,
    pub fee: u128,
    /// Amount paid (buy: base + fee) or received (sell: base - fee)
    pub total: u128,
}

impl TradeQuote {
    pub fn zero(side: TradeSide) -> Self {
        Self {
            side,
            tickets: 0,
            base: 0,
            fee: 0,
            total: 0,
        }
    }
}
