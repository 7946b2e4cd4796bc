//! Step-function bonding curve pricing
//!
//! All amounts are integers in the smallest settlement unit. A purchase that
//! crosses step boundaries is priced step by step, so buying 1500 tickets from
//! supply 0 on `[{1000, 1e18}, {2000, 2e18}]` costs `1000 * 1e18 + 500 * 2e18`.

use tracing::debug;

use super::types::{BondStep, CurveState, TradeQuote};
use crate::common::errors::{EngineError, Result};
use crate::common::types::{TradeSide, BPS_DENOMINATOR};

/// Validated step schedule plus the curve's fee configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BondingCurve {
    steps: Vec<BondStep>,
    buy_fee_bps: u32,
    sell_fee_bps: u32,
}

impl BondingCurve {
    /// Build a curve from its step schedule
    ///
    /// The schedule must be non-empty, strictly ascending in `range_to` and
    /// non-decreasing in price.
    pub fn new(steps: Vec<BondStep>, buy_fee_bps: u32, sell_fee_bps: u32) -> Result<Self> {
        if steps.is_empty() {
            return Err(EngineError::Validation("curve has no steps".to_string()));
        }
        if buy_fee_bps > BPS_DENOMINATOR || sell_fee_bps > BPS_DENOMINATOR {
            return Err(EngineError::Validation(format!(
                "fees must be at most {} bps (buy {}, sell {})",
                BPS_DENOMINATOR, buy_fee_bps, sell_fee_bps
            )));
        }
        if steps[0].range_to == 0 {
            return Err(EngineError::Validation("first step has an empty range".to_string()));
        }
        for pair in steps.windows(2) {
            if pair[1].range_to <= pair[0].range_to {
                return Err(EngineError::Validation(format!(
                    "step {} range {} is not above previous range {}",
                    pair[1].step_index, pair[1].range_to, pair[0].range_to
                )));
            }
            if pair[1].price < pair[0].price {
                return Err(EngineError::Validation(format!(
                    "step {} price decreases",
                    pair[1].step_index
                )));
            }
        }

        Ok(Self {
            steps,
            buy_fee_bps,
            sell_fee_bps,
        })
    }

    /// Build a curve from a fetched state snapshot
    pub fn from_state(state: &CurveState) -> Result<Self> {
        Self::new(state.steps.clone(), state.buy_fee_bps, state.sell_fee_bps)
    }

    pub fn steps(&self) -> &[BondStep] {
        &self.steps
    }

    pub fn buy_fee_bps(&self) -> u32 {
        self.buy_fee_bps
    }

    pub fn sell_fee_bps(&self) -> u32 {
        self.sell_fee_bps
    }

    /// Total tickets the curve can ever issue
    pub fn max_supply(&self) -> u64 {
        self.steps.last().map(|s| s.range_to).unwrap_or(0)
    }

    /// Tickets still purchasable at the given supply
    pub fn remaining_capacity(&self, supply: u64) -> u64 {
        self.max_supply().saturating_sub(supply)
    }

    /// The step with the smallest `range_to >= supply`
    pub fn get_current_step(&self, supply: u64) -> Result<&BondStep> {
        let idx = self.steps.partition_point(|s| s.range_to < supply);
        self.steps.get(idx).ok_or(EngineError::RangeExceeded {
            supply,
            max_supply: self.max_supply(),
        })
    }

    /// Price of the next ticket issued at `supply`
    pub fn marginal_price(&self, supply: u64) -> Result<u128> {
        let next = supply.checked_add(1).ok_or(EngineError::RangeExceeded {
            supply,
            max_supply: self.max_supply(),
        })?;
        Ok(self.get_current_step(next)?.price)
    }

    /// Step-integrated cost of buying `amount` tickets at `supply`, before fees
    pub fn estimate_buy_cost(&self, supply: u64, amount: u64) -> Result<u128> {
        if amount == 0 {
            return Ok(0);
        }
        self.check_supply(supply)?;
        let available = self.remaining_capacity(supply);
        if amount > available {
            return Err(EngineError::CapacityExceeded {
                requested: amount,
                available,
            });
        }

        let mut cursor = supply;
        let mut remaining = amount;
        let mut cost: u128 = 0;
        let start = self.steps.partition_point(|s| s.range_to <= cursor);

        for step in &self.steps[start..] {
            if remaining == 0 {
                break;
            }
            let take = remaining.min(step.range_to - cursor);
            cost = checked_add(cost, step_cost(take, step.price)?)?;
            cursor += take;
            remaining -= take;
        }

        debug!(supply, amount, cost, "estimated buy cost");
        Ok(cost)
    }

    /// Proceeds of selling `amount` tickets back at `supply`, net of the sell fee
    pub fn estimate_sell_proceeds(&self, supply: u64, amount: u64) -> Result<u128> {
        let gross = self.estimate_sell_gross(supply, amount)?;
        Ok(gross - fee_of(gross, self.sell_fee_bps)?)
    }

    /// Buy quote including the buy fee
    pub fn quote_buy(&self, supply: u64, amount: u64) -> Result<TradeQuote> {
        if amount == 0 {
            return Ok(TradeQuote::zero(TradeSide::Buy));
        }
        let base = self.estimate_buy_cost(supply, amount)?;
        let fee = fee_of(base, self.buy_fee_bps)?;
        Ok(TradeQuote {
            side: TradeSide::Buy,
            tickets: amount,
            base,
            fee,
            total: checked_add(base, fee)?,
        })
    }

    /// Sell quote with the sell fee taken from proceeds
    pub fn quote_sell(&self, supply: u64, amount: u64) -> Result<TradeQuote> {
        if amount == 0 {
            return Ok(TradeQuote::zero(TradeSide::Sell));
        }
        let base = self.estimate_sell_gross(supply, amount)?;
        let fee = fee_of(base, self.sell_fee_bps)?;
        Ok(TradeQuote {
            side: TradeSide::Sell,
            tickets: amount,
            base,
            fee,
            total: base - fee,
        })
    }

    fn estimate_sell_gross(&self, supply: u64, amount: u64) -> Result<u128> {
        if amount == 0 {
            return Ok(0);
        }
        self.check_supply(supply)?;
        if amount > supply {
            return Err(EngineError::CapacityExceeded {
                requested: amount,
                available: supply,
            });
        }

        let mut cursor = supply;
        let mut remaining = amount;
        let mut proceeds: u128 = 0;
        // Step holding unit `supply`, the first one redeemed.
        let top = self.steps.partition_point(|s| s.range_to < cursor);

        for idx in (0..=top).rev() {
            if remaining == 0 {
                break;
            }
            let lower = if idx == 0 { 0 } else { self.steps[idx - 1].range_to };
            let take = remaining.min(cursor - lower);
            proceeds = checked_add(proceeds, step_cost(take, self.steps[idx].price)?)?;
            cursor -= take;
            remaining -= take;
        }

        debug!(supply, amount, proceeds, "estimated gross sell proceeds");
        Ok(proceeds)
    }

    fn check_supply(&self, supply: u64) -> Result<()> {
        let max_supply = self.max_supply();
        if supply > max_supply {
            return Err(EngineError::RangeExceeded { supply, max_supply });
        }
        Ok(())
    }
}

/// Widen (buy) or narrow (sell) an estimate by a slippage tolerance
///
/// Buy bounds round up, sell bounds round down; a tolerance above 100%
/// floors the sell bound at zero.
pub fn apply_slippage(estimate: u128, tolerance_bps: u32, side: TradeSide) -> Result<u128> {
    let denominator = u128::from(BPS_DENOMINATOR);
    match side {
        TradeSide::Buy => {
            let factor = denominator + u128::from(tolerance_bps);
            let scaled = estimate.checked_mul(factor).ok_or_else(overflow)?;
            Ok(scaled.div_ceil(denominator))
        }
        TradeSide::Sell => {
            let factor = denominator.saturating_sub(u128::from(tolerance_bps));
            let scaled = estimate.checked_mul(factor).ok_or_else(overflow)?;
            Ok(scaled / denominator)
        }
    }
}

fn step_cost(units: u64, price: u128) -> Result<u128> {
    u128::from(units).checked_mul(price).ok_or_else(overflow)
}

fn checked_add(a: u128, b: u128) -> Result<u128> {
    a.checked_add(b).ok_or_else(overflow)
}

fn fee_of(amount: u128, fee_bps: u32) -> Result<u128> {
    let scaled = amount
        .checked_mul(u128::from(fee_bps))
        .ok_or_else(overflow)?;
    Ok(scaled / u128::from(BPS_DENOMINATOR))
}

fn overflow() -> EngineError {
    EngineError::Validation("amount overflows 128-bit arithmetic".to_string())
}
