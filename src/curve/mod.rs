//! Bonding curve pricing model
//!
//! Deterministic step-schedule lookup, step-integrated buy/sell estimates
//! and slippage bounds for the raffle's ticket curve.

mod pricing;
mod types;

pub use pricing::{apply_slippage, BondingCurve};
pub use types::{BondStep, CurveState, TradeQuote};
