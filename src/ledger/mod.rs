//! Position ledger and win-probability tracker
//!
//! Reconstructs per-player ticket balances from the append-only
//! position-update log and derives each holder's share of the pool.

mod book;
mod tracker;

pub use book::{fold_events, win_probability_bps, HolderBook, HolderPosition};
pub use tracker::{get_holders, HolderTracker, LedgerSnapshot, TrackerConfig};
