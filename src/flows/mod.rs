//! Persisted approve-then-trade flows

mod executor;
mod store;
mod types;

pub use executor::{limit_for_quote, ExecutorConfig, FlowExecutor};
pub use store::{FlowStore, InMemoryFlowStore, JsonDirFlowStore};
pub use types::{FlowStage, FlowStep, TradeFlow};
