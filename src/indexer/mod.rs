//! Chain indexer adapters
//!
//! REST for position events, curve state, oracle prices and the market
//! registry; WebSocket for the live position-update feed.

pub mod feed;
pub mod messages;
pub mod rest;

pub use feed::PositionFeedClient;
pub use rest::IndexerRestClient;
