//! Hybrid price oracle reader

mod reader;

pub use reader::{track_markets, HybridOracleReader, HybridWeights, OracleReading, ReaderConfig};
