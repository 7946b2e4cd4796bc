//! Configuration types

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Indexer endpoints for events, curve state, oracle and markets
    #[serde(default)]
    pub indexer: IndexerConfig,
    /// Transaction relayer (required only for buy/sell flows)
    #[serde(default)]
    pub relayer: Option<RelayerConfig>,
    /// Season and curve being tracked
    #[serde(default)]
    pub season: SeasonConfig,
    /// Polling cadences
    #[serde(default)]
    pub polling: PollingConfig,
    /// Hybrid oracle reader settings
    #[serde(default)]
    pub oracle: OracleConfig,
    /// Arbitrage detector settings
    #[serde(default)]
    pub detector: DetectorConfig,
    /// Trade flow persistence and confirmation settings
    #[serde(default)]
    pub flows: FlowConfig,
    /// General application settings
    #[serde(default)]
    pub settings: AppSettings,
}

/// Indexer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// Base URL for the REST API
    #[serde(default = "default_indexer_rest_url")]
    pub rest_url: String,
    /// WebSocket URL for the live position feed
    #[serde(default = "default_indexer_ws_url")]
    pub websocket_url: String,
    /// Subscribe to the live position feed in addition to polling
    #[serde(default = "default_true")]
    pub enable_feed: bool,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            rest_url: default_indexer_rest_url(),
            websocket_url: default_indexer_ws_url(),
            enable_feed: true,
        }
    }
}

fn default_indexer_rest_url() -> String {
    "http://localhost:8080/api".to_string()
}

fn default_indexer_ws_url() -> String {
    "ws://localhost:8080".to_string()
}

fn default_true() -> bool {
    true
}

/// Relayer configuration for submitting approve/buy/sell transactions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayerConfig {
    /// Base URL for the relayer API
    pub url: String,
    /// API key for authenticated requests
    pub api_key: String,
    /// API secret for signing requests (base64)
    pub api_secret: String,
    /// API passphrase
    pub api_passphrase: String,
    /// Account the relayer trades for
    pub account: String,
    /// Settlement token the curve spends
    pub settlement_token: String,
}

/// Season being tracked
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeasonConfig {
    /// Season identifier
    #[serde(default = "default_season_id")]
    pub season_id: u64,
    /// Bonding curve contract address
    #[serde(default)]
    pub curve_address: String,
    /// Block the season started at, if known
    #[serde(default)]
    pub start_block: Option<u64>,
    /// Lookback used when the start block is unknown
    #[serde(default = "default_lookback_blocks")]
    pub lookback_blocks: u64,
    /// Maximum block span per event query
    #[serde(default = "default_max_block_range")]
    pub max_block_range: u64,
}

impl Default for SeasonConfig {
    fn default() -> Self {
        Self {
            season_id: default_season_id(),
            curve_address: String::new(),
            start_block: None,
            lookback_blocks: default_lookback_blocks(),
            max_block_range: default_max_block_range(),
        }
    }
}

fn default_season_id() -> u64 {
    1
}

fn default_lookback_blocks() -> u64 {
    100_000
}

fn default_max_block_range() -> u64 {
    10_000
}

/// Polling cadences in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_oracle_interval")]
    pub oracle_interval_seconds: u64,
    #[serde(default = "default_curve_interval")]
    pub curve_interval_seconds: u64,
    #[serde(default = "default_holders_interval")]
    pub holders_interval_seconds: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            oracle_interval_seconds: default_oracle_interval(),
            curve_interval_seconds: default_curve_interval(),
            holders_interval_seconds: default_holders_interval(),
        }
    }
}

fn default_oracle_interval() -> u64 {
    10
}

fn default_curve_interval() -> u64 {
    15
}

fn default_holders_interval() -> u64 {
    45
}

/// Hybrid oracle reader settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Prices older than this are returned but flagged non-live
    #[serde(default = "default_staleness_horizon")]
    pub staleness_horizon_seconds: u64,
    /// Reads within this window are served from cache
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_seconds: u64,
    /// Weight of the raffle-implied probability in the blend
    #[serde(default = "default_raffle_weight")]
    pub raffle_weight_bps: u32,
    /// Weight of market sentiment in the blend
    #[serde(default = "default_market_weight")]
    pub market_weight_bps: u32,
    /// Deviation from the local blend tolerated before warning
    #[serde(default = "default_blend_tolerance")]
    pub blend_tolerance_bps: u32,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            staleness_horizon_seconds: default_staleness_horizon(),
            cache_ttl_seconds: default_cache_ttl(),
            raffle_weight_bps: default_raffle_weight(),
            market_weight_bps: default_market_weight(),
            blend_tolerance_bps: default_blend_tolerance(),
        }
    }
}

fn default_staleness_horizon() -> u64 {
    300
}

fn default_cache_ttl() -> u64 {
    10
}

fn default_raffle_weight() -> u32 {
    7000
}

fn default_market_weight() -> u32 {
    3000
}

fn default_blend_tolerance() -> u32 {
    50
}

/// Arbitrage detector settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Opportunities must exceed this profitability
    #[serde(default = "default_min_profitability")]
    pub min_profitability_bps: u32,
    /// Maximum opportunities returned per cycle
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    /// Notional size used for the estimated profit, in whole units
    #[serde(default = "default_notional_units")]
    pub notional_units: u64,
    /// Settlement value of one winning market share, in curve currency
    #[serde(default = "default_market_unit_scale")]
    pub market_unit_scale: Decimal,
    /// Per-market fetch timeout in milliseconds
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_ms: u64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            min_profitability_bps: default_min_profitability(),
            max_results: default_max_results(),
            notional_units: default_notional_units(),
            market_unit_scale: default_market_unit_scale(),
            fetch_timeout_ms: default_fetch_timeout(),
        }
    }
}

fn default_min_profitability() -> u32 {
    200
}

fn default_max_results() -> usize {
    10
}

fn default_notional_units() -> u64 {
    100
}

fn default_market_unit_scale() -> Decimal {
    Decimal::ONE
}

fn default_fetch_timeout() -> u64 {
    5000
}

/// Trade flow settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowConfig {
    /// Directory holding one JSON file per flow
    #[serde(default = "default_state_dir")]
    pub state_dir: String,
    /// Maximum wait for a transaction receipt, in seconds
    #[serde(default = "default_confirmation_timeout")]
    pub confirmation_timeout_seconds: u64,
    /// Delay between receipt polls, in milliseconds
    #[serde(default = "default_receipt_poll")]
    pub receipt_poll_ms: u64,
    /// Default slippage tolerance for buys and sells
    #[serde(default = "default_slippage")]
    pub slippage_bps: u32,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            confirmation_timeout_seconds: default_confirmation_timeout(),
            receipt_poll_ms: default_receipt_poll(),
            slippage_bps: default_slippage(),
        }
    }
}

fn default_state_dir() -> String {
    ".flows".to_string()
}

fn default_confirmation_timeout() -> u64 {
    120
}

fn default_receipt_poll() -> u64 {
    2000
}

fn default_slippage() -> u32 {
    100
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Delay between feed reconnection attempts in milliseconds
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,
    /// Maximum feed reconnection attempts before falling back to polling only
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            reconnect_delay_ms: default_reconnect_delay(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_reconnect_delay() -> u64 {
    5000
}

fn default_max_reconnect_attempts() -> u32 {
    10
}

fn default_request_timeout() -> u64 {
    30
}

/// API credentials for signed relayer requests
#[derive(Debug, Clone)]
pub struct ApiCredentials {
    pub api_key: String,
    pub api_secret: String,
    pub passphrase: String,
}

impl ApiCredentials {
    pub fn new(api_key: String, api_secret: String, passphrase: String) -> Self {
        Self {
            api_key,
            api_secret,
            passphrase,
        }
    }
}

impl From<&RelayerConfig> for ApiCredentials {
    fn from(config: &RelayerConfig) -> Self {
        Self::new(
            config.api_key.clone(),
            config.api_secret.clone(),
            config.api_passphrase.clone(),
        )
    }
}
