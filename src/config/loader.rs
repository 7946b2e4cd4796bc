//! Configuration loader

use config::{Config, Environment, File};
use std::path::Path;

use super::types::AppConfig;
use crate::common::errors::{EngineError, Result};
use crate::common::types::is_valid_address;

/// Load configuration from file and environment variables
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed with APP__, e.g. `APP__SEASON__SEASON_ID`)
/// 2. Configuration file (TOML format)
/// 3. Default values
pub fn load_config(config_path: Option<&str>) -> Result<AppConfig> {
    dotenvy::dotenv().ok();

    let mut builder = Config::builder();

    if let Some(path) = config_path {
        if Path::new(path).exists() {
            builder = builder.add_source(File::with_name(path).required(false));
        }
    }

    builder = builder.add_source(
        Environment::with_prefix("APP")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder
        .build()
        .map_err(|e| EngineError::Configuration(e.to_string()))?;

    let app: AppConfig = config
        .try_deserialize()
        .map_err(|e| EngineError::Configuration(e.to_string()))?;

    validate(&app)?;
    Ok(app)
}

/// Reject settings no component can run with
pub fn validate(config: &AppConfig) -> Result<()> {
    if config.season.max_block_range == 0 {
        return Err(EngineError::Configuration(
            "season.max_block_range must be positive".to_string(),
        ));
    }
    if config.detector.max_results == 0 {
        return Err(EngineError::Configuration(
            "detector.max_results must be positive".to_string(),
        ));
    }
    if config.oracle.raffle_weight_bps + config.oracle.market_weight_bps
        != crate::common::types::BPS_DENOMINATOR
    {
        return Err(EngineError::Configuration(format!(
            "oracle weights must sum to 10000 bps (got {} + {})",
            config.oracle.raffle_weight_bps, config.oracle.market_weight_bps
        )));
    }
    for (name, secs) in [
        ("polling.oracle_interval_seconds", config.polling.oracle_interval_seconds),
        ("polling.curve_interval_seconds", config.polling.curve_interval_seconds),
        ("polling.holders_interval_seconds", config.polling.holders_interval_seconds),
    ] {
        if secs == 0 {
            return Err(EngineError::Configuration(format!("{} must be positive", name)));
        }
    }

    check_url("indexer.rest_url", &config.indexer.rest_url, &["http", "https"])?;
    if config.indexer.enable_feed {
        check_url("indexer.websocket_url", &config.indexer.websocket_url, &["ws", "wss"])?;
    }
    if !config.season.curve_address.is_empty() {
        check_address("season.curve_address", &config.season.curve_address)?;
    }
    if let Some(relayer) = &config.relayer {
        check_url("relayer.url", &relayer.url, &["http", "https"])?;
        check_address("relayer.account", &relayer.account)?;
        check_address("relayer.settlement_token", &relayer.settlement_token)?;
    }
    Ok(())
}

fn check_url(name: &str, value: &str, schemes: &[&str]) -> Result<()> {
    let parsed = url::Url::parse(value)
        .map_err(|e| EngineError::Configuration(format!("{} {:?}: {}", name, value, e)))?;
    if !schemes.contains(&parsed.scheme()) {
        return Err(EngineError::Configuration(format!(
            "{} must use one of {:?}, got {}",
            name,
            schemes,
            parsed.scheme()
        )));
    }
    Ok(())
}

fn check_address(name: &str, value: &str) -> Result<()> {
    if is_valid_address(value) {
        Ok(())
    } else {
        Err(EngineError::Configuration(format!(
            "{} is not a 20-byte hex address: {}",
            name, value
        )))
    }
}
