//! Hybrid price oracle reader
//!
//! Reads the externally maintained blended probability per market through a
//! short-lived cache. Old prices are still served, flagged non-live, so
//! consumers can degrade instead of failing.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use crate::common::errors::{EngineError, Result};
use crate::common::traits::{MarketRegistry, OraclePriceSource};
use crate::common::types::{OraclePrice, SeasonId, BPS_DENOMINATOR};
use crate::config::types::OracleConfig;

/// Weights of the two probability components in the hybrid price
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HybridWeights {
    pub raffle_weight_bps: u32,
    pub market_weight_bps: u32,
}

impl Default for HybridWeights {
    fn default() -> Self {
        Self {
            raffle_weight_bps: 7000,
            market_weight_bps: 3000,
        }
    }
}

impl HybridWeights {
    /// Weighted blend of raffle-implied probability and market sentiment
    pub fn blend(&self, raffle_probability_bps: u32, market_sentiment_bps: u32) -> u32 {
        let weighted = u64::from(raffle_probability_bps) * u64::from(self.raffle_weight_bps)
            + u64::from(market_sentiment_bps) * u64::from(self.market_weight_bps);
        (weighted / u64::from(BPS_DENOMINATOR)) as u32
    }
}

/// Reader settings
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    pub staleness_horizon: Duration,
    pub cache_ttl: Duration,
    pub weights: HybridWeights,
    pub blend_tolerance_bps: u32,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self::from(&OracleConfig::default())
    }
}

impl From<&OracleConfig> for ReaderConfig {
    fn from(config: &OracleConfig) -> Self {
        Self {
            staleness_horizon: Duration::from_secs(config.staleness_horizon_seconds),
            cache_ttl: Duration::from_secs(config.cache_ttl_seconds),
            weights: HybridWeights {
                raffle_weight_bps: config.raffle_weight_bps,
                market_weight_bps: config.market_weight_bps,
            },
            blend_tolerance_bps: config.blend_tolerance_bps,
        }
    }
}

/// A hybrid price together with its freshness
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OracleReading {
    pub price: OraclePrice,
    /// False when the price is older than the staleness horizon or the
    /// source could not be reached and a cached value was served
    pub live: bool,
    pub fetched_at: DateTime<Utc>,
}

impl OracleReading {
    pub fn hybrid_price_bps(&self) -> u32 {
        self.price.hybrid_price_bps
    }
}

#[derive(Debug, Clone)]
struct CachedPrice {
    price: OraclePrice,
    fetched_at: DateTime<Utc>,
}

/// Cached, read-only view of the hybrid oracle
pub struct HybridOracleReader<S: OraclePriceSource + ?Sized> {
    source: Arc<S>,
    config: ReaderConfig,
    cache: RwLock<HashMap<String, CachedPrice>>,
}

impl<S: OraclePriceSource + ?Sized> HybridOracleReader<S> {
    pub fn new(source: Arc<S>, config: ReaderConfig) -> Self {
        Self {
            source,
            config,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// Read the hybrid price for a market
    ///
    /// Fails `Unavailable` if no price has ever been recorded, or if the source
    /// is unreachable and nothing is cached.
    #[instrument(skip(self))]
    pub async fn read_hybrid_price(&self, market_id: &str) -> Result<OracleReading> {
        let now = Utc::now();
        let cached = self.cache.read().await.get(market_id).cloned();

        if let Some(entry) = &cached {
            if elapsed_since(entry.fetched_at, now) < self.config.cache_ttl {
                debug!("Serving cached oracle price");
                return Ok(self.reading(entry, now, true));
            }
        }

        match self.source.oracle_price(market_id).await {
            Ok(Some(price)) => {
                price.validate()?;
                if price.last_update.timestamp() <= 0 {
                    return Err(EngineError::Unavailable(format!(
                        "no oracle price recorded for market {}",
                        market_id
                    )));
                }
                self.check_blend(&price);
                let entry = CachedPrice {
                    price,
                    fetched_at: now,
                };
                self.cache
                    .write()
                    .await
                    .insert(market_id.to_string(), entry.clone());
                Ok(self.reading(&entry, now, true))
            }
            Ok(None) => Err(EngineError::Unavailable(format!(
                "no oracle price recorded for market {}",
                market_id
            ))),
            Err(e) if e.is_recoverable() => match cached {
                Some(entry) => {
                    warn!("Oracle source failed, serving cached price: {}", e);
                    Ok(self.reading(&entry, now, false))
                }
                None => Err(EngineError::Unavailable(format!(
                    "oracle price for market {}: {}",
                    market_id, e
                ))),
            },
            Err(e) => Err(e),
        }
    }

    /// Drop a market's cached price so the next read goes to the source
    pub async fn invalidate(&self, market_id: &str) {
        self.cache.write().await.remove(market_id);
    }

    /// Refresh every listed market, returning how many succeeded
    pub async fn refresh_all(&self, market_ids: &[String]) -> usize {
        let mut ok = 0;
        for market_id in market_ids {
            self.invalidate(market_id).await;
            match self.read_hybrid_price(market_id).await {
                Ok(_) => ok += 1,
                Err(e) => debug!(market = %market_id, "Oracle refresh skipped: {}", e),
            }
        }
        ok
    }

    /// Keep the cache warm on a fixed cadence until shutdown
    pub async fn run(
        self: Arc<Self>,
        mut markets: watch::Receiver<Vec<String>>,
        every: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_ms = every.as_millis() as u64, "Oracle poller started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let ids = markets.borrow_and_update().clone();
                    let ok = self.refresh_all(&ids).await;
                    debug!(refreshed = ok, total = ids.len(), "Oracle prices refreshed");
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Oracle poller stopping");
                        return;
                    }
                }
            }
        }
    }

    fn reading(&self, entry: &CachedPrice, now: DateTime<Utc>, source_ok: bool) -> OracleReading {
        let age = elapsed_since(entry.price.last_update, now);
        OracleReading {
            price: entry.price.clone(),
            live: source_ok && age <= self.config.staleness_horizon,
            fetched_at: entry.fetched_at,
        }
    }

    fn check_blend(&self, price: &OraclePrice) {
        let local = self
            .config
            .weights
            .blend(price.raffle_probability_bps, price.market_sentiment_bps);
        let deviation = local.abs_diff(price.hybrid_price_bps);
        if deviation > self.config.blend_tolerance_bps {
            warn!(
                market = %price.market_id,
                reported = price.hybrid_price_bps,
                local,
                "Reported hybrid price deviates from local blend"
            );
        }
    }
}

/// Keep the poller's market list in step with the registry.
///
/// Re-reads the season's active markets every `every` and publishes the ids
/// when they change. A failed read keeps the previous list.
pub async fn track_markets<R: MarketRegistry + ?Sized>(
    registry: Arc<R>,
    season_id: SeasonId,
    markets: watch::Sender<Vec<String>>,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match registry.active_markets(season_id).await {
                    Ok(found) => {
                        let ids: Vec<String> = found.into_iter().map(|m| m.market_id).collect();
                        let count = ids.len();
                        let changed = markets.send_if_modified(|current| {
                            if *current == ids {
                                return false;
                            }
                            *current = ids;
                            true
                        });
                        if changed {
                            info!(season_id, markets = count, "Active market list updated");
                        }
                    }
                    Err(e) => warn!(season_id, "Market registry unavailable, keeping previous list: {}", e),
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    debug!("Market list tracker stopping");
                    return;
                }
            }
        }
    }
}

fn elapsed_since(then: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - then)
        .max(ChronoDuration::zero())
        .to_std()
        .unwrap_or(Duration::ZERO)
}
