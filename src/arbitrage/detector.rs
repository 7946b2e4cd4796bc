use chrono::Utc;
use futures_util::future::join_all;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use super::types::{
    ArbitrageOpportunity, DetectionOptions, DetectionReport, DetectorSettings, Direction,
    MarketFailure,
};
use crate::common::errors::{EngineError, Result};
use crate::common::traits::{CurveStateSource, MarketRegistry, OraclePriceSource};
use crate::common::types::{bps_to_fraction, normalize_address, to_display_units, MarketInfo, SeasonId};
use crate::curve::BondingCurve;
use crate::ledger::LedgerSnapshot;
use crate::oracle::{HybridOracleReader, OracleReading};

/// Price gap between the two venues for one unit of exposure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceGap {
    pub direction: Direction,
    pub difference: Decimal,
    /// Percent, relative to the higher of the two prices
    pub profitability: Decimal,
}

/// Compare a raffle unit price against a market unit price
///
/// Returns `None` unless the gap is strictly above `min_profitability_bps`.
pub fn evaluate(
    raffle_unit_price: Decimal,
    market_unit_price: Decimal,
    min_profitability_bps: u32,
) -> Option<PriceGap> {
    let reference = raffle_unit_price.max(market_unit_price);
    if reference <= Decimal::ZERO {
        return None;
    }

    let difference = (raffle_unit_price - market_unit_price).abs();
    // compare the reported value, so rounding can never land on the threshold
    let profitability = (difference / reference * Decimal::ONE_HUNDRED).round_dp(4);
    let threshold = Decimal::from(min_profitability_bps) / Decimal::ONE_HUNDRED;
    if profitability <= threshold {
        return None;
    }

    let direction = if raffle_unit_price < market_unit_price {
        Direction::BuyRaffle
    } else {
        Direction::BuyMarket
    };

    Some(PriceGap {
        direction,
        difference,
        profitability,
    })
}

fn overflow_failure(market_id: &str, what: &str) -> MarketFailure {
    MarketFailure {
        market_id: market_id.to_string(),
        reason: format!("{} overflows decimal range", what),
    }
}

/// Clears the in-flight flag when a cycle ends, including on cancellation
struct CycleGuard<'a>(&'a AtomicBool);

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Cross-venue opportunity scanner
///
/// One cycle reads the curve's marginal ticket price once, then every active
/// market's hybrid oracle price concurrently, and keeps the gaps above the
/// caller's threshold. Cycles never overlap; a call made while one is running
/// gets the previous report back with `reused` set.
pub struct ArbitrageDetector<C, O, R>
where
    C: CurveStateSource + ?Sized,
    O: OraclePriceSource + ?Sized,
    R: MarketRegistry + ?Sized,
{
    curves: Arc<C>,
    oracle: Arc<HybridOracleReader<O>>,
    registry: Arc<R>,
    ledger: Option<watch::Receiver<LedgerSnapshot>>,
    settings: DetectorSettings,
    in_flight: AtomicBool,
    report_tx: watch::Sender<Option<DetectionReport>>,
}

impl<C, O, R> ArbitrageDetector<C, O, R>
where
    C: CurveStateSource + ?Sized,
    O: OraclePriceSource + ?Sized,
    R: MarketRegistry + ?Sized,
{
    pub fn new(
        curves: Arc<C>,
        oracle: Arc<HybridOracleReader<O>>,
        registry: Arc<R>,
        settings: DetectorSettings,
    ) -> Result<Self> {
        settings.validate()?;
        let (report_tx, _) = watch::channel(None);
        Ok(Self {
            curves,
            oracle,
            registry,
            ledger: None,
            settings,
            in_flight: AtomicBool::new(false),
            report_tx,
        })
    }

    /// Attach the holder ledger so opportunities carry each player's current
    /// win probability
    pub fn with_ledger(mut self, ledger: watch::Receiver<LedgerSnapshot>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn settings(&self) -> &DetectorSettings {
        &self.settings
    }

    /// Receive every completed report
    pub fn subscribe(&self) -> watch::Receiver<Option<DetectionReport>> {
        self.report_tx.subscribe()
    }

    /// Most recent completed report, if any
    pub fn last_report(&self) -> Option<DetectionReport> {
        self.report_tx.borrow().clone()
    }

    /// Scan every active market of a season for price gaps
    ///
    /// Only invalid options are errors. Unreachable or stale inputs leave
    /// their markets out and clear `live` on the report.
    #[instrument(skip(self, options), fields(min_bps = options.min_profitability_bps))]
    pub async fn get_arbitrage_opportunities(
        &self,
        season_id: SeasonId,
        curve_address: &str,
        options: DetectionOptions,
    ) -> Result<DetectionReport> {
        options.validate()?;

        if self.in_flight.swap(true, Ordering::AcqRel) {
            debug!("Detection cycle already in flight, reusing last report");
            let previous = self
                .last_report()
                .filter(|r| {
                    r.season_id == season_id
                        && normalize_address(&r.curve_address) == normalize_address(curve_address)
                })
                .unwrap_or_else(|| DetectionReport::empty(season_id, curve_address, false));
            return Ok(DetectionReport {
                reused: true,
                ..previous
            });
        }
        let _guard = CycleGuard(&self.in_flight);

        let report = self.cycle(season_id, curve_address, options).await?;
        info!(
            opportunities = report.opportunities.len(),
            scanned = report.markets_scanned,
            failed = report.failed_markets.len(),
            live = report.live,
            "Detection cycle complete"
        );
        self.report_tx.send_replace(Some(report.clone()));
        Ok(report)
    }

    /// Run detection on a fixed cadence until shutdown
    pub async fn run(
        self: Arc<Self>,
        season_id: SeasonId,
        curve_address: String,
        options: DetectionOptions,
        every: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        options.validate()?;
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(interval_ms = every.as_millis() as u64, "Arbitrage scanner started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self
                        .get_arbitrage_opportunities(season_id, &curve_address, options)
                        .await
                    {
                        warn!("Detection cycle failed: {}", e);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Arbitrage scanner stopping");
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn cycle(
        &self,
        season_id: SeasonId,
        curve_address: &str,
        options: DetectionOptions,
    ) -> Result<DetectionReport> {
        let (markets, raffle_price) = tokio::join!(
            self.registry.active_markets(season_id),
            self.raffle_unit_price(curve_address)
        );

        let markets: Vec<MarketInfo> = match markets {
            Ok(markets) => markets
                .into_iter()
                .filter(|m| m.active && m.season_id == season_id)
                .collect(),
            Err(e) if e.is_recoverable() => {
                warn!("Market registry unavailable: {}", e);
                return Ok(DetectionReport::empty(season_id, curve_address, false));
            }
            Err(e) => return Err(e),
        };

        let raffle_price = match raffle_price {
            Ok(price) => price,
            Err(e) => {
                warn!(curve = %curve_address, "No raffle price this cycle: {}", e);
                let mut report = DetectionReport::empty(season_id, curve_address, false);
                report.markets_scanned = markets.len();
                return Ok(report);
            }
        };

        let readings = join_all(markets.iter().map(|m| self.fetch_reading(&m.market_id))).await;

        let ledger = self.ledger.as_ref().map(|rx| rx.borrow().clone());
        let now = Utc::now();
        let mut live = true;
        let mut failed_markets = Vec::new();
        let mut opportunities = Vec::new();

        for (market, reading) in markets.iter().zip(readings) {
            let reading = match reading {
                Ok(reading) if reading.live => reading,
                Ok(_) => {
                    live = false;
                    failed_markets.push(MarketFailure {
                        market_id: market.market_id.clone(),
                        reason: "oracle price is stale".to_string(),
                    });
                    continue;
                }
                Err(e) => {
                    live = false;
                    debug!(market = %market.market_id, "Market skipped: {}", e);
                    failed_markets.push(MarketFailure {
                        market_id: market.market_id.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            let Some(market_price) = bps_to_fraction(reading.hybrid_price_bps())
                .checked_mul(self.settings.market_unit_scale)
            else {
                live = false;
                failed_markets.push(overflow_failure(&market.market_id, "market price"));
                continue;
            };
            let Some(gap) = evaluate(raffle_price, market_price, options.min_profitability_bps)
            else {
                continue;
            };
            let Some(estimated_profit) = gap
                .difference
                .checked_mul(Decimal::from(self.settings.notional_units))
            else {
                live = false;
                warn!(market = %market.market_id, "Estimated profit overflows");
                failed_markets.push(overflow_failure(&market.market_id, "estimated profit"));
                continue;
            };

            let win_probability_bps = ledger
                .as_ref()
                .and_then(|s| s.holder(&market.player))
                .map(|h| h.win_probability_bps);

            opportunities.push(ArbitrageOpportunity {
                market_id: market.market_id.clone(),
                player: normalize_address(&market.player),
                season_id,
                raffle_price,
                market_price,
                price_difference: gap.difference,
                direction: gap.direction,
                profitability: gap.profitability,
                estimated_profit,
                win_probability_bps,
                last_updated: now,
            });
        }

        opportunities.sort_by(|a, b| {
            b.profitability
                .cmp(&a.profitability)
                .then_with(|| a.market_id.cmp(&b.market_id))
        });
        opportunities.truncate(options.max_results);

        Ok(DetectionReport {
            season_id,
            curve_address: curve_address.to_string(),
            opportunities,
            live,
            markets_scanned: markets.len(),
            failed_markets,
            reused: false,
            generated_at: now,
        })
    }

    /// Marginal ticket price at current supply, in whole settlement units
    async fn raffle_unit_price(&self, curve_address: &str) -> Result<Decimal> {
        let state = timeout(self.settings.fetch_timeout, self.curves.curve_state(curve_address))
            .await
            .map_err(|_| EngineError::Timeout(format!("curve state for {}", curve_address)))??;
        let curve = BondingCurve::from_state(&state)?;
        let price = curve.marginal_price(state.supply)?;
        to_display_units(price)
    }

    async fn fetch_reading(&self, market_id: &str) -> Result<OracleReading> {
        timeout(self.settings.fetch_timeout, self.oracle.read_hybrid_price(market_id))
            .await
            .map_err(|_| EngineError::Timeout(format!("oracle price for {}", market_id)))?
    }
}
