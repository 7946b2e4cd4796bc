//! Holder tracker: the single writer of holder state
//!
//! Polls the event source on a fixed cadence, optionally consumes the live
//! feed, folds both through the same [`HolderBook`], and publishes immutable
//! [`LedgerSnapshot`]s on a `watch` channel. A failed poll keeps the previous
//! holders and marks the snapshot stale.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use super::book::{HolderBook, HolderPosition};
use crate::common::errors::Result;
use crate::common::traits::PositionEventSource;
use crate::common::types::{normalize_address, ConnectionStatus, FeedEvent, SeasonId};
use crate::config::types::{AppConfig, SeasonConfig};

/// Event window and cadence for one season + curve
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub season_id: SeasonId,
    pub curve_address: String,
    /// Window anchor; when unknown the window starts `lookback_blocks` back
    pub start_block: Option<u64>,
    pub lookback_blocks: u64,
    pub max_block_range: u64,
    pub poll_interval: Duration,
}

impl TrackerConfig {
    pub fn from_season(season: &SeasonConfig, poll_interval: Duration) -> Self {
        Self {
            season_id: season.season_id,
            curve_address: normalize_address(&season.curve_address),
            start_block: season.start_block,
            lookback_blocks: season.lookback_blocks,
            max_block_range: season.max_block_range.max(1),
            poll_interval,
        }
    }

    pub fn from_app(config: &AppConfig) -> Self {
        Self::from_season(
            &config.season,
            Duration::from_secs(config.polling.holders_interval_seconds),
        )
    }

    /// First block of the event window
    pub fn window_start(&self, latest_block: u64) -> u64 {
        self.start_block
            .unwrap_or_else(|| latest_block.saturating_sub(self.lookback_blocks))
    }
}

/// Published holder state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSnapshot {
    pub season_id: SeasonId,
    pub curve_address: String,
    pub holders: Vec<HolderPosition>,
    pub total_tickets: u128,
    /// Highest block folded so far
    pub last_block: Option<u64>,
    /// Time of the last successful poll; `None` while loading
    pub refreshed_at: Option<DateTime<Utc>>,
    /// Set when the latest poll failed and holders are from an earlier one
    pub stale: bool,
}

impl LedgerSnapshot {
    fn empty(season_id: SeasonId, curve_address: &str) -> Self {
        Self {
            season_id,
            curve_address: curve_address.to_string(),
            holders: Vec::new(),
            total_tickets: 0,
            last_block: None,
            refreshed_at: None,
            stale: false,
        }
    }

    /// No poll has succeeded yet
    pub fn is_loading(&self) -> bool {
        self.refreshed_at.is_none()
    }

    pub fn holder(&self, player: &str) -> Option<&HolderPosition> {
        let player = normalize_address(player);
        self.holders.iter().find(|h| h.player == player)
    }
}

/// Fetch `[from, to]` in chunks of at most `max_block_range` blocks, folding each
/// chunk into `book` as it arrives
///
/// `next_block` advances past each folded chunk; on error, chunks already
/// folded stay folded.
async fn fetch_window<S>(
    source: &S,
    config: &TrackerConfig,
    from: u64,
    to: u64,
    book: &mut HolderBook,
    next_block: &mut u64,
) -> Result<()>
where
    S: PositionEventSource + ?Sized,
{
    let span = config.max_block_range.max(1) - 1;
    let mut chunk_start = from;
    while chunk_start <= to {
        let chunk_end = to.min(chunk_start.saturating_add(span));
        let events = source
            .position_events(config.season_id, &config.curve_address, chunk_start, chunk_end)
            .await?;
        let changed = book.apply_all(&events);
        debug!(
            from = chunk_start,
            to = chunk_end,
            events = events.len(),
            changed,
            "Folded event chunk"
        );
        *next_block = chunk_end + 1;
        if chunk_end == u64::MAX {
            break;
        }
        chunk_start = chunk_end + 1;
    }
    Ok(())
}

/// One-shot fetch and fold of a season's holders
///
/// Unlike the tracker there is no previous snapshot to fall back to, so any
/// source error propagates.
#[instrument(skip(source, config), fields(season = config.season_id))]
pub async fn get_holders<S>(source: &S, config: &TrackerConfig) -> Result<Vec<HolderPosition>>
where
    S: PositionEventSource + ?Sized,
{
    let latest = source.latest_block().await?;
    let from = config.window_start(latest);
    let mut book = HolderBook::new(config.season_id);
    let mut next_block = from;
    fetch_window(source, config, from, latest, &mut book, &mut next_block).await?;
    Ok(book.holders())
}

/// Single writer of holder state for one season + curve
pub struct HolderTracker<S: PositionEventSource + ?Sized> {
    source: Arc<S>,
    config: TrackerConfig,
    book: HolderBook,
    /// Next block to poll from; `None` until the first window load
    next_block: Option<u64>,
    refreshed_at: Option<DateTime<Utc>>,
    snapshot_tx: watch::Sender<LedgerSnapshot>,
}

impl<S: PositionEventSource + ?Sized> HolderTracker<S> {
    pub fn new(source: Arc<S>, config: TrackerConfig) -> Self {
        let (snapshot_tx, _) =
            watch::channel(LedgerSnapshot::empty(config.season_id, &config.curve_address));
        Self {
            source,
            book: HolderBook::new(config.season_id),
            config,
            next_block: None,
            refreshed_at: None,
            snapshot_tx,
        }
    }

    /// Receiver for published snapshots
    pub fn subscribe(&self) -> watch::Receiver<LedgerSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Current snapshot
    pub fn snapshot(&self) -> LedgerSnapshot {
        self.snapshot_tx.borrow().clone()
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Poll the source once and publish the result
    ///
    /// Recoverable source errors are absorbed: the previous holders are kept
    /// and the snapshot is marked stale.
    #[instrument(skip(self), fields(season = self.config.season_id))]
    pub async fn refresh(&mut self) -> Result<LedgerSnapshot> {
        match self.poll().await {
            Ok(()) => {
                self.refreshed_at = Some(Utc::now());
                Ok(self.publish(false))
            }
            Err(e) if e.is_recoverable() => {
                warn!("Holder refresh failed, keeping last snapshot: {}", e);
                Ok(self.publish(true))
            }
            Err(e) => Err(e),
        }
    }

    async fn poll(&mut self) -> Result<()> {
        let latest = self.source.latest_block().await?;
        let from = match self.next_block {
            Some(block) => block,
            None => self.config.window_start(latest),
        };
        if from > latest {
            debug!(from, latest, "No new blocks");
            return Ok(());
        }

        let mut next_block = from;
        let result = fetch_window(
            self.source.as_ref(),
            &self.config,
            from,
            latest,
            &mut self.book,
            &mut next_block,
        )
        .await;
        if next_block > from {
            self.next_block = Some(next_block);
        }
        result
    }

    /// Fold one event from the live feed
    pub fn apply_feed_event(&mut self, event: FeedEvent) {
        match event {
            FeedEvent::Position(position) => {
                if position.season_id != self.config.season_id {
                    return;
                }
                if self.book.apply(&position) {
                    let stale = self.snapshot_tx.borrow().stale;
                    self.publish(stale);
                }
            }
            FeedEvent::ConnectionStatus(ConnectionStatus::Connected) => {
                info!("Position feed connected");
            }
            FeedEvent::ConnectionStatus(status) => {
                warn!("Position feed status: {:?}", status);
            }
            FeedEvent::Heartbeat => {}
        }
    }

    fn publish(&self, stale: bool) -> LedgerSnapshot {
        let snapshot = LedgerSnapshot {
            season_id: self.config.season_id,
            curve_address: self.config.curve_address.clone(),
            holders: self.book.holders(),
            total_tickets: self.book.total_tickets(),
            last_block: self.book.last_block(),
            refreshed_at: self.refreshed_at,
            stale,
        };
        self.snapshot_tx.send_replace(snapshot.clone());
        snapshot
    }

    /// Run the poll loop, folding feed events between polls, until shutdown
    pub async fn run(
        mut self,
        mut feed: Option<mpsc::Receiver<FeedEvent>>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let mut ticker = interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            season = self.config.season_id,
            curve = %self.config.curve_address,
            "Holder tracker started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let snapshot = self.refresh().await?;
                    debug!(
                        holders = snapshot.holders.len(),
                        total = %snapshot.total_tickets,
                        stale = snapshot.stale,
                        "Holder snapshot published"
                    );
                }
                event = recv_feed(&mut feed) => {
                    match event {
                        Some(event) => self.apply_feed_event(event),
                        None => {
                            warn!("Position feed closed, continuing with polling only");
                            feed = None;
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Holder tracker stopping");
                        return Ok(());
                    }
                }
            }
        }
    }
}

async fn recv_feed(feed: &mut Option<mpsc::Receiver<FeedEvent>>) -> Option<FeedEvent> {
    match feed {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
