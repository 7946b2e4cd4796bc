//! Canonical reducer for position-update events
//!
//! Every ingestion path (polled batches and the live feed) goes through
//! [`HolderBook::apply`]. Each event carries an absolute balance, so the book
//! keeps only the newest event per player by `(block_number, log_index)` and
//! derives probabilities from the live sum of balances.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::common::types::{normalize_address, PositionUpdateEvent, SeasonId, BPS_DENOMINATOR};

/// Derived holder state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HolderPosition {
    pub player: String,
    pub ticket_count: u64,
    pub win_probability_bps: u32,
    /// 1-based rank by descending ticket count
    pub rank: u32,
    /// Block of the player's latest event
    pub last_block: u64,
}

/// Latest event per player for one season
#[derive(Debug, Clone)]
pub struct HolderBook {
    season_id: SeasonId,
    latest: HashMap<String, PositionUpdateEvent>,
    last_block: Option<u64>,
}

impl HolderBook {
    pub fn new(season_id: SeasonId) -> Self {
        Self {
            season_id,
            latest: HashMap::new(),
            last_block: None,
        }
    }

    pub fn season_id(&self) -> SeasonId {
        self.season_id
    }

    /// Highest block seen across all applied events
    pub fn last_block(&self) -> Option<u64> {
        self.last_block
    }

    /// Fold one event into the book
    ///
    /// Returns `true` if the player's entry changed. Older or duplicate events
    /// never overwrite a newer entry, so replays are harmless.
    pub fn apply(&mut self, event: &PositionUpdateEvent) -> bool {
        if event.season_id != self.season_id {
            debug!(
                expected = self.season_id,
                got = event.season_id,
                "Ignoring event for another season"
            );
            return false;
        }

        self.last_block = Some(
            self.last_block
                .map_or(event.block_number, |b| b.max(event.block_number)),
        );

        let player = normalize_address(&event.player);
        if let Some(current) = self.latest.get(&player) {
            if current.ordering_key() >= event.ordering_key() {
                trace!(%player, "Skipping event older than folded entry");
                return false;
            }
        }

        let mut stored = event.clone();
        stored.player = player.clone();
        self.latest.insert(player, stored);
        true
    }

    /// Fold a batch; returns how many entries changed
    pub fn apply_all<'a, I>(&mut self, events: I) -> usize
    where
        I: IntoIterator<Item = &'a PositionUpdateEvent>,
    {
        events.into_iter().filter(|e| self.apply(e)).count()
    }

    /// Live sum of all current balances, widened so any number of holders fits
    pub fn total_tickets(&self) -> u128 {
        self.latest.values().map(|e| u128::from(e.new_tickets)).sum()
    }

    /// Number of players with a non-zero balance
    pub fn holder_count(&self) -> usize {
        self.latest.values().filter(|e| e.new_tickets > 0).count()
    }

    /// Ranked holders with probabilities normalized against the live total
    ///
    /// The total embedded in each event is ignored: it only reflects supply at
    /// the time that event was emitted.
    pub fn holders(&self) -> Vec<HolderPosition> {
        let mut live: Vec<&PositionUpdateEvent> =
            self.latest.values().filter(|e| e.new_tickets > 0).collect();

        let denominator: u128 = live.iter().map(|e| u128::from(e.new_tickets)).sum();

        live.sort_by(|a, b| {
            b.new_tickets
                .cmp(&a.new_tickets)
                .then(a.block_number.cmp(&b.block_number))
                .then(a.log_index.cmp(&b.log_index))
                .then(a.player.cmp(&b.player))
        });

        live.into_iter()
            .enumerate()
            .map(|(idx, event)| HolderPosition {
                player: event.player.clone(),
                ticket_count: event.new_tickets,
                win_probability_bps: win_probability_bps(event.new_tickets, denominator),
                rank: idx as u32 + 1,
                last_block: event.block_number,
            })
            .collect()
    }
}

/// `floor(tickets * 10000 / total)`, 0 when there are no tickets
pub fn win_probability_bps(tickets: u64, total: u128) -> u32 {
    if total == 0 {
        return 0;
    }
    let bps = u128::from(tickets) * u128::from(BPS_DENOMINATOR) / total;
    // tickets <= total for any holder in the book
    bps.min(u128::from(BPS_DENOMINATOR)) as u32
}

/// Fold an event log from scratch into ranked holders
pub fn fold_events<'a, I>(season_id: SeasonId, events: I) -> Vec<HolderPosition>
where
    I: IntoIterator<Item = &'a PositionUpdateEvent>,
{
    let mut book = HolderBook::new(season_id);
    book.apply_all(events);
    book.holders()
}
