//! Common test utilities and fixtures

#![allow(dead_code)]

use raffle_arbitrage::common::types::PositionUpdateEvent;
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// 20-byte curve address used across tests
pub const CURVE: &str = "0x00000000000000000000000000000000000000c0";

pub const ALICE: &str = "0x00000000000000000000000000000000000000a1";
pub const BOB: &str = "0x00000000000000000000000000000000000000b2";
pub const CAROL: &str = "0x00000000000000000000000000000000000000c3";

/// 1e18, one whole settlement unit
pub const WEI: u128 = 1_000_000_000_000_000_000;

/// Build a position update event
pub fn position_event(
    player: &str,
    old_tickets: u64,
    new_tickets: u64,
    total: u64,
    block: u64,
    log_index: u32,
) -> PositionUpdateEvent {
    PositionUpdateEvent {
        season_id: 1,
        player: player.to_string(),
        old_tickets,
        new_tickets,
        total_tickets_at_event_time: total,
        block_number: block,
        log_index,
    }
}

/// Three holders at 100 tickets each, with Alice's balance changed twice
pub fn three_holder_events() -> Vec<PositionUpdateEvent> {
    vec![
        position_event(ALICE, 0, 40, 40, 10, 0),
        position_event(BOB, 0, 100, 140, 11, 0),
        position_event(ALICE, 40, 100, 200, 12, 1),
        position_event(CAROL, 0, 100, 300, 25, 0),
    ]
}

/// Two-step curve: 1000 tickets at `first`, then 1000 at `second` (wei)
pub fn curve_state_json(supply: u64, first: u128, second: u128) -> Value {
    json!({
        "supply": supply,
        "reserves": "0",
        "currentStep": if supply < 1000 { 0 } else { 1 },
        "accumulatedFees": "0",
        "buyFeeBps": 10,
        "sellFeeBps": 70,
        "steps": [
            {"stepIndex": 0, "rangeTo": 1000, "price": first.to_string()},
            {"stepIndex": 1, "rangeTo": 2000, "price": second.to_string()}
        ]
    })
}

/// Oracle reading `age_secs` old
pub fn oracle_json(market_id: &str, hybrid_bps: u32, age_secs: i64) -> Value {
    json!({
        "marketId": market_id,
        "raffleProbabilityBps": hybrid_bps,
        "marketSentimentBps": hybrid_bps,
        "hybridPriceBps": hybrid_bps,
        "lastUpdate": chrono::Utc::now().timestamp() - age_secs
    })
}

pub fn market_json(market_id: &str, player: &str, active: bool) -> Value {
    json!({
        "marketId": market_id,
        "player": player,
        "marketType": "WINNER_PREDICTION",
        "contract": "0x00000000000000000000000000000000000000ff",
        "active": active
    })
}

/// Serve `GET /blocks/latest`
pub async fn mount_latest_block(server: &MockServer, number: u64) {
    Mock::given(method("GET"))
        .and(path("/blocks/latest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "number": number })))
        .mount(server)
        .await;
}

/// Serve the curve state for [`CURVE`]
pub async fn mount_curve_state(server: &MockServer, body: Value) {
    Mock::given(method("GET"))
        .and(path(format!("/curves/{}/state", CURVE)))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

pub async fn mount_oracle(server: &MockServer, market_id: &str, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(format!("/oracle/markets/{}", market_id)))
        .respond_with(response)
        .mount(server)
        .await;
}

pub async fn mount_markets(server: &MockServer, season_id: u64, markets: Vec<Value>) {
    Mock::given(method("GET"))
        .and(path(format!("/seasons/{}/markets", season_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "markets": markets })))
        .mount(server)
        .await;
}
