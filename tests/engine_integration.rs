//! End-to-end tests: ledger, oracle reader and detector over the REST adapter

mod common;

use common::*;
use pretty_assertions::assert_eq;
use raffle_arbitrage::arbitrage::{
    ArbitrageDetector, DetectionOptions, DetectorSettings, Direction,
};
use raffle_arbitrage::indexer::IndexerRestClient;
use raffle_arbitrage::ledger::{get_holders, HolderTracker, TrackerConfig};
use raffle_arbitrage::oracle::{HybridOracleReader, ReaderConfig};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn tracker_config() -> TrackerConfig {
    TrackerConfig {
        season_id: 1,
        curve_address: CURVE.to_string(),
        start_block: Some(0),
        lookback_blocks: 1_000,
        max_block_range: 20,
        poll_interval: Duration::from_secs(45),
    }
}

/// Events split over two 20-block chunks ending at block 29
async fn mount_event_log(server: &MockServer) {
    mount_latest_block(server, 29).await;
    let events = three_holder_events();
    let events_path = format!("/seasons/1/curves/{}/position-events", CURVE);

    Mock::given(method("GET"))
        .and(path(events_path.clone()))
        .and(query_param("fromBlock", "0"))
        .and(query_param("toBlock", "19"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "events": &events[..3]
        })))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(events_path))
        .and(query_param("fromBlock", "20"))
        .and(query_param("toBlock", "29"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "events": &events[3..]
        })))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_get_holders_over_chunked_log() {
    let server = MockServer::start().await;
    mount_event_log(&server).await;
    let client = IndexerRestClient::new(&server.uri()).unwrap();

    let holders = get_holders(&client, &tracker_config()).await.unwrap();

    let summary: Vec<_> = holders
        .iter()
        .map(|h| (h.player.as_str(), h.ticket_count, h.win_probability_bps, h.rank))
        .collect();
    assert_eq!(
        summary,
        vec![
            (BOB, 100, 3333, 1),
            (ALICE, 100, 3333, 2),
            (CAROL, 100, 3333, 3),
        ]
    );
}

#[test_log::test(tokio::test)]
async fn test_tracker_keeps_holders_when_source_fails() {
    let server = MockServer::start().await;
    mount_event_log(&server).await;
    let client = Arc::new(IndexerRestClient::new(&server.uri()).unwrap());
    let mut tracker = HolderTracker::new(client, tracker_config());
    let updates = tracker.subscribe();

    let first = tracker.refresh().await.unwrap();
    assert!(!first.stale);
    assert_eq!(first.total_tickets, 300);
    assert_eq!(updates.borrow().holders.len(), 3);

    server.reset().await;

    let second = tracker.refresh().await.unwrap();
    assert!(second.stale);
    assert_eq!(second.holders, first.holders);
    assert_eq!(second.refreshed_at, first.refreshed_at);
}

#[test_log::test(tokio::test)]
async fn test_scan_skips_unavailable_market() {
    let server = MockServer::start().await;
    mount_event_log(&server).await;
    // marginal ticket price 0.05
    mount_curve_state(&server, curve_state_json(10, WEI / 20, WEI / 10)).await;
    mount_markets(
        &server,
        1,
        vec![
            market_json("a", ALICE, true),
            market_json("b", BOB, true),
            market_json("c", CAROL, true),
        ],
    )
    .await;
    mount_oracle(
        &server,
        "a",
        ResponseTemplate::new(200).set_body_json(oracle_json("a", 200, 20)),
    )
    .await;
    mount_oracle(&server, "b", ResponseTemplate::new(500)).await;
    mount_oracle(
        &server,
        "c",
        ResponseTemplate::new(200).set_body_json(oracle_json("c", 1000, 20)),
    )
    .await;

    let client = Arc::new(IndexerRestClient::new(&server.uri()).unwrap());
    let mut tracker = HolderTracker::new(client.clone(), tracker_config());
    tracker.refresh().await.unwrap();

    let reader = Arc::new(HybridOracleReader::new(client.clone(), ReaderConfig::default()));
    let detector = ArbitrageDetector::new(
        client.clone(),
        reader,
        client,
        DetectorSettings {
            notional_units: 100,
            market_unit_scale: Decimal::ONE,
            fetch_timeout: Duration::from_secs(2),
        },
    )
    .unwrap()
    .with_ledger(tracker.subscribe());

    let report = detector
        .get_arbitrage_opportunities(
            1,
            CURVE,
            DetectionOptions {
                min_profitability_bps: 200,
                max_results: 10,
            },
        )
        .await
        .unwrap();

    assert!(!report.live);
    assert_eq!(report.markets_scanned, 3);
    assert_eq!(report.failed_markets.len(), 1);
    assert_eq!(report.failed_markets[0].market_id, "b");

    let got: Vec<_> = report
        .opportunities
        .iter()
        .map(|o| (o.market_id.as_str(), o.direction, o.profitability))
        .collect();
    assert_eq!(
        got,
        vec![
            ("a", Direction::BuyMarket, dec!(60)),
            ("c", Direction::BuyRaffle, dec!(50)),
        ]
    );

    let a = &report.opportunities[0];
    assert_eq!(a.raffle_price, dec!(0.05));
    assert_eq!(a.market_price, dec!(0.02));
    assert_eq!(a.estimated_profit, dec!(3));
    assert_eq!(a.win_probability_bps, Some(3333));
}
