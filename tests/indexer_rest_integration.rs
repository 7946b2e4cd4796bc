//! Integration tests for the indexer REST adapter against a local mock server

mod common;

use common::*;
use pretty_assertions::assert_eq;
use raffle_arbitrage::common::errors::EngineError;
use raffle_arbitrage::common::traits::{
    CurveStateSource, MarketRegistry, OraclePriceSource, PositionEventSource,
};
use raffle_arbitrage::indexer::IndexerRestClient;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn setup() -> (MockServer, IndexerRestClient) {
    let server = MockServer::start().await;
    let client = IndexerRestClient::new(&format!("{}/", server.uri())).unwrap();
    (server, client)
}

#[tokio::test]
async fn test_latest_block() {
    let (server, client) = setup().await;
    mount_latest_block(&server, 18_000_123).await;

    assert_eq!(client.latest_block().await.unwrap(), 18_000_123);
}

#[tokio::test]
async fn test_position_events_query() {
    let (server, client) = setup().await;
    Mock::given(method("GET"))
        .and(path(format!("/seasons/1/curves/{}/position-events", CURVE)))
        .and(query_param("fromBlock", "100"))
        .and(query_param("toBlock", "199"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "events": three_holder_events()
        })))
        .expect(1)
        .mount(&server)
        .await;

    // mixed-case address is normalized into the path
    let events = client
        .position_events(1, &CURVE.to_uppercase().replace("0X", "0x"), 100, 199)
        .await
        .unwrap();

    assert_eq!(events, three_holder_events());
}

#[tokio::test]
async fn test_curve_state_amounts_parse_from_strings() {
    let (server, client) = setup().await;
    mount_curve_state(&server, curve_state_json(1500, WEI, 2 * WEI)).await;

    let state = client.curve_state(CURVE).await.unwrap();

    assert_eq!(state.supply, 1500);
    assert_eq!(state.steps.len(), 2);
    assert_eq!(state.steps[1].price, 2 * WEI);
    assert_eq!(state.sell_fee_bps, 70);
}

#[tokio::test]
async fn test_oracle_price_present() {
    let (server, client) = setup().await;
    mount_oracle(
        &server,
        "m1",
        ResponseTemplate::new(200).set_body_json(oracle_json("m1", 4200, 30)),
    )
    .await;

    let price = client.oracle_price("m1").await.unwrap().unwrap();
    assert_eq!(price.hybrid_price_bps, 4200);
}

#[tokio::test]
async fn test_oracle_price_never_recorded() {
    let (server, client) = setup().await;
    mount_oracle(&server, "missing", ResponseTemplate::new(404)).await;
    mount_oracle(
        &server,
        "zero",
        ResponseTemplate::new(200).set_body_json(json!({
            "marketId": "zero",
            "raffleProbabilityBps": 0,
            "marketSentimentBps": 0,
            "hybridPriceBps": 0,
            "lastUpdate": 0
        })),
    )
    .await;

    assert!(client.oracle_price("missing").await.unwrap().is_none());
    assert!(client.oracle_price("zero").await.unwrap().is_none());
}

#[tokio::test]
async fn test_inactive_markets_are_filtered() {
    let (server, client) = setup().await;
    mount_markets(
        &server,
        1,
        vec![
            market_json("m1", ALICE, true),
            market_json("m2", BOB, false),
            market_json("m3", CAROL, true),
        ],
    )
    .await;

    let markets = client.active_markets(1).await.unwrap();
    let ids: Vec<_> = markets.iter().map(|m| m.market_id.as_str()).collect();

    assert_eq!(ids, vec!["m1", "m3"]);
    assert!(markets.iter().all(|m| m.season_id == 1));
}

#[tokio::test]
async fn test_server_error_is_unavailable() {
    let (server, client) = setup().await;
    Mock::given(method("GET"))
        .and(path("/blocks/latest"))
        .respond_with(ResponseTemplate::new(503).set_body_string("syncing"))
        .mount(&server)
        .await;

    let err = client.latest_block().await.unwrap_err();
    assert!(matches!(err, EngineError::Unavailable(_)), "got {:?}", err);
    assert!(err.is_recoverable());
}

#[tokio::test]
async fn test_bad_amount_is_invalid_response() {
    let (server, client) = setup().await;
    let mut body = curve_state_json(0, WEI, 2 * WEI);
    body["reserves"] = json!("lots");
    mount_curve_state(&server, body).await;

    let err = client.curve_state(CURVE).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidResponse(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_market_id_is_percent_encoded() {
    let (server, client) = setup().await;
    Mock::given(method("GET"))
        .and(path("/oracle/markets/season%201%2Falice"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(oracle_json("season 1/alice", 5100, 10)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let price = client.oracle_price("season 1/alice").await.unwrap().unwrap();
    assert_eq!(price.market_id, "season 1/alice");
    assert_eq!(price.hybrid_price_bps, 5100);
}
