//! Position feed client against a local WebSocket server

mod common;

use common::*;
use futures_util::{SinkExt, StreamExt};
use pretty_assertions::assert_eq;
use raffle_arbitrage::common::channels::{create_feed_channel, create_shutdown_channel};
use raffle_arbitrage::common::errors::EngineError;
use raffle_arbitrage::common::types::{ConnectionStatus, FeedEvent};
use raffle_arbitrage::indexer::PositionFeedClient;
use serde_json::Value;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

/// Accept one connection, capture the subscription, push one update, close
async fn serve_once(listener: TcpListener, subscribed: oneshot::Sender<Value>) {
    let (stream, _) = listener.accept().await.unwrap();
    let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

    if let Some(Ok(Message::Text(text))) = ws.next().await {
        let _ = subscribed.send(serde_json::from_str(&text).unwrap());
    }

    let mut update = serde_json::to_value(position_event(ALICE, 0, 25, 25, 7, 2)).unwrap();
    update["type"] = Value::from("position_update");
    ws.send(Message::Text(update.to_string())).await.unwrap();
    ws.send(Message::Text(r#"{"type":"heartbeat"}"#.to_string()))
        .await
        .unwrap();
    ws.send(Message::Close(Some(CloseFrame {
        code: CloseCode::Normal,
        reason: "season over".into(),
    })))
    .await
    .unwrap();

    // drain until the client acknowledges the close
    while let Some(Ok(_)) = ws.next().await {}
}

#[test_log::test(tokio::test)]
async fn test_feed_forwards_updates_then_gives_up() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (sub_tx, sub_rx) = oneshot::channel();
    let server = tokio::spawn(serve_once(listener, sub_tx));

    let client = PositionFeedClient::new(&format!("ws://{}", addr), 1, CURVE)
        .with_reconnect(Duration::from_millis(10), 0);
    let connected = client.connected_flag();
    let (events_tx, mut events_rx) = create_feed_channel();
    let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();

    let result = tokio::time::timeout(Duration::from_secs(5), client.run(events_tx, shutdown_rx))
        .await
        .expect("feed did not finish");
    assert!(matches!(result, Err(EngineError::WebSocket(_))), "got {:?}", result);
    assert!(!connected.load(std::sync::atomic::Ordering::SeqCst));

    let subscription = sub_rx.await.unwrap();
    assert_eq!(subscription["type"], "subscribe");
    assert_eq!(subscription["seasonId"], 1);
    assert_eq!(subscription["curve"], CURVE);

    let mut received = Vec::new();
    while let Ok(event) = events_rx.try_recv() {
        received.push(event);
    }
    assert_eq!(received.len(), 4, "events: {:?}", received);
    assert!(matches!(
        received[0],
        FeedEvent::ConnectionStatus(ConnectionStatus::Connected)
    ));
    match &received[1] {
        FeedEvent::Position(event) => {
            assert_eq!(event.player, ALICE);
            assert_eq!(event.new_tickets, 25);
            assert_eq!(event.log_index, 2);
        }
        other => panic!("expected position update, got {:?}", other),
    }
    assert!(matches!(received[2], FeedEvent::Heartbeat));
    match &received[3] {
        FeedEvent::ConnectionStatus(ConnectionStatus::Disconnected(reason)) => {
            assert_eq!(reason.as_deref(), Some("season over"));
        }
        other => panic!("expected disconnect, got {:?}", other),
    }

    server.await.unwrap();
}

#[tokio::test]
async fn test_feed_stops_on_shutdown() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    // accept but never send anything
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        while let Some(Ok(_)) = ws.next().await {}
    });

    let client = PositionFeedClient::new(&format!("ws://{}", addr), 1, CURVE);
    let (events_tx, mut events_rx) = create_feed_channel();
    let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let handle = tokio::spawn(client.run(events_tx, shutdown_rx));

    assert!(matches!(
        events_rx.recv().await,
        Some(FeedEvent::ConnectionStatus(ConnectionStatus::Connected))
    ));
    shutdown_tx.send(true).unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("feed ignored shutdown")
        .unwrap();
    assert!(result.is_ok());
    server.abort();
}
