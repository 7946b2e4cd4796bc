//! WebSocket client for the live position-update feed

use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, error, info, instrument, warn};

use super::messages::FeedSubscribeMessage;
use crate::common::errors::{EngineError, Result};
use crate::common::types::{
    normalize_address, ConnectionStatus, FeedEvent, PositionUpdateEvent, SeasonId,
};
use crate::config::types::AppConfig;

/// How a connected session ended
#[derive(Debug)]
enum SessionEnd {
    Closed(Option<String>),
    ConsumerGone,
}

/// Streams position updates for one season's curve
///
/// Reconnects after a drop, up to `max_reconnect_attempts` consecutive
/// failures. The ledger's polling loop covers anything missed while
/// disconnected.
pub struct PositionFeedClient {
    url: String,
    season_id: SeasonId,
    curve_address: String,
    reconnect_delay: Duration,
    max_reconnect_attempts: u32,
    is_connected: Arc<AtomicBool>,
}

impl PositionFeedClient {
    pub fn new(ws_url: &str, season_id: SeasonId, curve_address: &str) -> Self {
        Self {
            url: format!("{}/position-feed", ws_url.trim_end_matches('/')),
            season_id,
            curve_address: normalize_address(curve_address),
            reconnect_delay: Duration::from_secs(5),
            max_reconnect_attempts: 10,
            is_connected: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Build from app config, or `None` when the feed is disabled
    pub fn from_config(config: &AppConfig) -> Option<Self> {
        if !config.indexer.enable_feed || config.indexer.websocket_url.is_empty() {
            return None;
        }
        let client = Self::new(
            &config.indexer.websocket_url,
            config.season.season_id,
            &config.season.curve_address,
        );
        Some(client.with_reconnect(
            Duration::from_millis(config.settings.reconnect_delay_ms),
            config.settings.max_reconnect_attempts,
        ))
    }

    pub fn with_reconnect(mut self, delay: Duration, max_attempts: u32) -> Self {
        self.reconnect_delay = delay;
        self.max_reconnect_attempts = max_attempts;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_connected(&self) -> bool {
        self.is_connected.load(Ordering::SeqCst)
    }

    /// Shared connected flag, readable after `run` takes ownership
    pub fn connected_flag(&self) -> Arc<AtomicBool> {
        self.is_connected.clone()
    }

    /// Stream until shutdown, the consumer hangs up, or reconnects run out
    #[instrument(skip_all, fields(url = %self.url, season = self.season_id))]
    pub async fn run(
        self,
        events: mpsc::Sender<FeedEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let mut attempt: u32 = 0;

        loop {
            let outcome = tokio::select! {
                outcome = self.session(&events) => outcome,
                _ = wait_for_shutdown(&mut shutdown) => {
                    info!("Position feed stopping");
                    return Ok(());
                }
            };
            self.is_connected.store(false, Ordering::SeqCst);

            let status = match outcome {
                Ok(SessionEnd::ConsumerGone) => {
                    info!("Feed consumer dropped, stopping");
                    return Ok(());
                }
                Ok(SessionEnd::Closed(reason)) => {
                    attempt = 0;
                    ConnectionStatus::Disconnected(reason)
                }
                Err(e) => {
                    warn!("Position feed connection failed: {}", e);
                    ConnectionStatus::Error(e.to_string())
                }
            };
            if events.send(FeedEvent::ConnectionStatus(status)).await.is_err() {
                return Ok(());
            }

            attempt += 1;
            if attempt > self.max_reconnect_attempts {
                error!(attempts = attempt - 1, "Giving up on position feed");
                return Err(EngineError::WebSocket(format!(
                    "position feed unavailable after {} reconnect attempts",
                    attempt - 1
                )));
            }

            let _ = events
                .send(FeedEvent::ConnectionStatus(ConnectionStatus::Reconnecting {
                    attempt,
                }))
                .await;
            info!(attempt, delay_ms = self.reconnect_delay.as_millis() as u64, "Reconnecting");

            tokio::select! {
                _ = tokio::time::sleep(self.reconnect_delay) => {}
                _ = wait_for_shutdown(&mut shutdown) => return Ok(()),
            }
        }
    }

    /// One connection: connect, subscribe, forward until the stream ends
    async fn session(&self, events: &mpsc::Sender<FeedEvent>) -> Result<SessionEnd> {
        info!("Connecting to position feed: {}", self.url);
        let (ws_stream, _response) = connect_async(&self.url)
            .await
            .map_err(|e| EngineError::WebSocket(e.to_string()))?;

        info!("Position feed connected");
        self.is_connected.store(true, Ordering::SeqCst);
        if events
            .send(FeedEvent::ConnectionStatus(ConnectionStatus::Connected))
            .await
            .is_err()
        {
            return Ok(SessionEnd::ConsumerGone);
        }

        let (mut write, mut read) = ws_stream.split();

        let subscribe = FeedSubscribeMessage::new(self.season_id, &self.curve_address);
        let msg_json = serde_json::to_string(&subscribe)?;
        debug!("Sending subscription message: {}", msg_json);
        write.send(Message::Text(msg_json)).await?;

        loop {
            match read.next().await {
                Some(Ok(Message::Text(text))) => match Self::parse_message(&text) {
                    Ok(Some(event)) => {
                        if events.send(event).await.is_err() {
                            return Ok(SessionEnd::ConsumerGone);
                        }
                    }
                    Ok(None) => debug!("Ignoring feed message: {}", text),
                    Err(e) => warn!("Failed to parse message: {} - {}", e, text),
                },
                Some(Ok(Message::Ping(data))) => {
                    if let Err(e) = write.send(Message::Pong(data)).await {
                        return Ok(SessionEnd::Closed(Some(e.to_string())));
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    info!("Position feed closed: {:?}", frame);
                    return Ok(SessionEnd::Closed(frame.map(|f| f.reason.to_string())));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    error!("WebSocket error: {}", e);
                    return Ok(SessionEnd::Closed(Some(e.to_string())));
                }
                None => {
                    info!("Position feed stream ended");
                    return Ok(SessionEnd::Closed(None));
                }
            }
        }
    }

    /// Parse one text frame; `Ok(None)` for frames with nothing to forward
    pub fn parse_message(text: &str) -> Result<Option<FeedEvent>> {
        if text.eq_ignore_ascii_case("pong") {
            return Ok(Some(FeedEvent::Heartbeat));
        }

        let value: serde_json::Value = serde_json::from_str(text)?;
        match value.get("type").and_then(|v| v.as_str()) {
            Some("position_update") => {
                let event: PositionUpdateEvent = serde_json::from_value(value)?;
                Ok(Some(FeedEvent::Position(event)))
            }
            Some("heartbeat") => Ok(Some(FeedEvent::Heartbeat)),
            Some("error") => {
                let message = value
                    .get("message")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown feed error");
                Err(EngineError::WebSocket(message.to_string()))
            }
            _ => Ok(None),
        }
    }
}

/// Resolves once shutdown is signalled or its sender is gone
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = PositionFeedClient::new("wss://indexer.example.org/", 1, "0xCURVE");
        assert_eq!(client.url(), "wss://indexer.example.org/position-feed");
        assert_eq!(client.curve_address, "0xcurve");
        assert!(!client.is_connected());
    }

    #[test]
    fn test_from_config_respects_toggle() {
        let mut config = AppConfig::default();
        config.indexer.websocket_url = "ws://localhost:9000".to_string();
        config.indexer.enable_feed = false;
        assert!(PositionFeedClient::from_config(&config).is_none());

        config.indexer.enable_feed = true;
        let client = PositionFeedClient::from_config(&config).unwrap();
        assert_eq!(client.max_reconnect_attempts, config.settings.max_reconnect_attempts);
    }

    #[test]
    fn test_parse_position_update() {
        let json = r#"{
            "type": "position_update",
            "seasonId": 1,
            "player": "0xAlice",
            "oldTickets": 0,
            "newTickets": 25,
            "totalTickets": 125,
            "blockNumber": 812,
            "logIndex": 3
        }"#;

        match PositionFeedClient::parse_message(json) {
            Ok(Some(FeedEvent::Position(event))) => {
                assert_eq!(event.player, "0xAlice");
                assert_eq!(event.new_tickets, 25);
                assert_eq!(event.ordering_key(), (812, 3));
            }
            other => panic!("Expected position update, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_heartbeat_and_unknown() {
        assert!(matches!(
            PositionFeedClient::parse_message(r#"{"type":"heartbeat"}"#),
            Ok(Some(FeedEvent::Heartbeat))
        ));
        assert!(matches!(
            PositionFeedClient::parse_message("PONG"),
            Ok(Some(FeedEvent::Heartbeat))
        ));
        assert!(matches!(
            PositionFeedClient::parse_message(r#"{"type":"subscribed","seasonId":1}"#),
            Ok(None)
        ));
    }

    #[test]
    fn test_parse_error_frame() {
        let result = PositionFeedClient::parse_message(r#"{"type":"error","message":"bad season"}"#);
        assert!(matches!(result, Err(EngineError::WebSocket(m)) if m == "bad season"));
        assert!(PositionFeedClient::parse_message("not json").is_err());
    }
}
