// ============================
// location-core/src/realtime/appwrite.rs
// ============================
//! Websocket client for the backend's realtime endpoint.
//!
//! Channels are fixed at connect time through the query string. After the
//! socket opens, an optional session frame authenticates the connection and
//! a JSON ping keeps it alive.
//!
//! # Network Resilience
//! A dropped connection is re-established with exponential backoff, up to
//! `max_reconnect_attempts` consecutive failures. Events sent while the
//! socket was down are not replayed; a [`FeedMessage::Gap`] after each
//! reconnect tells the consumer to resync. Giving up closes the subscription.
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use headpat_common::RawRealtimeEvent;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::{self, Duration, Instant};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use super::{FeedMessage, RealtimeFeed, Subscription};
use crate::config::RealtimeSettings;
use crate::error::RealtimeError;

const SUBSCRIPTION_BUFFER: usize = 64;

/// Frames sent by the server
#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub(crate) enum InboundFrame {
    Connected(serde_json::Value),
    Event(RawRealtimeEvent),
    Error(ErrorFrame),
    Response(serde_json::Value),
    Pong,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorFrame {
    #[serde(default)]
    pub code: u16,
    pub message: String,
}

pub(crate) fn decode_frame(text: &str) -> Result<InboundFrame, serde_json::Error> {
    serde_json::from_str(text)
}

fn authentication_frame(session: &str) -> String {
    serde_json::json!({ "type": "authentication", "data": { "session": session } }).to_string()
}

fn ping_frame() -> String {
    serde_json::json!({ "type": "ping" }).to_string()
}

/// Realtime feed backed by the hosted websocket endpoint
#[derive(Debug, Clone)]
pub struct AppwriteRealtime {
    settings: RealtimeSettings,
    session: Option<String>,
}

impl AppwriteRealtime {
    pub fn new(settings: RealtimeSettings) -> Self {
        Self {
            settings,
            session: None,
        }
    }

    /// Authenticate the socket with a session secret after connecting
    pub fn with_session(mut self, session: impl Into<String>) -> Self {
        self.session = Some(session.into());
        self
    }

    /// Websocket URL for `channels`
    pub fn socket_url(&self, channels: &[String]) -> Result<String, RealtimeError> {
        if channels.is_empty() {
            return Err(RealtimeError::Protocol("no channels requested".to_string()));
        }

        let endpoint = self.settings.endpoint.trim_end_matches('/');
        let base = if let Some(rest) = endpoint.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = endpoint.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            return Err(RealtimeError::Connect(format!(
                "unsupported endpoint scheme: {endpoint}"
            )));
        };

        let mut url = format!("{base}/realtime?project={}", self.settings.project_id);
        for channel in channels {
            let safe = channel
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '*'));
            if !safe {
                return Err(RealtimeError::Protocol(format!("invalid channel name: {channel}")));
            }
            url.push_str("&channels%5B%5D=");
            url.push_str(channel);
        }
        Ok(url)
    }

    fn reconnect_delay(&self, attempt: u8) -> Duration {
        let factor = 1u64 << u32::from(attempt.saturating_sub(1)).min(16);
        Duration::from_millis(self.settings.reconnect_delay_ms.saturating_mul(factor))
    }

    async fn run(self, url: String, tx: mpsc::Sender<FeedMessage>) {
        let mut attempts: u8 = 0;
        let mut connected_before = false;

        loop {
            match connect_async(url.as_str()).await {
                Ok((socket, _)) => {
                    info!("realtime socket connected");
                    attempts = 0;
                    if connected_before {
                        // Whatever changed while the socket was down is lost.
                        debug!("realtime socket reconnected, signalling gap");
                        if tx.send(FeedMessage::Gap).await.is_err() {
                            return;
                        }
                    }
                    connected_before = true;
                    match self.pump(socket, &tx).await {
                        Ok(()) => {
                            debug!("realtime subscriber gone, closing socket");
                            return;
                        },
                        Err(e) => warn!(error = %e, "realtime connection lost"),
                    }
                },
                Err(e) => warn!(error = %e, "realtime connect failed"),
            }

            attempts = attempts.saturating_add(1);
            if attempts > self.settings.max_reconnect_attempts {
                error!(attempts, "giving up on realtime connection, closing subscription");
                return;
            }

            let delay = self.reconnect_delay(attempts);
            debug!(attempts, ?delay, "reconnecting realtime socket");
            time::sleep(delay).await;
        }
    }

    /// Forward events until the subscriber goes away (`Ok`) or the socket fails
    async fn pump<S>(
        &self,
        socket: tokio_tungstenite::WebSocketStream<S>,
        tx: &mpsc::Sender<FeedMessage>,
    ) -> Result<(), RealtimeError>
    where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
    {
        let (mut sink, mut stream) = socket.split();

        if let Some(session) = &self.session {
            sink.send(Message::Text(authentication_frame(session).into()))
                .await
                .map_err(|e| RealtimeError::Connect(e.to_string()))?;
        }

        let period = Duration::from_secs(self.settings.heartbeat_secs);
        let mut heartbeat = time::interval_at(Instant::now() + period, period);

        loop {
            tokio::select! {
                _ = tx.closed() => return Ok(()),
                _ = heartbeat.tick() => {
                    sink.send(Message::Text(ping_frame().into()))
                        .await
                        .map_err(|e| RealtimeError::Connect(e.to_string()))?;
                }
                incoming = stream.next() => match incoming {
                    Some(Ok(Message::Text(text))) => match decode_frame(text.as_str()) {
                        Ok(InboundFrame::Event(event)) => {
                            if tx.send(FeedMessage::Event(event)).await.is_err() {
                                return Ok(());
                            }
                        },
                        Ok(InboundFrame::Error(frame)) => {
                            warn!(code = frame.code, message = %frame.message, "realtime error frame");
                        },
                        Ok(InboundFrame::Connected(_)) => debug!("realtime subscription acknowledged"),
                        Ok(InboundFrame::Response(data)) => debug!(%data, "realtime response"),
                        Ok(InboundFrame::Pong) => {},
                        Err(e) => debug!(error = %e, "ignoring undecodable realtime frame"),
                    },
                    Some(Ok(Message::Close(_))) | None => return Err(RealtimeError::Closed),
                    Some(Ok(_)) => {},
                    Some(Err(e)) => return Err(RealtimeError::Protocol(e.to_string())),
                },
            }
        }
    }
}

#[async_trait]
impl RealtimeFeed for AppwriteRealtime {
    async fn subscribe(&self, channels: Vec<String>) -> Result<Subscription, RealtimeError> {
        let url = self.socket_url(&channels)?;
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let pump = tokio::spawn(self.clone().run(url, tx));
        Ok(Subscription::new(rx, pump))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> AppwriteRealtime {
        AppwriteRealtime::new(RealtimeSettings {
            endpoint: "https://api.example.com/v1/".to_string(),
            project_id: "proj".to_string(),
            heartbeat_secs: 20,
            max_reconnect_attempts: 3,
            reconnect_delay_ms: 100,
        })
    }

    #[test]
    fn test_socket_url() {
        let url = client()
            .socket_url(&["databases.hp_db.collections.locations.documents".to_string()])
            .unwrap();
        assert_eq!(
            url,
            "wss://api.example.com/v1/realtime?project=proj&channels%5B%5D=databases.hp_db.collections.locations.documents"
        );
    }

    #[test]
    fn test_socket_url_rejects_bad_channels() {
        assert!(client().socket_url(&[]).is_err());
        assert!(client().socket_url(&["a&b".to_string()]).is_err());
    }

    #[test]
    fn test_reconnect_delay_doubles() {
        let client = client();
        assert_eq!(client.reconnect_delay(1), Duration::from_millis(100));
        assert_eq!(client.reconnect_delay(2), Duration::from_millis(200));
        assert_eq!(client.reconnect_delay(4), Duration::from_millis(800));
    }

    #[test]
    fn test_decode_event_frame() {
        let text = r#"{
            "type": "event",
            "data": {
                "events": ["databases.hp_db.collections.locations.documents.alice.update"],
                "channels": ["databases.hp_db.collections.locations.documents"],
                "timestamp": "2024-05-01 10:00:00.000",
                "payload": { "$id": "alice", "lat": 1.0, "long": 2.0 }
            }
        }"#;
        match decode_frame(text).unwrap() {
            InboundFrame::Event(event) => {
                assert_eq!(event.events.len(), 1);
                assert_eq!(event.payload["$id"], "alice");
            },
            other => panic!("Wrong frame: {other:?}"),
        }
    }

    #[test]
    fn test_decode_control_frames() {
        assert!(matches!(decode_frame(r#"{"type":"pong"}"#), Ok(InboundFrame::Pong)));
        assert!(matches!(
            decode_frame(r#"{"type":"connected","data":{"channels":[],"user":null}}"#),
            Ok(InboundFrame::Connected(_))
        ));
        match decode_frame(r#"{"type":"error","data":{"code":1008,"message":"Missing channels"}}"#) {
            Ok(InboundFrame::Error(frame)) => {
                assert_eq!(frame.code, 1008);
                assert_eq!(frame.message, "Missing channels");
            },
            other => panic!("Wrong frame: {other:?}"),
        }
        assert!(decode_frame(r#"{"type":"mystery"}"#).is_err());
    }

    #[test]
    fn test_outbound_frames() {
        let auth: serde_json::Value = serde_json::from_str(&authentication_frame("secret")).unwrap();
        assert_eq!(auth["type"], "authentication");
        assert_eq!(auth["data"]["session"], "secret");
        let ping: serde_json::Value = serde_json::from_str(&ping_frame()).unwrap();
        assert_eq!(ping["type"], "ping");
    }
}
