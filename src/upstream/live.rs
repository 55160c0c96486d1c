//! # Live Session Client
//!
//! Maintains one streaming WebSocket session with the conversational model
//! per client connection. Connecting performs the TLS handshake and sends
//! the fixed `setup` message; afterward the session is a pair of tasks:
//! a writer draining an outbound queue, and a reader parsing inbound
//! messages into [`LiveEvent`]s for the relay.
//!
//! Audio forwarding is fire-and-forget: a frame that cannot be queued
//! because the writer is saturated is dropped, the same policy the capture
//! side applies when its transport is down.

use crate::config::UpstreamConfig;
use crate::upstream::types::{LiveEvent, RealtimeInputMessage, ServerMessage, SetupMessage};

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::connect_async;
use tracing::{debug, error, info, warn};

/// Outbound queue depth; at 20ms frames this is about 1.3s of backlog.
const OUTBOUND_QUEUE_DEPTH: usize = 64;

/// Channel depth for parsed events on their way to the relay.
const EVENT_QUEUE_DEPTH: usize = 64;

/// Send half of an open session. Dropping the handle (or calling
/// [`LiveHandle::close`]) ends the session: the writer drains what is
/// queued, sends a close frame, and stops.
#[derive(Debug, Clone)]
pub struct LiveHandle {
    outbound: mpsc::Sender<Message>,
}

impl LiveHandle {
    /// Queue one base64 PCM frame as realtime audio input, preserving
    /// arrival order. Never blocks; a saturated or closed session drops
    /// the frame.
    pub fn send_audio(&self, base64_pcm: String) {
        let msg = RealtimeInputMessage::audio_frame(base64_pcm);
        let json = match serde_json::to_string(&msg) {
            Ok(json) => json,
            Err(err) => {
                error!("Failed to serialize realtime audio frame: {}", err);
                return;
            }
        };

        if self.outbound.try_send(Message::Text(json)).is_err() {
            warn!("Upstream writer saturated or closed, dropping audio frame");
        }
    }

    /// Ask the writer to close the session.
    pub fn close(&self) {
        let _ = self.outbound.try_send(Message::Close(None));
    }
}

/// One streaming session with the model endpoint.
pub struct LiveSession;

impl LiveSession {
    /// Open a session: connect, send the setup message, spawn the reader
    /// and writer tasks.
    ///
    /// Returns the send handle and the parsed-event stream. The event
    /// channel closing means the upstream session itself has ended.
    pub async fn connect(
        config: &UpstreamConfig,
    ) -> Result<(LiveHandle, mpsc::Receiver<LiveEvent>)> {
        let url = endpoint_url(&config.host, &config.api_key);

        let (stream, _response) = connect_async(url.as_str())
            .await
            .context("Failed to connect to upstream session endpoint")?;
        let (mut sink, mut source) = stream.split();

        // The setup message must be the first thing on the wire
        let setup = serde_json::to_string(&SetupMessage::from_config(config))
            .context("Failed to serialize session setup")?;
        sink.send(Message::Text(setup))
            .await
            .context("Failed to send session setup")?;

        info!("Upstream session opened for model {}", config.model);

        let (outbound_tx, mut outbound_rx) = mpsc::channel::<Message>(OUTBOUND_QUEUE_DEPTH);
        let (event_tx, event_rx) = mpsc::channel::<LiveEvent>(EVENT_QUEUE_DEPTH);

        // Writer: drain the outbound queue in order, close on shutdown
        tokio::spawn(async move {
            while let Some(msg) = outbound_rx.recv().await {
                let is_close = matches!(msg, Message::Close(_));
                if let Err(err) = sink.send(msg).await {
                    warn!("Upstream send failed: {}", err);
                    break;
                }
                if is_close {
                    break;
                }
            }
            // Handle dropped without an explicit close: say goodbye anyway
            let _ = sink.send(Message::Close(None)).await;
            debug!("Upstream writer task finished");
        });

        // Reader: parse every inbound message and forward its event
        tokio::spawn(async move {
            while let Some(item) = source.next().await {
                let event = match item {
                    Ok(Message::Text(text)) => parse_event(text.as_bytes()),
                    // The endpoint frames JSON as binary as well
                    Ok(Message::Binary(data)) => parse_event(&data),
                    Ok(Message::Close(frame)) => {
                        info!("Upstream session closed: {:?}", frame);
                        break;
                    }
                    Ok(_) => None,
                    Err(err) => {
                        error!("Upstream receive error: {}", err);
                        let _ = event_tx.send(LiveEvent::Error(err.to_string())).await;
                        break;
                    }
                };

                if let Some(event) = event {
                    if event_tx.send(event).await.is_err() {
                        // Relay side is gone; stop reading
                        break;
                    }
                }
            }
            debug!("Upstream reader task finished");
        });

        Ok((LiveHandle { outbound: outbound_tx }, event_rx))
    }
}

fn endpoint_url(host: &str, api_key: &str) -> String {
    format!(
        "wss://{}/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent?key={}",
        host, api_key
    )
}

fn parse_event(payload: &[u8]) -> Option<LiveEvent> {
    match serde_json::from_slice::<ServerMessage>(payload) {
        Ok(message) => message.into_event(),
        Err(err) => {
            warn!("Unparseable upstream message: {}", err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_url_embeds_host_and_key() {
        let url = endpoint_url("generativelanguage.googleapis.com", "secret");
        assert!(url.starts_with("wss://generativelanguage.googleapis.com/ws/"));
        assert!(url.ends_with("?key=secret"));
        assert!(url.contains("BidiGenerateContent"));
    }

    #[tokio::test]
    async fn test_audio_frames_are_queued_in_arrival_order() {
        let (tx, mut rx) = mpsc::channel::<Message>(OUTBOUND_QUEUE_DEPTH);
        let handle = LiveHandle { outbound: tx };

        // Ten 320-sample frames (20ms at 16kHz), base64-encoded
        use base64::{engine::general_purpose::STANDARD, Engine as _};
        let frames: Vec<String> = (0..10)
            .map(|i| {
                let samples = vec![i as i16; 320];
                STANDARD.encode(crate::audio::encoder::to_le_bytes(&samples))
            })
            .collect();

        for frame in &frames {
            handle.send_audio(frame.clone());
        }

        for expected in &frames {
            let msg = rx.try_recv().expect("one message per frame");
            let Message::Text(json) = msg else {
                panic!("audio frames are sent as text messages");
            };
            let value: serde_json::Value = serde_json::from_str(&json).unwrap();
            assert_eq!(value["realtimeInput"]["audio"]["data"], expected.as_str());
            assert_eq!(
                value["realtimeInput"]["audio"]["mimeType"],
                "audio/pcm;rate=16000"
            );
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_parse_event_tolerates_garbage() {
        assert_eq!(parse_event(b"not json"), None);
        assert_eq!(parse_event(br#"{"unrelated": 1}"#), None);
    }

    #[test]
    fn test_close_queues_close_frame() {
        let (tx, mut rx) = mpsc::channel::<Message>(4);
        let handle = LiveHandle { outbound: tx };
        handle.close();
        assert!(matches!(rx.try_recv().unwrap(), Message::Close(None)));
    }
}
