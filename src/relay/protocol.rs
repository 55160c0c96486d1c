//! # Transport Protocol
//!
//! Message framing between the client pipeline and the relay. The two
//! directions are deliberately asymmetric: client-to-server audio is raw
//! binary (little-endian PCM16 mono 16 kHz, no header, no framing
//! overhead), while server-to-client events are JSON with a `type`
//! discriminator, since those are heterogeneous and low-frequency compared
//! to the audio frames.

use crate::upstream::types::ContentEvent;
use serde::{Deserialize, Serialize};

/// Server-to-client event messages.
///
/// Order on the wire preserves upstream emission order for a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Incremental text delta of the model's spoken response.
    #[serde(rename = "ai-response")]
    AiResponse { text: String },

    /// Base64-encoded PCM16 mono 24 kHz audio chunk.
    #[serde(rename = "ai-audio")]
    AiAudio { data: String },

    /// The model detected the user barging in; flush playback now.
    #[serde(rename = "interrupted")]
    Interrupted,

    /// Upstream or session failure description.
    #[serde(rename = "error")]
    Error { data: String },
}

impl ServerEvent {
    /// Wire encoding of this event.
    pub fn to_json(&self) -> String {
        // The enum contains nothing that can fail to serialize
        serde_json::to_string(self).expect("serialize ServerEvent")
    }
}

/// Expand one upstream message into its outbound events.
///
/// An interruption suppresses co-present text and audio: the client is
/// about to flush its queue, so delivering content from the interrupted
/// turn would only race the flush. Otherwise text and audio are
/// independent, emitted in that order, each optional.
pub fn fan_out(event: &ContentEvent) -> Vec<ServerEvent> {
    if event.interrupted {
        return vec![ServerEvent::Interrupted];
    }

    let mut out = Vec::with_capacity(2);
    if let Some(text) = &event.text {
        out.push(ServerEvent::AiResponse { text: text.clone() });
    }
    if let Some(audio) = &event.audio {
        out.push(ServerEvent::AiAudio { data: audio.clone() });
    }
    out
}
