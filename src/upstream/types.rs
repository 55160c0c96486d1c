//! # Upstream Wire Format
//!
//! Serde types for the streaming session protocol: one `setup` message on
//! connect, `realtimeInput` messages carrying base64 PCM upstream, and
//! `serverContent` messages coming back. Parsing collapses each inbound
//! message into a [`LiveEvent`] so the relay never touches raw JSON.

use crate::config::UpstreamConfig;
use serde::{Deserialize, Serialize};

/// Mime type declared on every realtime audio frame.
pub const REALTIME_AUDIO_MIME: &str = "audio/pcm;rate=16000";

// ── Outbound ─────────────────────────────────────────────────────────────

/// First message on a fresh session: model choice, response modality,
/// speech-boundary detection tuning, and the system instruction.
#[derive(Debug, Clone, Serialize)]
pub struct SetupMessage {
    pub setup: Setup,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    pub model: String,
    pub generation_config: GenerationConfig,
    pub system_instruction: Content,
    pub realtime_input_config: RealtimeInputConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInputConfig {
    pub automatic_activity_detection: AutomaticActivityDetection,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomaticActivityDetection {
    pub start_of_speech_sensitivity: String,
    pub end_of_speech_sensitivity: String,
    pub prefix_padding_ms: u32,
    pub silence_duration_ms: u32,
}

impl SetupMessage {
    /// Build the fixed session configuration from the relay's settings.
    pub fn from_config(upstream: &UpstreamConfig) -> Self {
        Self {
            setup: Setup {
                model: upstream.model.clone(),
                generation_config: GenerationConfig {
                    response_modalities: vec!["AUDIO".to_string()],
                },
                system_instruction: Content {
                    parts: vec![Part {
                        text: Some(upstream.system_instruction.clone()),
                        inline_data: None,
                    }],
                },
                realtime_input_config: RealtimeInputConfig {
                    automatic_activity_detection: AutomaticActivityDetection {
                        start_of_speech_sensitivity: upstream.start_sensitivity.clone(),
                        end_of_speech_sensitivity: upstream.end_sensitivity.clone(),
                        prefix_padding_ms: upstream.prefix_padding_ms,
                        silence_duration_ms: upstream.silence_duration_ms,
                    },
                },
            },
        }
    }
}

/// One realtime audio frame on its way upstream.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInputMessage {
    pub realtime_input: RealtimeInput,
}

#[derive(Debug, Clone, Serialize)]
pub struct RealtimeInput {
    pub audio: AudioBlob,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioBlob {
    pub data: String,
    pub mime_type: String,
}

impl RealtimeInputMessage {
    pub fn audio_frame(base64_pcm: String) -> Self {
        Self {
            realtime_input: RealtimeInput {
                audio: AudioBlob {
                    data: base64_pcm,
                    mime_type: REALTIME_AUDIO_MIME.to_string(),
                },
            },
        }
    }
}

// ── Inbound ──────────────────────────────────────────────────────────────

/// Raw inbound session message; only the fields the relay consumes.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    pub setup_complete: Option<serde_json::Value>,
    pub server_content: Option<ServerContent>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    pub model_turn: Option<Content>,
    #[serde(default)]
    pub interrupted: bool,
    #[serde(default)]
    pub turn_complete: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    pub data: String,
}

/// Model output extracted from one inbound message. Text, audio, and the
/// interruption flag are independent; any subset may be present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentEvent {
    pub text: Option<String>,
    pub audio: Option<String>,
    pub interrupted: bool,
}

/// Parsed upstream session event as the relay consumes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveEvent {
    /// Session handshake acknowledged; realtime input may flow.
    SetupComplete,
    /// Model output for the current turn.
    Content(ContentEvent),
    /// Runtime error surfaced by the session.
    Error(String),
}

impl ServerMessage {
    /// Collapse a raw message into the event the relay cares about.
    ///
    /// Returns `None` for messages carrying nothing the relay consumes
    /// (e.g. a bare turn-complete marker).
    pub fn into_event(self) -> Option<LiveEvent> {
        if self.setup_complete.is_some() {
            return Some(LiveEvent::SetupComplete);
        }

        let content = self.server_content?;
        let mut event = ContentEvent {
            interrupted: content.interrupted,
            ..ContentEvent::default()
        };

        if let Some(turn) = content.model_turn {
            event.text = turn.parts.iter().find_map(|p| p.text.clone());
            event.audio = turn
                .parts
                .iter()
                .find_map(|p| p.inline_data.as_ref().map(|d| d.data.clone()));
        }

        if event.text.is_none() && event.audio.is_none() && !event.interrupted {
            return None;
        }

        Some(LiveEvent::Content(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    #[test]
    fn test_setup_message_wire_shape() {
        let config = AppConfig::default();
        let json = serde_json::to_value(SetupMessage::from_config(&config.upstream)).unwrap();

        assert_eq!(
            json["setup"]["generationConfig"]["responseModalities"],
            serde_json::json!(["AUDIO"])
        );
        let vad = &json["setup"]["realtimeInputConfig"]["automaticActivityDetection"];
        assert_eq!(vad["startOfSpeechSensitivity"], "START_SENSITIVITY_HIGH");
        assert_eq!(vad["endOfSpeechSensitivity"], "END_SENSITIVITY_HIGH");
        assert_eq!(vad["prefixPaddingMs"], 20);
        assert_eq!(vad["silenceDurationMs"], 200);
        assert!(json["setup"]["systemInstruction"]["parts"][0]["text"]
            .as_str()
            .unwrap()
            .contains("voice assistant"));
    }

    #[test]
    fn test_realtime_input_wire_shape() {
        let msg = RealtimeInputMessage::audio_frame("AAAA".to_string());
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(
            json,
            r#"{"realtimeInput":{"audio":{"data":"AAAA","mimeType":"audio/pcm;rate=16000"}}}"#
        );
    }

    #[test]
    fn test_parse_content_with_text_audio_and_interrupt() {
        let raw = r#"{
            "serverContent": {
                "modelTurn": {
                    "parts": [
                        {"text": "hello"},
                        {"inlineData": {"mimeType": "audio/pcm;rate=24000", "data": "AAAA"}}
                    ]
                },
                "interrupted": true
            }
        }"#;
        let msg: ServerMessage = serde_json::from_str(raw).unwrap();
        let event = msg.into_event().unwrap();

        assert_eq!(
            event,
            LiveEvent::Content(ContentEvent {
                text: Some("hello".to_string()),
                audio: Some("AAAA".to_string()),
                interrupted: true,
            })
        );
    }

    #[test]
    fn test_parse_setup_complete() {
        let msg: ServerMessage = serde_json::from_str(r#"{"setupComplete": {}}"#).unwrap();
        assert_eq!(msg.into_event(), Some(LiveEvent::SetupComplete));
    }

    #[test]
    fn test_bare_turn_complete_yields_nothing() {
        let msg: ServerMessage =
            serde_json::from_str(r#"{"serverContent": {"turnComplete": true}}"#).unwrap();
        assert_eq!(msg.into_event(), None);
    }

    #[test]
    fn test_mime_matches_default_capture_rate() {
        let config = AppConfig::default();
        assert_eq!(
            REALTIME_AUDIO_MIME,
            format!("audio/pcm;rate={}", config.audio.capture_sample_rate)
        );
    }
}
