//! # Configuration Management
//!
//! Loads application configuration from layered sources:
//! - Default values (built into the code)
//! - TOML configuration file (config.toml, optional)
//! - Environment variables (with APP_ prefix)
//! - Special-cased deployment variables: `HOST`, `PORT`, `GEMINI_API_KEY`
//!
//! The process surface is deliberately tiny: the only required setting is
//! the upstream API credential, and a missing credential fails validation
//! at startup.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub audio: AudioSettings,
}

/// HTTP/WebSocket server bind settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Upstream conversational model session settings.
///
/// The speech-boundary parameters are tuning constants carried over from
/// the deployed defaults; they are configurable here rather than baked in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// API credential. Empty means unconfigured, which is fatal at startup.
    pub api_key: String,

    /// Endpoint host for the streaming session.
    pub host: String,

    /// Model identifier requested in the session setup.
    pub model: String,

    /// Domain-restricting system instruction for the assistant.
    pub system_instruction: String,

    /// Start-of-speech detection sensitivity.
    pub start_sensitivity: String,

    /// End-of-speech detection sensitivity.
    pub end_sensitivity: String,

    /// Padding before a confirmed speech start, in milliseconds.
    pub prefix_padding_ms: u32,

    /// Silence needed to confirm end of speech, in milliseconds.
    pub silence_duration_ms: u32,
}

/// Client-side pipeline tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioSettings {
    /// Capture rate, Hz. The wire format is PCM16 mono at this rate.
    pub capture_sample_rate: u32,

    /// Playback rate, Hz. Fixed by the upstream response format.
    pub playback_sample_rate: u32,

    /// RMS threshold above which a capture frame counts as speech.
    pub vad_threshold: f32,

    /// Safety lead applied when playback starts from idle, milliseconds.
    pub playback_lead_ms: u32,

    /// Frame size of the low-latency capture strategy, in samples.
    pub preferred_frame_len: usize,

    /// Frame size of the fallback capture strategy, in samples.
    pub fallback_frame_len: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
            },
            upstream: UpstreamConfig {
                api_key: String::new(),
                host: "generativelanguage.googleapis.com".to_string(),
                model: "models/gemini-2.5-flash-preview-native-audio-dialog".to_string(),
                system_instruction: "You are a helpful and friendly voice assistant. \
                                     Respond concisely and stay on topic."
                    .to_string(),
                start_sensitivity: "START_SENSITIVITY_HIGH".to_string(),
                end_sensitivity: "END_SENSITIVITY_HIGH".to_string(),
                prefix_padding_ms: 20,
                silence_duration_ms: 200,
            },
            audio: AudioSettings {
                capture_sample_rate: 16_000,
                playback_sample_rate: 24_000,
                vad_threshold: 0.01,
                playback_lead_ms: 10,
                preferred_frame_len: 128,
                fallback_frame_len: 4096,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from all sources in priority order.
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER_HOST=127.0.0.1`: override the bind host
    /// - `PORT=8080`: deployment-platform port override
    /// - `GEMINI_API_KEY=...`: the upstream credential
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("_"));

        // Deployment platforms and the original deployment use these names
        // without the APP_ prefix
        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }
        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }
        if let Ok(api_key) = env::var("GEMINI_API_KEY") {
            settings = settings.set_override("upstream.api_key", api_key)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration can actually run.
    ///
    /// The missing-credential case is the only configuration error the
    /// process treats as fatal; everything else has a workable default.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.upstream.api_key.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "Missing GEMINI_API_KEY: set it in the environment or .env file"
            ));
        }

        if self.upstream.model.is_empty() {
            return Err(anyhow::anyhow!("Upstream model cannot be empty"));
        }

        if self.audio.capture_sample_rate == 0 || self.audio.playback_sample_rate == 0 {
            return Err(anyhow::anyhow!("Sample rates must be greater than 0"));
        }

        if self.audio.vad_threshold <= 0.0 {
            return Err(anyhow::anyhow!("VAD threshold must be greater than 0"));
        }

        if self.audio.preferred_frame_len == 0 || self.audio.fallback_frame_len == 0 {
            return Err(anyhow::anyhow!("Capture frame sizes must be greater than 0"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.audio.capture_sample_rate, 16_000);
        assert_eq!(config.audio.playback_sample_rate, 24_000);
        assert_eq!(config.audio.vad_threshold, 0.01);
    }

    #[test]
    fn test_missing_api_key_is_fatal() {
        let config = AppConfig::default();
        // The default has no credential and must not validate
        assert!(config.validate().is_err());

        let mut configured = config;
        configured.upstream.api_key = "test-key".to_string();
        assert!(configured.validate().is_ok());
    }

    #[test]
    fn test_config_validation_bounds() {
        let mut config = AppConfig::default();
        config.upstream.api_key = "test-key".to_string();

        config.server.port = 0;
        assert!(config.validate().is_err());
        config.server.port = 3000;

        config.audio.vad_threshold = 0.0;
        assert!(config.validate().is_err());
        config.audio.vad_threshold = 0.01;

        config.audio.fallback_frame_len = 0;
        assert!(config.validate().is_err());
    }
}
