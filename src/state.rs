//! # Application State Management
//!
//! Shared state accessed by every connection handler: the configuration and
//! the relay metrics. Sessions own their upstream bindings exclusively, so
//! nothing here is per-session, only process-wide counters and settings
//! behind the usual `Arc<RwLock<T>>` pattern.

use crate::config::AppConfig;
use crate::relay::protocol::ServerEvent;
use std::sync::{Arc, RwLock};
use std::time::Instant;

/// Shared application state handed to every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<RwLock<AppConfig>>,

    /// Relay traffic counters.
    pub metrics: Arc<RwLock<RelayMetrics>>,

    /// When the server started.
    pub start_time: Instant,
}

/// Traffic counters across all relay sessions.
#[derive(Debug, Default, Clone)]
pub struct RelayMetrics {
    /// Client connections accepted since start.
    pub connections_total: u64,

    /// Currently connected clients.
    pub active_sessions: u32,

    /// Binary audio frames forwarded upstream.
    pub frames_forwarded: u64,

    /// Text deltas sent to clients.
    pub text_events: u64,

    /// Audio chunks sent to clients.
    pub audio_events: u64,

    /// Interruption signals sent to clients.
    pub interruptions: u64,

    /// Error events sent to clients.
    pub error_events: u64,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            metrics: Arc::new(RwLock::new(RelayMetrics::default())),
            start_time: Instant::now(),
        }
    }

    /// Get a copy of the current configuration.
    ///
    /// Cloning releases the read lock immediately; AppConfig is cheap to
    /// clone.
    pub fn get_config(&self) -> AppConfig {
        self.config.read().unwrap().clone()
    }

    /// Record a new client connection.
    pub fn session_opened(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.connections_total += 1;
        metrics.active_sessions += 1;
    }

    /// Record a client disconnect. Guarded against underflow so a double
    /// teardown cannot panic.
    pub fn session_closed(&self) {
        let mut metrics = self.metrics.write().unwrap();
        if metrics.active_sessions > 0 {
            metrics.active_sessions -= 1;
        }
    }

    /// Record one inbound audio frame forwarded upstream.
    pub fn record_frame_forwarded(&self) {
        self.metrics.write().unwrap().frames_forwarded += 1;
    }

    /// Record one outbound event by kind.
    pub fn record_outbound(&self, event: &ServerEvent) {
        let mut metrics = self.metrics.write().unwrap();
        match event {
            ServerEvent::AiResponse { .. } => metrics.text_events += 1,
            ServerEvent::AiAudio { .. } => metrics.audio_events += 1,
            ServerEvent::Interrupted => metrics.interruptions += 1,
            ServerEvent::Error { .. } => metrics.error_events += 1,
        }
    }

    /// Consistent snapshot of the counters for the health endpoint.
    pub fn get_metrics_snapshot(&self) -> RelayMetrics {
        self.metrics.read().unwrap().clone()
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_counters() {
        let state = AppState::new(AppConfig::default());

        state.session_opened();
        state.session_opened();
        state.session_closed();

        let snapshot = state.get_metrics_snapshot();
        assert_eq!(snapshot.connections_total, 2);
        assert_eq!(snapshot.active_sessions, 1);
    }

    #[test]
    fn test_session_close_does_not_underflow() {
        let state = AppState::new(AppConfig::default());
        state.session_closed();
        assert_eq!(state.get_metrics_snapshot().active_sessions, 0);
    }

    #[test]
    fn test_outbound_events_counted_by_kind() {
        let state = AppState::new(AppConfig::default());

        state.record_outbound(&ServerEvent::AiResponse { text: "t".to_string() });
        state.record_outbound(&ServerEvent::AiAudio { data: "a".to_string() });
        state.record_outbound(&ServerEvent::AiAudio { data: "b".to_string() });
        state.record_outbound(&ServerEvent::Interrupted);
        state.record_frame_forwarded();

        let snapshot = state.get_metrics_snapshot();
        assert_eq!(snapshot.text_events, 1);
        assert_eq!(snapshot.audio_events, 2);
        assert_eq!(snapshot.interruptions, 1);
        assert_eq!(snapshot.error_events, 0);
        assert_eq!(snapshot.frames_forwarded, 1);
    }
}
