use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;

pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let config = state.get_config();
    let uptime_seconds = state.get_uptime_seconds();

    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "service": {
            "name": "voice-relay",
            "version": env!("CARGO_PKG_VERSION"),
            "host": config.server.host,
            "port": config.server.port
        },
        "upstream": {
            "model": config.upstream.model,
            "host": config.upstream.host
        },
        "relay": {
            "active_sessions": metrics.active_sessions,
            "connections_total": metrics.connections_total,
            "frames_forwarded": metrics.frames_forwarded,
            "events": {
                "text": metrics.text_events,
                "audio": metrics.audio_events,
                "interruptions": metrics.interruptions,
                "errors": metrics.error_events
            }
        }
    }))
}
