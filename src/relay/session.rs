//! # Relay Session
//!
//! One actor per client WebSocket connection, bridging it 1:1 to an
//! upstream model session.
//!
//! ## Session Protocol:
//! 1. **Connection**: client connects to `/ws`; the actor opens exactly one
//!    upstream session with the fixed configuration
//! 2. **Inbound**: every binary message is a raw 16 kHz PCM16 frame,
//!    base64-encoded and forwarded upstream in arrival order
//! 3. **Outbound**: upstream events are fanned out to typed JSON messages,
//!    preserving upstream emission order
//! 4. **Teardown**: client disconnect closes the upstream session, and an
//!    upstream close stops the connection, whichever side ends first
//!
//! Failure to open the upstream session is fatal to the connection: the
//! client receives an `error` event and the socket is closed. Runtime
//! errors surfaced by an open session are forwarded as `error` events with
//! the connection left open.

use crate::error::{AppError, AppResult};
use crate::relay::protocol::{fan_out, ServerEvent};
use crate::state::AppState;
use crate::upstream::live::{LiveHandle, LiveSession};
use crate::upstream::types::LiveEvent;

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// How often the actor pings the client.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Connection is considered dead after this long without a pong.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(60);

/// WebSocket actor bridging one client to one upstream session.
pub struct RelaySession {
    /// Connection identity, for logs only.
    id: String,

    /// Shared application state (config + relay metrics).
    state: web::Data<AppState>,

    /// Send half of the upstream session, once it is open.
    upstream: Option<LiveHandle>,

    /// Last heartbeat seen from the client.
    last_heartbeat: Instant,
}

impl RelaySession {
    pub fn new(state: web::Data<AppState>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            state,
            upstream: None,
            last_heartbeat: Instant::now(),
        }
    }

    /// Forward one binary PCM frame upstream, frame by frame, in arrival
    /// order. Frames arriving before the upstream session is open are
    /// dropped; buffering stale real-time audio has no value.
    fn handle_audio_frame(&self, data: &[u8]) {
        match &self.upstream {
            Some(upstream) => {
                upstream.send_audio(BASE64.encode(data));
                self.state.record_frame_forwarded();
            }
            None => {
                debug!("Session {}: dropping frame, upstream not ready", self.id);
            }
        }
    }

    fn emit(&self, ctx: &mut ws::WebsocketContext<Self>, event: &ServerEvent) {
        self.state.record_outbound(event);
        ctx.text(event.to_json());
    }
}

// ── Internal actor messages ──────────────────────────────────────────────

/// Upstream session opened; audio may flow.
#[derive(Message)]
#[rtype(result = "()")]
struct UpstreamReady {
    handle: LiveHandle,
}

/// One parsed event from the upstream session.
#[derive(Message)]
#[rtype(result = "()")]
struct UpstreamMessage(LiveEvent);

/// Opening the upstream session failed; fatal to this connection.
#[derive(Message)]
#[rtype(result = "()")]
struct UpstreamFailed(String);

/// The upstream event stream ended.
#[derive(Message)]
#[rtype(result = "()")]
struct UpstreamClosed;

impl Actor for RelaySession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!("Session {}: client connected", self.id);
        self.state.session_opened();

        // Heartbeat timer
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > CLIENT_TIMEOUT {
                warn!("Session {}: heartbeat timeout, closing", act.id);
                ctx.stop();
            } else {
                ctx.ping(b"");
            }
        });

        // Open the paired upstream session off the actor thread; results
        // come back as actor messages.
        let addr = ctx.address();
        let config = self.state.get_config();
        let session_id = self.id.clone();

        tokio::spawn(async move {
            match LiveSession::connect(&config.upstream).await {
                Ok((handle, mut events)) => {
                    addr.do_send(UpstreamReady { handle });

                    while let Some(event) = events.recv().await {
                        addr.do_send(UpstreamMessage(event));
                    }
                    addr.do_send(UpstreamClosed);
                }
                Err(err) => {
                    error!("Session {}: upstream open failed: {:#}", session_id, err);
                    addr.do_send(UpstreamFailed(err.to_string()));
                }
            }
        });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        info!("Session {}: client disconnected", self.id);

        // Tear down the paired upstream session
        if let Some(upstream) = self.upstream.take() {
            upstream.close();
        }
        self.state.session_closed();
    }
}

impl Handler<UpstreamReady> for RelaySession {
    type Result = ();

    fn handle(&mut self, msg: UpstreamReady, _ctx: &mut Self::Context) {
        debug!("Session {}: upstream session ready", self.id);
        self.upstream = Some(msg.handle);
    }
}

impl Handler<UpstreamMessage> for RelaySession {
    type Result = ();

    fn handle(&mut self, msg: UpstreamMessage, ctx: &mut Self::Context) {
        match msg.0 {
            LiveEvent::SetupComplete => {
                debug!("Session {}: upstream setup complete", self.id);
            }
            LiveEvent::Content(content) => {
                for event in fan_out(&content) {
                    self.emit(ctx, &event);
                }
            }
            LiveEvent::Error(message) => {
                // Runtime failure: report it, keep the connection open
                warn!("Session {}: upstream error: {}", self.id, message);
                self.emit(ctx, &ServerEvent::Error { data: message });
            }
        }
    }
}

impl Handler<UpstreamFailed> for RelaySession {
    type Result = ();

    fn handle(&mut self, msg: UpstreamFailed, ctx: &mut Self::Context) {
        self.emit(ctx, &ServerEvent::Error { data: msg.0 });
        ctx.close(None);
        ctx.stop();
    }
}

impl Handler<UpstreamClosed> for RelaySession {
    type Result = ();

    fn handle(&mut self, _msg: UpstreamClosed, ctx: &mut Self::Context) {
        info!("Session {}: upstream session ended", self.id);
        ctx.stop();
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for RelaySession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Binary(data)) => {
                self.handle_audio_frame(&data);
            }
            Ok(ws::Message::Text(_)) => {
                // The client direction is binary-only
                warn!("Session {}: unexpected text frame from client", self.id);
            }
            Ok(ws::Message::Ping(data)) => {
                self.last_heartbeat = Instant::now();
                ctx.pong(&data);
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                info!("Session {}: client closed: {:?}", self.id, reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!("Session {}: unexpected continuation frame", self.id);
            }
            Ok(ws::Message::Nop) => {}
            Err(err) => {
                error!("Session {}: protocol error: {}", self.id, err);
                ctx.stop();
            }
        }
    }
}

/// WebSocket endpoint handler: upgrade the HTTP request and hand the
/// connection to a fresh [`RelaySession`] actor.
pub async fn relay_websocket(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    info!(
        "WebSocket connection request from {:?}",
        req.connection_info().peer_addr()
    );

    ws::start(RelaySession::new(state), &req, stream)
        .map_err(|err| AppError::BadRequest(format!("WebSocket upgrade failed: {}", err)))
}
