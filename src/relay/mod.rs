//! # Relay
//!
//! The server half of the system: a WebSocket endpoint that binds each
//! client connection 1:1 to an upstream model session, forwards inbound
//! binary PCM frames upstream, and fans the model's text/audio/interruption
//! events back to the client as typed JSON messages.

pub mod protocol;
pub mod session;

pub use protocol::{fan_out, ServerEvent};
pub use session::{relay_websocket, RelaySession};
