//! # Upstream Conversational Model
//!
//! Client for the bidirectional streaming speech endpoint the relay fronts.
//! The session accepts realtime base64 PCM input and emits messages that may
//! each carry a response text fragment, a base64 audio payload, and/or an
//! interruption flag. Open, send, and close are the only operations the
//! relay needs from this collaborator.

pub mod live;
pub mod types;

pub use live::{LiveHandle, LiveSession};
pub use types::{ContentEvent, LiveEvent};
