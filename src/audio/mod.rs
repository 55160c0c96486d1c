//! # Client-Side Audio Pipeline
//!
//! Implements the capture half and the playback half of the voice session.
//! The capture half turns a continuous microphone stream into encoded PCM16
//! frames and per-frame voice-activity signals; the playback half schedules
//! decoded PCM chunks for gap-free rendering and supports instant flush.
//!
//! ## Key Components:
//! - **Encoder**: float samples to 16-bit PCM, plus the little-endian byte seam
//! - **VAD**: single-pass RMS energy detector, one signal per triggering frame
//! - **Capture Pipeline**: frame-producer strategies + per-frame VAD/encode/send
//! - **Playback Scheduler**: {Idle, Rendering} state machine over an output clock
//!
//! ## Audio Format:
//! - **Capture**: 16 kHz, mono, f32 in [-1.0, 1.0] from the device, PCM16 on the wire
//! - **Playback**: 24 kHz, mono, PCM16 little-endian (fixed by protocol)

pub mod capture;      // Capture sources, probe, and the per-frame pipeline
pub mod encoder;      // PCM16 encoding and byte conversion
pub mod playback;     // Playback queue scheduling and flush
pub mod vad;          // Energy-based voice activity detection

pub use capture::{
    probe_capture_source, AudioInput, CaptureEvent, CapturePipeline, CaptureSource,
    FrameDisposition, FrameSink,
};
pub use encoder::encode_pcm16;
pub use playback::{
    MonotonicClock, OutputClock, PcmChunk, PlaybackScheduler, PlaybackState, RenderStart,
};
pub use vad::EnergyVad;
