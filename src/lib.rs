pub mod audio;
pub mod config;
pub mod error;
pub mod health;
pub mod relay;
pub mod state;
pub mod upstream;

pub use audio::{
    encode_pcm16, CaptureEvent, CapturePipeline, CaptureSource, EnergyVad, FrameSink,
    MonotonicClock, OutputClock, PcmChunk, PlaybackScheduler, PlaybackState, RenderStart,
};
pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use relay::protocol::ServerEvent;
pub use state::AppState;
