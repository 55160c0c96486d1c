//! # Voice Client - Headless Reference Client
//!
//! Drives the full client pipeline against a running relay without audio
//! hardware: a 16 kHz mono WAV file stands in for the microphone, frames
//! flow through VAD and the PCM encoder onto the WebSocket, and the JSON
//! event stream coming back is scheduled for playback on a wall clock.
//! Both interruption paths are live: locally detected speech flushes the
//! playback queue with no server round-trip, and a server `interrupted`
//! event does the same.
//!
//! ## Usage:
//! ```text
//! voice-client <audio.wav>
//! ```
//! The relay endpoint defaults to `ws://127.0.0.1:3000/ws` and can be
//! overridden with `VOICE_RELAY_URL`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use futures_util::{SinkExt, StreamExt};
use std::io::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{error, info, warn};

use voice_relay::audio::{
    probe_capture_source, AudioInput, CaptureEvent, CapturePipeline, EnergyVad, FrameSink,
    MonotonicClock, OutputClock, PcmChunk, PlaybackScheduler, PlaybackState, RenderStart,
};
use voice_relay::config::AppConfig;
use voice_relay::relay::protocol::ServerEvent;

/// Samples per simulated device buffer (32ms at 16 kHz).
const DEVICE_BUFFER_LEN: usize = 512;

/// Microphone stand-in: streams a WAV file's samples at real-time pace in
/// device-sized buffers.
struct WavInput {
    samples: Vec<f32>,
    sample_rate: u32,
}

#[async_trait]
impl AudioInput for WavInput {
    async fn open(&mut self) -> Result<mpsc::Receiver<Vec<f32>>, String> {
        let (tx, rx) = mpsc::channel(64);
        let samples = std::mem::take(&mut self.samples);
        let pace = Duration::from_secs_f64(DEVICE_BUFFER_LEN as f64 / self.sample_rate as f64);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(pace);
            for buffer in samples.chunks(DEVICE_BUFFER_LEN) {
                ticker.tick().await;
                if tx.send(buffer.to_vec()).await.is_err() {
                    break;
                }
            }
        });

        Ok(rx)
    }

    fn low_latency(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "wav-file"
    }
}

/// Transport send half handed to the capture pipeline: fire-and-forget
/// frames into the socket writer's queue, dropped once the socket is down.
#[derive(Clone)]
struct SocketSink {
    frames: mpsc::UnboundedSender<Vec<u8>>,
    open: Arc<AtomicBool>,
}

impl FrameSink for SocketSink {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn send(&self, frame: Vec<u8>) {
        let _ = self.frames.send(frame);
    }
}

/// Commands driving the playback task.
enum PlayerCommand {
    Enqueue(PcmChunk),
    Ended(u64),
    Flush,
}

/// Own the scheduler and simulate rendering: each scheduled chunk becomes
/// a timer that fires the chunk-end event at its scheduled end. A flush
/// aborts the active timer, which is the hard stop.
async fn run_player(
    mut commands: mpsc::UnboundedReceiver<PlayerCommand>,
    feedback: mpsc::UnboundedSender<PlayerCommand>,
    sample_rate: u32,
    lead_ms: u32,
) {
    let clock = MonotonicClock::start();
    let mut scheduler = PlaybackScheduler::new(clock, sample_rate, lead_ms);
    let mut active_render: Option<JoinHandle<()>> = None;

    while let Some(command) = commands.recv().await {
        match command {
            PlayerCommand::Enqueue(chunk) => {
                if let Some(render) = scheduler.enqueue(chunk) {
                    active_render = Some(spawn_render(render, clock, feedback.clone()));
                }
            }
            PlayerCommand::Ended(epoch) => match scheduler.chunk_ended(epoch) {
                Some(render) => {
                    active_render = Some(spawn_render(render, clock, feedback.clone()));
                }
                None => {
                    if scheduler.state() == PlaybackState::Idle {
                        active_render = None;
                        info!("Playback idle, listening");
                    }
                }
            },
            PlayerCommand::Flush => {
                if scheduler.flush() {
                    if let Some(render) = active_render.take() {
                        render.abort();
                    }
                    info!("Playback flushed");
                }
            }
        }
    }
}

fn spawn_render(
    render: RenderStart,
    clock: MonotonicClock,
    feedback: mpsc::UnboundedSender<PlayerCommand>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let wait = (render.end - clock.now()).max(0.0);
        tokio::time::sleep(Duration::from_secs_f64(wait)).await;
        let _ = feedback.send(PlayerCommand::Ended(render.epoch));
    })
}

fn load_wav(path: &str) -> Result<(Vec<f32>, u32)> {
    let mut file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open WAV file: {}", path))?;
    let (header, data) = wav::read(&mut file).context("Failed to parse WAV file")?;

    anyhow::ensure!(
        header.channel_count == 1,
        "Capture input must be mono, got {} channels",
        header.channel_count
    );

    let samples = match data {
        wav::BitDepth::Sixteen(samples) => samples,
        other => anyhow::bail!("Capture input must be 16-bit PCM, got {:?}", other),
    };

    let floats = voice_relay::audio::encoder::pcm16_to_f32(&samples);
    Ok((floats, header.sampling_rate))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let wav_path = std::env::args()
        .nth(1)
        .context("Usage: voice-client <audio.wav>")?;
    let url = std::env::var("VOICE_RELAY_URL")
        .unwrap_or_else(|_| "ws://127.0.0.1:3000/ws".to_string());

    let settings = AppConfig::default().audio;

    let (samples, sample_rate) = load_wav(&wav_path)?;
    anyhow::ensure!(
        sample_rate == settings.capture_sample_rate,
        "Capture input must be {} Hz, got {} Hz",
        settings.capture_sample_rate,
        sample_rate
    );
    info!(
        "Loaded {} ({:.1}s of audio)",
        wav_path,
        samples.len() as f64 / sample_rate as f64
    );

    let (stream, _response) = connect_async(url.as_str())
        .await
        .with_context(|| format!("Failed to connect to relay at {}", url))?;
    info!("Connected to {}", url);
    let (mut socket_sink, mut socket_stream) = stream.split();

    // Socket writer: drains encoded capture frames in order
    let open = Arc::new(AtomicBool::new(true));
    let (frame_tx, mut frame_rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let writer_open = open.clone();
    tokio::spawn(async move {
        while let Some(frame) = frame_rx.recv().await {
            if let Err(err) = socket_sink.send(Message::Binary(frame)).await {
                warn!("Socket send failed: {}", err);
                writer_open.store(false, Ordering::SeqCst);
                break;
            }
        }
    });

    // Playback task
    let (player_tx, player_rx) = mpsc::unbounded_channel();
    tokio::spawn(run_player(
        player_rx,
        player_tx.clone(),
        settings.playback_sample_rate,
        settings.playback_lead_ms,
    ));

    // Capture pipeline: VAD + encode + send, with the local interruption
    // short-circuit wired straight to the playback task
    let (vad_tx, mut vad_rx) = mpsc::unbounded_channel();
    let vad_player = player_tx.clone();
    tokio::spawn(async move {
        while let Some(CaptureEvent::SpeechActive) = vad_rx.recv().await {
            let _ = vad_player.send(PlayerCommand::Flush);
        }
    });

    let sink = SocketSink { frames: frame_tx, open: open.clone() };
    let pipeline = CapturePipeline::new(EnergyVad::new(settings.vad_threshold), sink, vad_tx);

    let input = Box::new(WavInput { samples, sample_rate });
    let mut source = probe_capture_source(
        input,
        settings.preferred_frame_len,
        settings.fallback_frame_len,
    );
    let frames = source
        .start()
        .await
        .map_err(|err| anyhow::anyhow!("Failed to start capture: {}", err))?;
    tokio::spawn(async move { pipeline.run(frames).await });

    // Event loop: relay the server's JSON events into playback and stdout
    while let Some(message) = socket_stream.next().await {
        match message {
            Ok(Message::Text(text)) => match serde_json::from_str::<ServerEvent>(&text) {
                Ok(ServerEvent::AiResponse { text }) => {
                    print!("{}", text);
                    std::io::stdout().flush().ok();
                }
                Ok(ServerEvent::AiAudio { data }) => {
                    match BASE64
                        .decode(&data)
                        .map_err(|err| err.to_string())
                        .and_then(|bytes| voice_relay::audio::encoder::from_le_bytes(&bytes))
                    {
                        Ok(samples) => {
                            let _ = player_tx.send(PlayerCommand::Enqueue(PcmChunk::new(samples)));
                        }
                        Err(err) => warn!("Undecodable audio chunk: {}", err),
                    }
                }
                Ok(ServerEvent::Interrupted) => {
                    let _ = player_tx.send(PlayerCommand::Flush);
                }
                Ok(ServerEvent::Error { data }) => {
                    error!("Relay error: {}", data);
                }
                Err(err) => warn!("Unparseable event from relay: {}", err),
            },
            Ok(Message::Close(_)) => {
                info!("Relay closed the connection");
                break;
            }
            Ok(_) => {}
            Err(err) => {
                error!("Socket error: {}", err);
                break;
            }
        }
    }

    // Transport is gone: tear down audio locally without another close
    open.store(false, Ordering::SeqCst);
    source.stop();
    let _ = player_tx.send(PlayerCommand::Flush);

    Ok(())
}
