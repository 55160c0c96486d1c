//! # Capture Pipeline
//!
//! Owns the microphone side of a voice session: a capture source delivers
//! fixed-length float frames at 16 kHz mono, and every frame is run through
//! VAD and the PCM encoder before being handed to the transport.
//!
//! ## Capture Strategies:
//! Two sources implement one frame-producer interface. The low-latency
//! source forwards the device's native small frames as they arrive; the
//! buffered fallback accumulates the same stream into larger fixed frames,
//! functionally identical in encoding behavior but with higher latency.
//! `probe_capture_source` selects between them once at initialization
//! instead of catching a failure mid-stream.
//!
//! ## Frame Policy:
//! Per-frame work is synchronous and transmission is fire-and-forget. A
//! frame that arrives while the transport is down is dropped; stale
//! real-time audio has no retry value.

use crate::audio::encoder;
use crate::audio::vad::EnergyVad;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Channel depth between a capture source and the pipeline loop.
const FRAME_CHANNEL_DEPTH: usize = 64;

/// The underlying audio device: a continuous stream of f32 sample buffers
/// at the capture rate, in whatever buffer sizes the platform produces.
#[async_trait]
pub trait AudioInput: Send {
    /// Open the device and start delivering raw sample buffers.
    async fn open(&mut self) -> Result<mpsc::Receiver<Vec<f32>>, String>;

    /// Whether the device can deliver its native small buffers directly.
    fn low_latency(&self) -> bool;

    /// Input name for logging.
    fn name(&self) -> &str;
}

/// One frame-producer interface both capture strategies conform to.
///
/// The rest of the pipeline consumes either strategy identically: a stream
/// of fixed-length frames, one VAD + encode pass per frame.
#[async_trait]
pub trait CaptureSource: Send {
    /// Start capturing; frames arrive on the returned channel.
    async fn start(&mut self) -> Result<mpsc::Receiver<Vec<f32>>, String>;

    /// Stop capturing and release the device.
    fn stop(&mut self);

    /// Fixed frame length this source produces, in samples.
    fn frame_len(&self) -> usize;

    /// Source name for logging.
    fn name(&self) -> &'static str;
}

/// Re-slice arbitrary device buffers into fixed-length frames, carrying
/// leftovers across buffers. Runs until the device stream or the consumer
/// goes away.
async fn reframe(
    mut raw_rx: mpsc::Receiver<Vec<f32>>,
    frame_tx: mpsc::Sender<Vec<f32>>,
    frame_len: usize,
) {
    let mut pending: Vec<f32> = Vec::with_capacity(frame_len);

    while let Some(buffer) = raw_rx.recv().await {
        let mut offset = 0;

        if !pending.is_empty() {
            let need = frame_len - pending.len();
            if buffer.len() < need {
                pending.extend_from_slice(&buffer);
                continue;
            }
            pending.extend_from_slice(&buffer[..need]);
            offset = need;
            let frame = std::mem::replace(&mut pending, Vec::with_capacity(frame_len));
            if frame_tx.send(frame).await.is_err() {
                return;
            }
        }

        while offset + frame_len <= buffer.len() {
            let frame = buffer[offset..offset + frame_len].to_vec();
            offset += frame_len;
            if frame_tx.send(frame).await.is_err() {
                return;
            }
        }

        if offset < buffer.len() {
            pending.extend_from_slice(&buffer[offset..]);
        }
    }
}

/// Preferred strategy: small fixed frames straight off the device quantum.
pub struct LowLatencySource {
    input: Box<dyn AudioInput>,
    frame_len: usize,
    task: Option<JoinHandle<()>>,
}

impl LowLatencySource {
    pub fn new(input: Box<dyn AudioInput>, frame_len: usize) -> Self {
        Self { input, frame_len, task: None }
    }
}

#[async_trait]
impl CaptureSource for LowLatencySource {
    async fn start(&mut self) -> Result<mpsc::Receiver<Vec<f32>>, String> {
        let raw_rx = self.input.open().await?;
        let (frame_tx, frame_rx) = mpsc::channel(FRAME_CHANNEL_DEPTH);
        let frame_len = self.frame_len;
        self.task = Some(tokio::spawn(reframe(raw_rx, frame_tx, frame_len)));
        Ok(frame_rx)
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    fn frame_len(&self) -> usize {
        self.frame_len
    }

    fn name(&self) -> &'static str {
        "low-latency"
    }
}

/// Fallback strategy: the same stream re-framed into larger buffers.
pub struct BufferedSource {
    input: Box<dyn AudioInput>,
    frame_len: usize,
    task: Option<JoinHandle<()>>,
}

impl BufferedSource {
    pub fn new(input: Box<dyn AudioInput>, frame_len: usize) -> Self {
        Self { input, frame_len, task: None }
    }
}

#[async_trait]
impl CaptureSource for BufferedSource {
    async fn start(&mut self) -> Result<mpsc::Receiver<Vec<f32>>, String> {
        let raw_rx = self.input.open().await?;
        let (frame_tx, frame_rx) = mpsc::channel(FRAME_CHANNEL_DEPTH);
        let frame_len = self.frame_len;
        self.task = Some(tokio::spawn(reframe(raw_rx, frame_tx, frame_len)));
        Ok(frame_rx)
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    fn frame_len(&self) -> usize {
        self.frame_len
    }

    fn name(&self) -> &'static str {
        "buffered"
    }
}

/// Capability probe: pick the capture strategy once, at initialization.
///
/// Prefers the low-latency source when the input supports it, otherwise
/// falls back to the buffered source with its larger fixed frame size.
pub fn probe_capture_source(
    input: Box<dyn AudioInput>,
    preferred_frame_len: usize,
    fallback_frame_len: usize,
) -> Box<dyn CaptureSource> {
    if input.low_latency() {
        info!(
            "Capture probe: input '{}' supports low-latency frames ({} samples)",
            input.name(),
            preferred_frame_len
        );
        Box::new(LowLatencySource::new(input, preferred_frame_len))
    } else {
        warn!(
            "Capture probe: input '{}' lacks low-latency support, buffering {} samples per frame",
            input.name(),
            fallback_frame_len
        );
        Box::new(BufferedSource::new(input, fallback_frame_len))
    }
}

/// Control signals raised by the capture side, consumed locally only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureEvent {
    /// VAD found active speech in the current frame. Raised once per
    /// triggering frame; never sent over the network.
    SpeechActive,
}

/// Send half of the transport as the capture side sees it: fire-and-forget
/// binary frames, never awaited inside the frame callback.
pub trait FrameSink: Send {
    fn is_open(&self) -> bool;

    fn send(&self, frame: Vec<u8>);
}

/// What happened to one captured frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDisposition {
    /// Encoded and handed to the transport.
    Sent,
    /// Transport was down; the frame was discarded.
    Dropped,
}

/// Per-frame processing: VAD, encode, transmit.
pub struct CapturePipeline<S: FrameSink> {
    vad: EnergyVad,
    sink: S,
    events: mpsc::UnboundedSender<CaptureEvent>,
}

impl<S: FrameSink> CapturePipeline<S> {
    pub fn new(vad: EnergyVad, sink: S, events: mpsc::UnboundedSender<CaptureEvent>) -> Self {
        Self { vad, sink, events }
    }

    /// Process one captured frame synchronously.
    ///
    /// Runs VAD first so the speech-active signal is raised even when the
    /// transport is down, then encodes and transmits. Must stay within the
    /// device's frame budget: no awaiting, no blocking I/O.
    pub fn process_frame(&self, samples: &[f32]) -> FrameDisposition {
        if self.vad.is_speech(samples) {
            // Listener may be gone during teardown; nothing to do about it
            let _ = self.events.send(CaptureEvent::SpeechActive);
        }

        let pcm = encoder::encode_pcm16(samples);

        if self.sink.is_open() {
            self.sink.send(encoder::to_le_bytes(&pcm));
            FrameDisposition::Sent
        } else {
            FrameDisposition::Dropped
        }
    }

    /// Drive the pipeline from a started capture source until the stream
    /// ends or the source is stopped.
    pub async fn run(&self, mut frames: mpsc::Receiver<Vec<f32>>) {
        let mut sent: u64 = 0;
        let mut dropped: u64 = 0;

        while let Some(frame) = frames.recv().await {
            match self.process_frame(&frame) {
                FrameDisposition::Sent => sent += 1,
                FrameDisposition::Dropped => dropped += 1,
            }
        }

        debug!("Capture stream ended: {} frames sent, {} dropped", sent, dropped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    struct TestInput {
        buffers: Vec<Vec<f32>>,
        low_latency: bool,
    }

    #[async_trait]
    impl AudioInput for TestInput {
        async fn open(&mut self) -> Result<mpsc::Receiver<Vec<f32>>, String> {
            let (tx, rx) = mpsc::channel(FRAME_CHANNEL_DEPTH);
            let buffers = std::mem::take(&mut self.buffers);
            tokio::spawn(async move {
                for buffer in buffers {
                    if tx.send(buffer).await.is_err() {
                        break;
                    }
                }
            });
            Ok(rx)
        }

        fn low_latency(&self) -> bool {
            self.low_latency
        }

        fn name(&self) -> &str {
            "test"
        }
    }

    #[derive(Clone)]
    struct TestSink {
        open: Arc<AtomicBool>,
        frames: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    impl TestSink {
        fn new(open: bool) -> Self {
            Self {
                open: Arc::new(AtomicBool::new(open)),
                frames: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    impl FrameSink for TestSink {
        fn is_open(&self) -> bool {
            self.open.load(Ordering::SeqCst)
        }

        fn send(&self, frame: Vec<u8>) {
            self.frames.lock().unwrap().push(frame);
        }
    }

    fn pipeline(sink: TestSink) -> (CapturePipeline<TestSink>, mpsc::UnboundedReceiver<CaptureEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (CapturePipeline::new(EnergyVad::default(), sink, tx), rx)
    }

    #[tokio::test]
    async fn test_frames_are_encoded_and_sent() {
        let sink = TestSink::new(true);
        let (pipe, _events) = pipeline(sink.clone());

        let frame = vec![0.5f32; 320];
        assert_eq!(pipe.process_frame(&frame), FrameDisposition::Sent);

        let sent = sink.frames.lock().unwrap();
        assert_eq!(sent.len(), 1);
        // 320 samples at two bytes each
        assert_eq!(sent[0].len(), 640);
    }

    #[tokio::test]
    async fn test_frames_dropped_while_transport_down() {
        let sink = TestSink::new(false);
        let (pipe, _events) = pipeline(sink.clone());

        assert_eq!(pipe.process_frame(&[0.5f32; 64]), FrameDisposition::Dropped);
        assert!(sink.frames.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_speech_signal_raised_once_per_loud_frame() {
        let sink = TestSink::new(true);
        let (pipe, mut events) = pipeline(sink);

        pipe.process_frame(&[0.5f32; 64]);
        pipe.process_frame(&[0.0f32; 64]);
        pipe.process_frame(&[0.5f32; 64]);

        assert_eq!(events.try_recv(), Ok(CaptureEvent::SpeechActive));
        assert_eq!(events.try_recv(), Ok(CaptureEvent::SpeechActive));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_vad_runs_even_when_transport_down() {
        let sink = TestSink::new(false);
        let (pipe, mut events) = pipeline(sink);

        assert_eq!(pipe.process_frame(&[0.5f32; 64]), FrameDisposition::Dropped);
        assert_eq!(events.try_recv(), Ok(CaptureEvent::SpeechActive));
    }

    #[tokio::test]
    async fn test_probe_prefers_low_latency() {
        let input = Box::new(TestInput { buffers: vec![], low_latency: true });
        let source = probe_capture_source(input, 128, 4096);
        assert_eq!(source.name(), "low-latency");
        assert_eq!(source.frame_len(), 128);
    }

    #[tokio::test]
    async fn test_probe_falls_back_to_buffered() {
        let input = Box::new(TestInput { buffers: vec![], low_latency: false });
        let source = probe_capture_source(input, 128, 4096);
        assert_eq!(source.name(), "buffered");
        assert_eq!(source.frame_len(), 4096);
    }

    #[tokio::test]
    async fn test_buffered_source_reframes_across_buffers() {
        let input = Box::new(TestInput {
            // 3 buffers of 3 samples re-framed into 4-sample frames
            buffers: vec![
                vec![1.0, 2.0, 3.0],
                vec![4.0, 5.0, 6.0],
                vec![7.0, 8.0, 9.0],
            ],
            low_latency: false,
        });
        let mut source = BufferedSource::new(input, 4);

        let mut frames = source.start().await.unwrap();
        assert_eq!(frames.recv().await.unwrap(), vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(frames.recv().await.unwrap(), vec![5.0, 6.0, 7.0, 8.0]);
        // The trailing sample never fills a frame
        assert!(frames.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_low_latency_source_passes_native_frames_through() {
        let input = Box::new(TestInput {
            buffers: vec![vec![0.1f32; 128], vec![0.2f32; 128]],
            low_latency: true,
        });
        let mut source = LowLatencySource::new(input, 128);

        let mut frames = source.start().await.unwrap();
        assert_eq!(frames.recv().await.unwrap().len(), 128);
        assert_eq!(frames.recv().await.unwrap().len(), 128);
        assert!(frames.recv().await.is_none());
        source.stop();
    }
}
