//! # Playback Scheduling
//!
//! Renders an ordered queue of decoded PCM chunks with no audible gaps or
//! overlaps, and supports instant full cancellation when the user starts
//! speaking again. The scheduler is an explicit state machine driven by
//! typed events (enqueue, chunk-end, flush) so every transition can be
//! tested without an output device; the caller owns the actual rendering
//! and reports back when a chunk finishes.
//!
//! ## Scheduling Rule:
//! Each chunk starts at max(current output clock time, previous chunk's
//! scheduled end). The small safety lead is applied only when the scheduler
//! starts from idle; while chaining, a chunk that arrives late simply starts
//! at the current clock time and the gap is accepted as-is.
//!
//! ## Flush Atomicity:
//! Every `RenderStart` carries the epoch it was issued under. `flush` bumps
//! the epoch, so a chunk-end callback racing with a flush identifies itself
//! as stale and can never dequeue a chunk that was discarded.

use std::collections::VecDeque;
use std::time::Instant;

/// Monotonic playback-device clock, in seconds.
///
/// The scheduler never reads wall time directly; tests drive a manual clock
/// and the reference client uses [`MonotonicClock`].
pub trait OutputClock {
    fn now(&self) -> f64;
}

/// Output clock backed by a process-monotonic instant.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn start() -> Self {
        Self { origin: Instant::now() }
    }
}

impl OutputClock for MonotonicClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// One decoded, ready-to-play unit of audio.
///
/// Owned exclusively by the scheduler's queue from arrival until it is
/// rendered or flushed. The sample rate is implicit (fixed by protocol);
/// the scheduler is told the rate once at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcmChunk {
    pub samples: Vec<i16>,
}

impl PcmChunk {
    pub fn new(samples: Vec<i16>) -> Self {
        Self { samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Scheduler state: either nothing is rendering, or exactly one chunk is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Rendering,
}

/// Instruction to the renderer: play these samples over [start, end).
///
/// `epoch` must be echoed back through [`PlaybackScheduler::chunk_ended`]
/// when rendering finishes.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderStart {
    pub chunk: PcmChunk,
    pub start: f64,
    pub end: f64,
    pub epoch: u64,
}

/// Ordered, flushable playback queue with gap-free scheduling.
pub struct PlaybackScheduler<C: OutputClock> {
    clock: C,
    sample_rate: u32,
    /// Safety lead applied when starting from idle, in seconds.
    lead: f64,
    queue: VecDeque<PcmChunk>,
    state: PlaybackState,
    /// Scheduled end of the most recently scheduled chunk; 0.0 after reset.
    next_start: f64,
    /// Bumped on every flush that interrupts an active render.
    epoch: u64,
}

impl<C: OutputClock> PlaybackScheduler<C> {
    pub fn new(clock: C, sample_rate: u32, lead_ms: u32) -> Self {
        Self {
            clock,
            sample_rate,
            lead: lead_ms as f64 / 1000.0,
            queue: VecDeque::new(),
            state: PlaybackState::Idle,
            next_start: 0.0,
            epoch: 0,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Append a chunk; begin rendering immediately if idle.
    ///
    /// Returns the render instruction when this enqueue started playback,
    /// `None` when the chunk was queued behind an active render.
    pub fn enqueue(&mut self, chunk: PcmChunk) -> Option<RenderStart> {
        self.queue.push_back(chunk);
        match self.state {
            PlaybackState::Idle => self.start_next(),
            PlaybackState::Rendering => None,
        }
    }

    /// Report that the chunk rendered under `epoch` has finished.
    ///
    /// Chains to the next queued chunk, or transitions to idle when the
    /// queue is empty. A stale epoch (issued before the latest flush) is
    /// ignored entirely; the render it refers to was discarded.
    pub fn chunk_ended(&mut self, epoch: u64) -> Option<RenderStart> {
        if epoch != self.epoch {
            return None;
        }
        if self.state != PlaybackState::Rendering {
            return None;
        }

        match self.start_next() {
            Some(next) => Some(next),
            None => {
                self.state = PlaybackState::Idle;
                self.next_start = 0.0;
                None
            }
        }
    }

    /// Discard everything: queued chunks, the active render, clock state.
    ///
    /// Idempotent, and a no-op on an idle scheduler. Returns whether the
    /// caller must hard-stop an in-flight render. Both the local VAD
    /// trigger and the server `interrupted` event call this with identical
    /// semantics.
    pub fn flush(&mut self) -> bool {
        let was_rendering = self.state == PlaybackState::Rendering;

        self.queue.clear();
        self.state = PlaybackState::Idle;
        self.next_start = 0.0;
        if was_rendering {
            // Invalidate the chunk-end callback of the halted render
            self.epoch += 1;
        }

        was_rendering
    }

    fn start_next(&mut self) -> Option<RenderStart> {
        let chunk = self.queue.pop_front()?;

        let now = self.clock.now();
        let base = if self.next_start > now { self.next_start } else { now };
        let start = match self.state {
            // Fresh start: give the renderer a small head start
            PlaybackState::Idle => base + self.lead,
            // Chaining: butt against the previous chunk, or start now if late
            PlaybackState::Rendering => base,
        };
        let end = start + chunk.len() as f64 / self.sample_rate as f64;

        self.state = PlaybackState::Rendering;
        self.next_start = end;

        Some(RenderStart { chunk, start, end, epoch: self.epoch })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    /// Hand-driven clock so tests control the device timeline exactly.
    #[derive(Clone)]
    struct ManualClock(Rc<Cell<f64>>);

    impl ManualClock {
        fn new() -> Self {
            Self(Rc::new(Cell::new(0.0)))
        }

        fn advance_to(&self, t: f64) {
            self.0.set(t);
        }
    }

    impl OutputClock for ManualClock {
        fn now(&self) -> f64 {
            self.0.get()
        }
    }

    fn chunk(samples: usize) -> PcmChunk {
        PcmChunk::new(vec![0i16; samples])
    }

    fn scheduler(clock: ManualClock) -> PlaybackScheduler<ManualClock> {
        // 24 kHz playback with a 10ms idle lead
        PlaybackScheduler::new(clock, 24_000, 10)
    }

    #[test]
    fn test_first_chunk_starts_after_idle_lead() {
        let clock = ManualClock::new();
        let mut sched = scheduler(clock.clone());

        let start = sched.enqueue(chunk(2400)).expect("idle enqueue starts");
        assert_eq!(start.start, 0.010);
        assert_eq!(start.end, 0.010 + 0.1);
        assert_eq!(sched.state(), PlaybackState::Rendering);
    }

    #[test]
    fn test_chunks_chain_gap_free_in_order() {
        let clock = ManualClock::new();
        let mut sched = scheduler(clock.clone());

        let first = sched.enqueue(chunk(2400)).unwrap();
        assert!(sched.enqueue(chunk(1200)).is_none());
        assert!(sched.enqueue(chunk(600)).is_none());

        // First chunk finishes slightly early from the clock's perspective
        clock.advance_to(first.end - 0.001);
        let second = sched.chunk_ended(first.epoch).expect("chains to second");
        assert_eq!(second.start, first.end);

        clock.advance_to(second.end);
        let third = sched.chunk_ended(second.epoch).expect("chains to third");
        assert_eq!(third.start, second.end);

        // Total scheduled span equals the sum of the chunk durations
        let span = third.end - first.start;
        let expected = (2400 + 1200 + 600) as f64 / 24_000.0;
        assert!((span - expected).abs() < 1e-12);
    }

    #[test]
    fn test_late_chunk_starts_at_clock_time_without_lead() {
        let clock = ManualClock::new();
        let mut sched = scheduler(clock.clone());

        let first = sched.enqueue(chunk(240)).unwrap();
        sched.enqueue(chunk(240));

        // The renderer underran: the next chunk is only reported well after
        // the first one's scheduled end.
        clock.advance_to(first.end + 0.5);
        let second = sched.chunk_ended(first.epoch).unwrap();
        assert_eq!(second.start, first.end + 0.5);
    }

    #[test]
    fn test_queue_drained_returns_to_idle() {
        let clock = ManualClock::new();
        let mut sched = scheduler(clock.clone());

        let start = sched.enqueue(chunk(240)).unwrap();
        clock.advance_to(start.end);
        assert!(sched.chunk_ended(start.epoch).is_none());
        assert_eq!(sched.state(), PlaybackState::Idle);
        assert_eq!(sched.queued(), 0);

        // A fresh enqueue after draining gets the idle lead again
        let restart = sched.enqueue(chunk(240)).unwrap();
        assert_eq!(restart.start, start.end + 0.010);
    }

    #[test]
    fn test_flush_on_idle_is_noop() {
        let clock = ManualClock::new();
        let mut sched = scheduler(clock);

        assert!(!sched.flush());
        assert_eq!(sched.state(), PlaybackState::Idle);
        assert_eq!(sched.epoch(), 0);
    }

    #[test]
    fn test_flush_twice_equals_flush_once() {
        let clock = ManualClock::new();
        let mut sched = scheduler(clock);

        sched.enqueue(chunk(240)).unwrap();
        sched.enqueue(chunk(240));

        assert!(sched.flush());
        let epoch_after_first = sched.epoch();
        assert!(!sched.flush());

        assert_eq!(sched.state(), PlaybackState::Idle);
        assert_eq!(sched.queued(), 0);
        assert_eq!(sched.epoch(), epoch_after_first);
    }

    #[test]
    fn test_stale_chunk_end_after_flush_is_ignored() {
        let clock = ManualClock::new();
        let mut sched = scheduler(clock.clone());

        let start = sched.enqueue(chunk(240)).unwrap();
        sched.enqueue(chunk(240));
        sched.enqueue(chunk(240));

        assert!(sched.flush());

        // The halted render's end callback races in afterward; it must not
        // resume playback of discarded chunks.
        clock.advance_to(start.end);
        assert!(sched.chunk_ended(start.epoch).is_none());
        assert_eq!(sched.state(), PlaybackState::Idle);
        assert_eq!(sched.queued(), 0);
    }

    #[test]
    fn test_stale_chunk_end_does_not_disturb_new_epoch() {
        let clock = ManualClock::new();
        let mut sched = scheduler(clock.clone());

        let old = sched.enqueue(chunk(240)).unwrap();
        sched.flush();

        let fresh = sched.enqueue(chunk(480)).unwrap();
        assert_ne!(fresh.epoch, old.epoch);

        // Late callback from before the flush arrives mid-render
        assert!(sched.chunk_ended(old.epoch).is_none());
        assert_eq!(sched.state(), PlaybackState::Rendering);

        clock.advance_to(fresh.end);
        assert!(sched.chunk_ended(fresh.epoch).is_none());
        assert_eq!(sched.state(), PlaybackState::Idle);
    }

    #[test]
    fn test_audio_then_interrupt_never_renders() {
        use base64::{engine::general_purpose::STANDARD, Engine as _};

        let clock = ManualClock::new();
        let mut sched = scheduler(clock);

        // "AAAA" decodes to two zero samples
        let bytes = STANDARD.decode("AAAA").unwrap();
        let samples = crate::audio::encoder::from_le_bytes(&bytes).unwrap();
        assert_eq!(samples, vec![0i16, 0]);

        // The chunk is enqueued and scheduling begins...
        let start = sched.enqueue(PcmChunk::new(samples)).unwrap();
        assert_eq!(sched.state(), PlaybackState::Rendering);

        // ...then the interrupt lands before anything could play
        assert!(sched.flush());
        assert_eq!(sched.state(), PlaybackState::Idle);
        assert_eq!(sched.queued(), 0);
        assert!(sched.chunk_ended(start.epoch).is_none());
    }
}
