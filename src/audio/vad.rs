//! # Voice Activity Detection
//!
//! A lightweight energy detector that runs inside the per-frame capture
//! callback, so it has to be a single O(frame length) pass with no state
//! carried between frames. Each frame is evaluated independently: there is
//! no smoothing, no hysteresis, and no start/end edge tracking: a frame
//! either exceeds the energy threshold or it does not.

/// Default RMS threshold above which a frame counts as speech.
///
/// A tuning constant with no documented derivation; overridable through
/// `AudioSettings::vad_threshold`.
pub const DEFAULT_VAD_THRESHOLD: f32 = 0.01;

/// Per-frame RMS energy detector.
#[derive(Debug, Clone, Copy)]
pub struct EnergyVad {
    threshold: f32,
}

impl Default for EnergyVad {
    fn default() -> Self {
        Self::new(DEFAULT_VAD_THRESHOLD)
    }
}

impl EnergyVad {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Root-mean-square energy of one frame.
    ///
    /// Accumulates in f64 so the comparison against the threshold is stable
    /// at the boundary; the frame itself stays f32 end to end.
    pub fn rms(frame: &[f32]) -> f64 {
        if frame.is_empty() {
            return 0.0;
        }

        let sum_squares: f64 = frame.iter().map(|&s| s as f64 * s as f64).sum();
        (sum_squares / frame.len() as f64).sqrt()
    }

    /// Whether this frame counts as active speech.
    ///
    /// Strictly greater-than: a frame sitting exactly on the threshold does
    /// not fire.
    pub fn is_speech(&self, frame: &[f32]) -> bool {
        Self::rms(frame) > self.threshold as f64
    }
}
