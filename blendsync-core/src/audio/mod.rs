//! Signal preprocessing: mono mixdown, peak normalization and resampling.
//!
//! ```text
//! RawAudio (interleaved, N channels) ──normalize──► AudioBuffer (mono, peak 1.0)
//!                                                      │
//!                                               resample(to_rate)
//!                                                      ▼
//!                                      AudioBuffer at the extractor's rate
//! ```
//!
//! Every operation here is a pure transform: inputs are borrowed or consumed,
//! outputs are freshly allocated buffers.

pub mod resample;
pub mod wav;

pub use resample::{resample, resample_cubic, resample_linear, ResampleQuality};

/// Interleaved multi-channel PCM as delivered by an asset loader or capture device.
#[derive(Debug, Clone, Default)]
pub struct RawAudio {
    /// Interleaved f32 samples (`frame0.ch0, frame0.ch1, …`).
    pub samples: Vec<f32>,
    /// Channel count. `0` and `1` are both treated as mono.
    pub channels: u16,
    /// Sample rate in Hz.
    pub sample_rate: u32,
}

impl RawAudio {
    pub fn new(samples: Vec<f32>, channels: u16, sample_rate: u32) -> Self {
        Self {
            samples,
            channels,
            sample_rate,
        }
    }

    /// Number of whole frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.samples.len() / usize::from(self.channels.max(1))
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// A contiguous block of mono PCM samples at a known sample rate.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AudioBuffer {
    /// Mono f32 samples, nominally in [-1.0, 1.0] after normalization.
    pub samples: Vec<f32>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Returns the duration of this buffer in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Largest absolute sample value, `0.0` for an empty buffer.
    pub fn peak(&self) -> f32 {
        peak_abs(&self.samples)
    }
}

/// Average interleaved channels down to one.
///
/// Each output sample is the arithmetic mean of its frame. A trailing partial
/// frame (fewer samples than `channels`) is dropped.
pub fn mix_to_mono(raw: &RawAudio) -> AudioBuffer {
    let ch = usize::from(raw.channels);
    if ch <= 1 {
        return AudioBuffer::new(raw.samples.clone(), raw.sample_rate);
    }

    let frames = raw.samples.len() / ch;
    let mut mono = Vec::with_capacity(frames);
    for frame in raw.samples.chunks_exact(ch) {
        let sum: f32 = frame.iter().sum();
        mono.push(sum / ch as f32);
    }
    AudioBuffer::new(mono, raw.sample_rate)
}

/// Mix to mono, then scale so the loudest sample has magnitude 1.0.
///
/// All-silence input (peak of zero) is returned unscaled.
pub fn normalize(raw: &RawAudio) -> AudioBuffer {
    let mut mono = mix_to_mono(raw);
    peak_normalize(&mut mono.samples);
    mono
}

/// Divide every sample by the peak absolute value, if that peak is non-zero.
fn peak_normalize(samples: &mut [f32]) {
    let max = peak_abs(samples);
    if max > 0.0 {
        for s in samples.iter_mut() {
            *s /= max;
        }
    }
}

fn peak_abs(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn stereo_mix_is_arithmetic_mean() {
        let raw = RawAudio::new(vec![1.0, 0.0, -0.5, 0.5, 0.25, 0.75], 2, 44_100);
        let mono = mix_to_mono(&raw);
        assert_eq!(mono.samples, vec![0.5, 0.0, 0.5]);
        assert_eq!(mono.sample_rate, 44_100);
    }

    #[test]
    fn trailing_partial_frame_is_dropped() {
        let raw = RawAudio::new(vec![0.2, 0.4, 0.6, 0.8, 1.0], 2, 16_000);
        assert_eq!(raw.frames(), 2);
        assert_eq!(mix_to_mono(&raw).len(), 2);
    }

    #[test]
    fn normalize_scales_peak_to_one() {
        let raw = RawAudio::new(vec![0.1, -0.4, 0.2], 1, 16_000);
        let out = normalize(&raw);
        assert_relative_eq!(out.samples[0], 0.25);
        assert_eq!(out.samples[1], -1.0);
        assert_relative_eq!(out.samples[2], 0.5);
    }

    #[test]
    fn normalize_is_idempotent_once_peak_is_one() {
        let raw = RawAudio::new(vec![0.3, -0.9, 0.45, 0.05], 1, 22_050);
        let once = normalize(&raw);
        let twice = normalize(&RawAudio::new(once.samples.clone(), 1, 22_050));
        assert_eq!(once, twice);
    }

    #[test]
    fn silence_stays_silent() {
        let raw = RawAudio::new(vec![0.0; 64], 2, 48_000);
        let out = normalize(&raw);
        assert_eq!(out.len(), 32);
        assert!(out.samples.iter().all(|s| *s == 0.0 && s.is_finite()));
    }

    #[test]
    fn zero_channels_pass_through_as_mono() {
        let raw = RawAudio::new(vec![0.5, -0.25], 0, 8_000);
        let out = normalize(&raw);
        assert_eq!(out.samples, vec![1.0, -0.5]);
    }

    #[test]
    fn empty_input_yields_empty_buffer() {
        let out = normalize(&RawAudio::new(Vec::new(), 2, 44_100));
        assert!(out.is_empty());
        assert_eq!(out.duration_secs(), 0.0);
    }
}
