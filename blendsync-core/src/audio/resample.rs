//! Sample-rate conversion.
//!
//! ## Modes
//!
//! - [`ResampleQuality::Linear`] (default): two-tap linear interpolation with
//!   no anti-aliasing filter. The feature extractor was trained against audio
//!   prepared exactly this way, so its numerics are reproduced bit-for-bit:
//!   the ratio is computed in f64, the source position in f32, and the upper
//!   tap is clamped to the last input sample.
//! - [`ResampleQuality::Cubic`]: rubato `FastFixedIn` with cubic polynomial
//!   interpolation, for callers feeding a model that tolerates (or prefers)
//!   smoother conversion. Output length matches the linear mode.
//!
//! When `from == to` both modes hand the input back untouched.

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::AudioBuffer;
use crate::error::{BlendsyncError, Result};

/// Input frames per rubato call in cubic mode.
const CUBIC_CHUNK: usize = 1024;

/// Interpolation used when converting between sample rates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResampleQuality {
    #[default]
    Linear,
    Cubic,
}

/// Convert `audio` to `to_rate`, returning the same buffer when the rates match.
///
/// # Errors
/// `InvalidConfig` if either rate is zero; `Resample` if rubato fails in cubic mode.
pub fn resample(audio: AudioBuffer, to_rate: u32, quality: ResampleQuality) -> Result<AudioBuffer> {
    if audio.sample_rate == to_rate {
        return Ok(audio);
    }
    check_rates(audio.sample_rate, to_rate)?;

    let samples = match quality {
        ResampleQuality::Linear => resample_linear(&audio.samples, audio.sample_rate, to_rate),
        ResampleQuality::Cubic => resample_cubic(&audio.samples, audio.sample_rate, to_rate)?,
    };

    debug!(
        from = audio.sample_rate,
        to = to_rate,
        in_len = audio.samples.len(),
        out_len = samples.len(),
        ?quality,
        "resampled"
    );

    Ok(AudioBuffer::new(samples, to_rate))
}

/// Output length for a conversion: `floor(len * to / from)`.
pub fn resampled_len(len: usize, from_rate: u32, to_rate: u32) -> usize {
    let ratio = to_rate as f64 / from_rate as f64;
    (len as f64 * ratio) as usize
}

/// Linear-interpolation resampler over a raw sample slice.
///
/// For output index `i` the source position is `t = i / ratio`; the result
/// interpolates between `samples[floor(t)]` and `samples[min(floor(t) + 1, len - 1)]`.
/// Rates are assumed non-zero; [`resample`] checks them.
pub fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate {
        return samples.to_vec();
    }

    let ratio = to_rate as f64 / from_rate as f64;
    let new_len = resampled_len(samples.len(), from_rate, to_rate);
    let last = samples.len().saturating_sub(1);
    let step = ratio as f32;

    let mut out = Vec::with_capacity(new_len);
    for i in 0..new_len {
        let t = i as f32 / step;
        let index = t.floor();
        let frac = t - index;

        // f32 rounding can land exactly on `len` for very long inputs.
        let i0 = (index as usize).min(last);
        let i1 = (i0 + 1).min(last);

        let a = samples[i0];
        let b = samples[i1];
        out.push(a + (b - a) * frac.clamp(0.0, 1.0));
    }
    out
}

/// Cubic polynomial resampler backed by rubato.
///
/// The resampler's group delay is trimmed from the front and the output is
/// padded or truncated to [`resampled_len`] so both modes agree on length.
pub fn resample_cubic(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    if from_rate == to_rate {
        return Ok(samples.to_vec());
    }
    check_rates(from_rate, to_rate)?;

    let target_len = resampled_len(samples.len(), from_rate, to_rate);
    if target_len == 0 {
        return Ok(Vec::new());
    }

    let ratio = to_rate as f64 / from_rate as f64;
    let mut resampler = FastFixedIn::<f32>::new(
        ratio,
        1.0, // fixed ratio
        PolynomialDegree::Cubic,
        CUBIC_CHUNK,
        1, // mono
    )
    .map_err(|e| BlendsyncError::Resample(format!("resampler init: {e}")))?;

    let delay = resampler.output_delay();
    let wanted = target_len + delay;
    let mut output_buf = vec![vec![0f32; resampler.output_frames_max()]; 1];
    let mut out = Vec::with_capacity(wanted);

    let mut pos = 0;
    while pos + CUBIC_CHUNK <= samples.len() {
        let input = &samples[pos..pos + CUBIC_CHUNK];
        let (_consumed, produced) = resampler
            .process_into_buffer(&[input], &mut output_buf, None)
            .map_err(|e| BlendsyncError::Resample(e.to_string()))?;
        out.extend_from_slice(&output_buf[0][..produced]);
        pos += CUBIC_CHUNK;
    }

    if pos < samples.len() {
        let tail = &samples[pos..];
        let (_consumed, produced) = resampler
            .process_partial_into_buffer(Some(&[tail][..]), &mut output_buf, None)
            .map_err(|e| BlendsyncError::Resample(e.to_string()))?;
        out.extend_from_slice(&output_buf[0][..produced]);
    }

    // Flush the filter until the delayed tail has been emitted.
    while out.len() < wanted {
        let (_consumed, produced) = resampler
            .process_partial_into_buffer(None::<&[Vec<f32>]>, &mut output_buf, None)
            .map_err(|e| BlendsyncError::Resample(e.to_string()))?;
        if produced == 0 {
            break;
        }
        out.extend_from_slice(&output_buf[0][..produced]);
    }

    out.drain(..delay.min(out.len()));
    out.resize(target_len, 0.0);
    Ok(out)
}

fn check_rates(from_rate: u32, to_rate: u32) -> Result<()> {
    if from_rate == 0 || to_rate == 0 {
        return Err(BlendsyncError::InvalidConfig(format!(
            "sample rates must be non-zero (from={from_rate}, to={to_rate})"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn ramp(len: usize) -> Vec<f32> {
        (0..len).map(|i| i as f32 * 0.01).collect()
    }

    #[test]
    fn equal_rates_return_same_buffer() {
        let audio = AudioBuffer::new(ramp(480), 16_000);
        let ptr = audio.samples.as_ptr();
        let out = resample(audio, 16_000, ResampleQuality::Linear).unwrap();
        assert_eq!(out.samples.as_ptr(), ptr);
        assert_eq!(out.sample_rate, 16_000);
    }

    #[test]
    fn output_length_is_floor_of_ratio() {
        for (len, from, to) in [(1000, 44_100, 88_200), (999, 48_000, 88_200), (7, 3, 2)] {
            let out = resample_linear(&ramp(len), from, to);
            let expected = (len as f64 * to as f64 / from as f64).floor() as usize;
            assert_eq!(out.len(), expected, "len={len} from={from} to={to}");
        }
    }

    #[test]
    fn upsample_by_two_interpolates_midpoints() {
        let out = resample_linear(&[0.0, 1.0, 0.0], 1, 2);
        assert_eq!(out.len(), 6);
        assert_abs_diff_eq!(out[0], 0.0);
        assert_abs_diff_eq!(out[1], 0.5);
        assert_abs_diff_eq!(out[2], 1.0);
        assert_abs_diff_eq!(out[3], 0.5);
        assert_abs_diff_eq!(out[4], 0.0);
        // Upper tap clamps to the last sample: lerp(0, 0, 0.5).
        assert_abs_diff_eq!(out[5], 0.0);
    }

    #[test]
    fn last_sample_is_held_at_boundary() {
        let out = resample_linear(&[0.2, 0.8], 2, 5);
        assert_eq!(out.len(), 5);
        assert_abs_diff_eq!(*out.last().unwrap(), 0.8, epsilon = 1e-6);
    }

    #[test]
    fn downsample_picks_every_other_sample() {
        let input = ramp(10);
        let out = resample_linear(&input, 2, 1);
        assert_eq!(out.len(), 5);
        for (i, v) in out.iter().enumerate() {
            assert_abs_diff_eq!(*v, input[i * 2], epsilon = 1e-6);
        }
    }

    #[test]
    fn empty_input_resamples_to_empty() {
        assert!(resample_linear(&[], 44_100, 88_200).is_empty());
        assert!(resample_cubic(&[], 44_100, 88_200).unwrap().is_empty());
    }

    #[test]
    fn zero_rate_is_rejected() {
        let err = resample(AudioBuffer::new(ramp(4), 0), 16_000, ResampleQuality::Linear);
        assert!(matches!(err, Err(BlendsyncError::InvalidConfig(_))));
    }

    #[test]
    fn cubic_matches_linear_length() {
        let input = ramp(5000);
        let cubic = resample_cubic(&input, 44_100, 88_200).unwrap();
        assert_eq!(cubic.len(), resampled_len(input.len(), 44_100, 88_200));
    }

    #[test]
    fn cubic_preserves_dc_level() {
        let input = vec![0.5f32; 4096];
        let out = resample_cubic(&input, 48_000, 16_000).unwrap();
        // Skip the edges where the filter ramps in and out.
        let mid = &out[out.len() / 4..out.len() * 3 / 4];
        assert!(mid.iter().all(|v| (v - 0.5).abs() < 1e-3), "dc drifted");
    }
}
