//! Deterministic stub backends.
//!
//! Used by tests and by the CLI's `--stub` mode so the full preprocessing →
//! decode → post-process path can be exercised without model files.

use ndarray::{Array2, ArrayView2};
use tracing::debug;

use crate::audio::AudioBuffer;
use crate::error::Result;
use crate::inference::{ChunkInference, FeatureExtractor};

/// Feature extractor that emits one frame per `hop` samples.
///
/// Every column of frame `r` holds the mean absolute amplitude of samples
/// `r * hop .. (r + 1) * hop`, scaled by `(column + 1) / features`.
#[derive(Debug, Clone)]
pub struct StubExtractor {
    hop: usize,
    features: usize,
}

impl StubExtractor {
    pub fn new(hop: usize, features: usize) -> Self {
        Self {
            hop: hop.max(1),
            features: features.max(1),
        }
    }
}

impl Default for StubExtractor {
    /// 88.2 kHz audio at 60 frames per second.
    fn default() -> Self {
        Self::new(1470, 256)
    }
}

impl FeatureExtractor for StubExtractor {
    fn warm_up(&mut self) -> Result<()> {
        debug!("StubExtractor::warm_up: no-op");
        Ok(())
    }

    fn extract(&mut self, audio: &AudioBuffer) -> Result<Array2<f32>> {
        let frames = audio.samples.len() / self.hop;
        let features = self.features;
        let mut out = Array2::<f32>::zeros((frames, features));
        for (r, block) in audio.samples.chunks_exact(self.hop).enumerate() {
            let energy = block.iter().map(|s| s.abs()).sum::<f32>() / self.hop as f32;
            for c in 0..features {
                out[[r, c]] = energy * (c + 1) as f32 / features as f32;
            }
        }
        Ok(out)
    }
}

/// Decoder that maps each input row to `outputs` columns.
///
/// Output `[r, c]` = mean of input row `r` + `c * column_step`.
#[derive(Debug, Clone)]
pub struct StubDecoder {
    outputs: usize,
    column_step: f32,
    calls: usize,
}

impl StubDecoder {
    pub fn new(outputs: usize) -> Self {
        Self {
            outputs,
            column_step: 0.0,
            calls: 0,
        }
    }

    pub fn with_column_step(mut self, step: f32) -> Self {
        self.column_step = step;
        self
    }

    /// Number of `infer` calls served so far.
    pub fn calls(&self) -> usize {
        self.calls
    }
}

impl Default for StubDecoder {
    fn default() -> Self {
        Self::new(68).with_column_step(1.0)
    }
}

impl ChunkInference for StubDecoder {
    fn infer(&mut self, window: ArrayView2<'_, f32>) -> Result<Array2<f32>> {
        self.calls += 1;
        let rows = window.nrows();
        let width = window.ncols().max(1) as f32;
        let mut out = Array2::<f32>::zeros((rows, self.outputs));
        for (r, row) in window.outer_iter().enumerate() {
            let mean = row.sum() / width;
            for c in 0..self.outputs {
                out[[r, c]] = mean + c as f32 * self.column_step;
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn extractor_frame_count_follows_hop() {
        let mut ex = StubExtractor::new(4, 3);
        let audio = AudioBuffer::new(vec![0.5; 10], 88_200);
        let feats = ex.extract(&audio).unwrap();
        assert_eq!(feats.dim(), (2, 3));
        assert!((feats[[0, 2]] - 0.5).abs() < 1e-6);
        assert!((feats[[0, 0]] - 0.5 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn decoder_preserves_rows_and_counts_calls() {
        let mut dec = StubDecoder::new(5).with_column_step(0.5);
        let window = array![[1.0f32, 3.0], [0.0, 0.0], [2.0, 2.0]];
        let out = dec.infer(window.view()).unwrap();
        assert_eq!(out.dim(), (3, 5));
        assert_eq!(out[[0, 0]], 2.0);
        assert_eq!(out[[0, 4]], 4.0);
        assert_eq!(out[[2, 1]], 2.5);
        assert_eq!(dec.calls(), 1);
    }
}
