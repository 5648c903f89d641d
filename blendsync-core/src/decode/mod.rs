//! Chunked overlap decoding of a feature matrix.
//!
//! ## Sweep (per window)
//!
//! ```text
//! 1. chunk_len = min(frame_size, num_frames - start)
//! 2. copy rows start..start+chunk_len, pad to frame_size by repeating the last row
//! 3. inference.infer(window)            → frame_size × outputs
//! 4. keep the first chunk_len rows      (padding rows never reach the output)
//! 5. cross-fade into the blended sequence
//! 6. start += frame_size - overlap
//! ```
//!
//! After the sweep the sequence is concatenated to exactly `num_frames` rows
//! and post-processed once.
//!
//! Windows are decoded strictly one after another. The cancel flag, if set,
//! is checked before each inference call, which is the only place a sweep
//! can be interrupted.

pub mod blend;
pub mod window;

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};

use ndarray::{s, Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use tracing::{debug, info_span};

use crate::engine::diagnostics::PipelineDiagnostics;
use crate::error::{BlendsyncError, Result};
use crate::inference::ChunkInference;
use crate::postprocess::PostProcessConfig;

use blend::BlendedSequence;

/// Window geometry for the decoder model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct DecoderConfig {
    /// Rows per inference call. Default: 128.
    pub frame_size: usize,
    /// Rows shared by consecutive windows and cross-faded. Default: 32.
    pub overlap: usize,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            frame_size: 128,
            overlap: 32,
        }
    }
}

impl DecoderConfig {
    /// Distance between consecutive window starts.
    pub fn step(&self) -> usize {
        self.frame_size - self.overlap
    }

    /// # Errors
    /// `InvalidConfig` when `frame_size == 0` or `overlap >= frame_size`.
    pub fn validate(&self) -> Result<()> {
        if self.frame_size == 0 {
            return Err(BlendsyncError::InvalidConfig(
                "frame size must be at least 1".into(),
            ));
        }
        if self.overlap >= self.frame_size {
            return Err(BlendsyncError::InvalidConfig(format!(
                "overlap ({}) must be smaller than frame size ({})",
                self.overlap, self.frame_size
            )));
        }
        Ok(())
    }
}

/// Runs the windowed sweep and post-processing. Holds no per-run state, so
/// one decoder can serve any number of sequential runs.
#[derive(Debug, Clone)]
pub struct ChunkedDecoder {
    config: DecoderConfig,
    post: PostProcessConfig,
    cancel: Option<Arc<AtomicBool>>,
    diagnostics: Option<Arc<PipelineDiagnostics>>,
}

impl ChunkedDecoder {
    /// # Errors
    /// `InvalidConfig` if either configuration fails validation.
    pub fn new(config: DecoderConfig, post: PostProcessConfig) -> Result<Self> {
        config.validate()?;
        post.validate()?;
        Ok(Self {
            config,
            post,
            cancel: None,
            diagnostics: None,
        })
    }

    /// Abort the sweep with [`BlendsyncError::Cancelled`] once `flag` is set.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: Arc<PipelineDiagnostics>) -> Self {
        self.diagnostics = Some(diagnostics);
        self
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    pub fn post_process(&self) -> &PostProcessConfig {
        &self.post
    }

    /// Decode a row-major `num_frames × num_features` buffer.
    ///
    /// Returns exactly `num_frames` rows (a `0 × 0` matrix when there are no
    /// frames). The result has already been post-processed.
    ///
    /// # Errors
    /// - whatever `inference` returns, unchanged; no partial output survives.
    /// - `ShapeMismatch` if a decoded chunk does not have `frame_size` rows or
    ///   changes width between windows.
    /// - `Cancelled` if the cancel flag was raised.
    pub fn process_features<I>(
        &self,
        features: &[f32],
        num_frames: usize,
        num_features: usize,
        inference: &mut I,
    ) -> Result<Array2<f32>>
    where
        I: ChunkInference + ?Sized,
    {
        let frame_size = self.config.frame_size;
        let overlap = self.config.overlap;
        let _span = info_span!("decode", num_frames, num_features, frame_size, overlap).entered();

        let mut sequence = BlendedSequence::new(overlap);
        let mut output_cols: Option<usize> = None;

        for span in window::plan(num_frames, frame_size, overlap) {
            self.check_cancelled()?;

            let padded = span.is_padded(frame_size);
            let input = window::padded_window(features, num_features, span, frame_size);
            debug!(
                window = span.index,
                start = span.start,
                chunk_len = span.len,
                padded,
                "decoding window"
            );

            self.count(|d| &d.windows, 1);
            if padded {
                self.count(|d| &d.padded_windows, 1);
            }
            self.count(|d| &d.inference_calls, 1);

            let decoded = match inference.infer(input.view()) {
                Ok(decoded) => decoded,
                Err(e) => {
                    self.count(|d| &d.inference_errors, 1);
                    return Err(e);
                }
            };

            let (rows, cols) = decoded.dim();
            let expected_cols = output_cols.unwrap_or(cols);
            if rows != frame_size || cols != expected_cols {
                return Err(BlendsyncError::ShapeMismatch {
                    stage: "decoder inference",
                    expected_rows: frame_size,
                    expected_cols,
                    actual_rows: rows,
                    actual_cols: cols,
                });
            }
            output_cols = Some(cols);

            sequence.push(decoded.slice_move(s![..span.len, ..]));
        }

        let mut output = sequence.into_matrix(num_frames);
        self.post.apply(&mut output);
        self.count(|d| &d.frames_emitted, output.nrows());

        Ok(output)
    }

    /// Decode a feature matrix view. Non-contiguous views are copied first.
    pub fn process_matrix<I>(
        &self,
        features: ArrayView2<'_, f32>,
        inference: &mut I,
    ) -> Result<Array2<f32>>
    where
        I: ChunkInference + ?Sized,
    {
        let (num_frames, num_features) = features.dim();
        match features.as_slice() {
            Some(flat) => self.process_features(flat, num_frames, num_features, inference),
            None => {
                let flat: Vec<f32> = features.iter().copied().collect();
                self.process_features(&flat, num_frames, num_features, inference)
            }
        }
    }

    fn check_cancelled(&self) -> Result<()> {
        match &self.cancel {
            Some(flag) if flag.load(Ordering::Acquire) => Err(BlendsyncError::Cancelled),
            _ => Ok(()),
        }
    }

    fn count(&self, counter: impl Fn(&PipelineDiagnostics) -> &AtomicUsize, n: usize) {
        if let Some(d) = &self.diagnostics {
            PipelineDiagnostics::add(counter(d), n);
        }
    }
}
