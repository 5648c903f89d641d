//! Inference collaborators.
//!
//! Two black-box stages sit on either side of the chunked decoder:
//!
//! - [`FeatureExtractor`]: mono audio at the model rate → `numFrames × numFeatures`.
//! - [`ChunkInference`]: one padded window `frameSize × numFeatures` →
//!   `frameSize × outputFeatureCount`.
//!
//! The decoder depends only on these traits, so a stub, an ONNX session or a
//! plain closure can be plugged in without touching the windowing code.
//!
//! `&mut self` on both expresses that backends may hold scratch buffers or
//! session state. Shared access is serialised through the handles'
//! `parking_lot::Mutex`.

pub mod stub;

#[cfg(feature = "onnx")]
pub mod onnx;

#[cfg(feature = "onnx")]
pub use onnx::{OnnxDecoder, OnnxFeatureExtractor, OnnxModelConfig};

use std::sync::Arc;

use ndarray::{Array2, ArrayView2};
use parking_lot::Mutex;

use crate::audio::AudioBuffer;
use crate::error::Result;

/// Contract for the upstream audio → feature matrix stage.
pub trait FeatureExtractor: Send + 'static {
    /// One-time warm-up (load weights, dummy forward pass).
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }

    /// Extract a `numFrames × numFeatures` matrix from mono audio that is
    /// already at the extractor's expected sample rate.
    fn extract(&mut self, audio: &AudioBuffer) -> Result<Array2<f32>>;
}

/// Contract for the per-window decoder stage.
///
/// Implementations must be synchronous and return exactly as many rows as
/// they were given; the decoder rejects anything else.
pub trait ChunkInference {
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }

    /// Decode one window.
    ///
    /// # Errors
    /// Any error aborts the whole decode; no partial output is produced.
    fn infer(&mut self, window: ArrayView2<'_, f32>) -> Result<Array2<f32>>;
}

/// Adapter that lets a plain closure act as a [`ChunkInference`].
pub struct InferenceFn<F>(F);

/// Wrap a closure as a [`ChunkInference`] backend.
///
/// ```ignore
/// let mut backend = inference_fn(|window| Ok(window.to_owned()));
/// ```
pub fn inference_fn<F>(f: F) -> InferenceFn<F>
where
    F: FnMut(ArrayView2<'_, f32>) -> Result<Array2<f32>>,
{
    InferenceFn(f)
}

impl<F> ChunkInference for InferenceFn<F>
where
    F: FnMut(ArrayView2<'_, f32>) -> Result<Array2<f32>>,
{
    fn infer(&mut self, window: ArrayView2<'_, f32>) -> Result<Array2<f32>> {
        (self.0)(window)
    }
}

/// Thread-safe handle to any [`FeatureExtractor`].
#[derive(Clone)]
pub struct ExtractorHandle(pub Arc<Mutex<dyn FeatureExtractor>>);

impl ExtractorHandle {
    pub fn new<E: FeatureExtractor>(extractor: E) -> Self {
        Self(Arc::new(Mutex::new(extractor)))
    }
}

impl std::fmt::Debug for ExtractorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractorHandle").finish_non_exhaustive()
    }
}

/// Thread-safe handle to any sendable [`ChunkInference`].
#[derive(Clone)]
pub struct DecoderHandle(pub Arc<Mutex<dyn ChunkInference + Send>>);

impl DecoderHandle {
    pub fn new<D: ChunkInference + Send + 'static>(decoder: D) -> Self {
        Self(Arc::new(Mutex::new(decoder)))
    }
}

impl std::fmt::Debug for DecoderHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecoderHandle").finish_non_exhaustive()
    }
}
