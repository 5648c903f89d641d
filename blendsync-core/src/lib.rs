//! # blendsync-core
//!
//! Audio-to-blendshape generation SDK.
//!
//! ## Architecture
//!
//! ```text
//! WAV / RawAudio → mono + peak normalize → resample(88.2 kHz)
//!                                              │
//!                                   FeatureExtractor::extract
//!                                              │
//!                          ChunkedDecoder (128-row windows, 32-row cross-fade)
//!                                              │
//!                                   ChunkInference::infer per window
//!                                              │
//!                            post-process (scale, ease-in, zero) → BlendshapeClip
//! ```
//!
//! Every stage is synchronous. Async hosts go through
//! [`BlendshapeEngine::generate_blocking`].

#![deny(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod clip;
pub mod decode;
pub mod engine;
pub mod error;
pub mod inference;
pub mod postprocess;

// Convenience re-exports for downstream crates
pub use audio::{wav::read_wav, AudioBuffer, RawAudio, ResampleQuality};
pub use clip::BlendshapeClip;
pub use decode::{ChunkedDecoder, DecoderConfig};
pub use engine::{diagnostics::DiagnosticsSnapshot, BlendshapeEngine, EngineConfig};
pub use error::BlendsyncError;
pub use inference::{
    inference_fn, ChunkInference, DecoderHandle, ExtractorHandle, FeatureExtractor,
};
pub use postprocess::PostProcessConfig;

#[cfg(feature = "onnx")]
pub use inference::{OnnxDecoder, OnnxFeatureExtractor, OnnxModelConfig};
