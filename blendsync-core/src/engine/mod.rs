//! `BlendshapeEngine`: audio in, blendshape clip out.
//!
//! ## Stages
//!
//! ```text
//! RawAudio ─► normalize ─► resample(target_sample_rate) ─► FeatureExtractor
//!                                                              │
//!                                         ChunkedDecoder (ChunkInference per window)
//!                                                              │
//!                                           post-process ─► BlendshapeClip
//! ```
//!
//! ## Threading
//!
//! `generate` is synchronous and runs every stage on the calling thread.
//! Backends sit behind `parking_lot::Mutex` handles, so concurrent calls on a
//! shared engine serialise on the models. Async callers use
//! [`BlendshapeEngine::generate_blocking`], which moves the run onto
//! `tokio::task::spawn_blocking`.

pub mod diagnostics;

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    audio::{self, RawAudio, ResampleQuality},
    clip::BlendshapeClip,
    decode::{ChunkedDecoder, DecoderConfig},
    error::{BlendsyncError, Result},
    inference::{DecoderHandle, ExtractorHandle},
    postprocess::PostProcessConfig,
};

use diagnostics::{DiagnosticsSnapshot, PipelineDiagnostics};

/// Sample rate the feature extractor model was trained on.
pub const DEFAULT_TARGET_SAMPLE_RATE: u32 = 88_200;

/// Configuration for `BlendshapeEngine`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct EngineConfig {
    /// Rate the audio is converted to before feature extraction (Hz).
    /// Default: 88200.
    pub target_sample_rate: u32,
    /// Interpolation used for that conversion. Default: linear.
    pub resample_quality: ResampleQuality,
    pub decoder: DecoderConfig,
    pub post: PostProcessConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: DEFAULT_TARGET_SAMPLE_RATE,
            resample_quality: ResampleQuality::Linear,
            decoder: DecoderConfig::default(),
            post: PostProcessConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.target_sample_rate == 0 {
            return Err(BlendsyncError::InvalidConfig(
                "target sample rate must be non-zero".into(),
            ));
        }
        self.decoder.validate()?;
        self.post.validate()
    }
}

/// The top-level engine handle.
///
/// `BlendshapeEngine` is `Send + Sync`. Wrap it in `Arc` to share between
/// threads or to call [`generate_blocking`](Self::generate_blocking).
pub struct BlendshapeEngine {
    config: EngineConfig,
    extractor: ExtractorHandle,
    decoder: DecoderHandle,
    chunked: ChunkedDecoder,
    /// Raised by `cancel()`; consumed by the run that observes it.
    cancelled: Arc<AtomicBool>,
    diagnostics: Arc<PipelineDiagnostics>,
}

impl BlendshapeEngine {
    /// # Errors
    /// `InvalidConfig` if `config` fails validation.
    pub fn new(
        config: EngineConfig,
        extractor: ExtractorHandle,
        decoder: DecoderHandle,
    ) -> Result<Self> {
        config.validate()?;

        let cancelled = Arc::new(AtomicBool::new(false));
        let diagnostics = Arc::new(PipelineDiagnostics::default());
        let chunked = ChunkedDecoder::new(config.decoder, config.post.clone())?
            .with_cancel_flag(Arc::clone(&cancelled))
            .with_diagnostics(Arc::clone(&diagnostics));

        Ok(Self {
            config,
            extractor,
            decoder,
            chunked,
            cancelled,
            diagnostics,
        })
    }

    /// Warm up both backends. Call once before the first `generate`.
    pub fn warm_up(&self) -> Result<()> {
        info!("warming up feature extractor");
        self.extractor.0.lock().warm_up()?;
        info!("warming up decoder");
        self.decoder.0.lock().warm_up()?;
        info!("models ready");
        Ok(())
    }

    /// Run the full pipeline over `raw`.
    ///
    /// Empty audio, or audio too short to yield a single feature frame,
    /// produces an empty clip rather than an error.
    ///
    /// # Errors
    /// Any backend failure, shape mismatch or cancellation aborts the run;
    /// nothing partial is returned.
    pub fn generate(&self, raw: &RawAudio) -> Result<BlendshapeClip> {
        if self.cancelled.swap(false, Ordering::AcqRel) {
            info!("generation cancelled before it started");
            return Err(BlendsyncError::Cancelled);
        }
        let result = self.run(raw);
        // A request raised during this run is spent on it, whatever the outcome.
        self.cancelled.store(false, Ordering::Release);
        result
    }

    fn run(&self, raw: &RawAudio) -> Result<BlendshapeClip> {
        PipelineDiagnostics::add(&self.diagnostics.runs, 1);
        let frame_rate = self.config.post.frame_rate;
        let started = Instant::now();

        if raw.is_empty() {
            info!("input audio is empty, nothing to decode");
            return Ok(BlendshapeClip::empty(frame_rate));
        }

        // ── 1. Mono + peak normalize ────────────────────────────────────────
        let mono = audio::normalize(raw);
        PipelineDiagnostics::add(&self.diagnostics.samples_in, mono.len());
        info!(
            channels = raw.channels,
            sample_rate = raw.sample_rate,
            samples = mono.len(),
            peak = mono.peak(),
            "audio normalized"
        );

        // ── 2. Resample to the extractor rate ───────────────────────────────
        let resampled = audio::resample(
            mono,
            self.config.target_sample_rate,
            self.config.resample_quality,
        )?;
        PipelineDiagnostics::add(&self.diagnostics.samples_resampled, resampled.len());

        // ── 3. Feature extraction ───────────────────────────────────────────
        let features = self.extractor.0.lock().extract(&resampled)?;
        let (num_frames, num_features) = features.dim();
        PipelineDiagnostics::add(&self.diagnostics.feature_frames, num_frames);
        info!(
            num_frames,
            num_features,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "features extracted"
        );

        if num_frames == 0 {
            warn!(
                samples = resampled.len(),
                "feature extractor produced no frames; returning empty clip"
            );
            return Ok(BlendshapeClip::empty(frame_rate));
        }

        // ── 4. Chunked decode + post-process ────────────────────────────────
        let output = {
            let mut decoder = self.decoder.0.lock();
            self.chunked.process_matrix(features.view(), &mut *decoder)?
        };

        info!(
            frames = output.nrows(),
            outputs = output.ncols(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "blendshape generation complete"
        );

        Ok(BlendshapeClip::from_matrix(output.view(), frame_rate))
    }

    /// Run [`generate`](Self::generate) on tokio's blocking pool.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn generate_blocking(self: Arc<Self>, raw: RawAudio) -> Result<BlendshapeClip> {
        tokio::task::spawn_blocking(move || self.generate(&raw))
            .await
            .map_err(|e| {
                BlendsyncError::Other(anyhow::anyhow!("generation task died unexpectedly: {e}"))
            })?
    }

    /// Ask the in-flight run to stop before its next window. With no run in
    /// flight, the next `generate` fails with `Cancelled` instead.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        info!("generation cancel requested");
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Snapshot of pipeline counters for observability.
    pub fn diagnostics_snapshot(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    pub fn reset_diagnostics(&self) {
        self.diagnostics.reset();
    }
}

impl std::fmt::Debug for BlendshapeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlendshapeEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
