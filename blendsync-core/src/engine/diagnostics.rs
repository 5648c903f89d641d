//! Lock-free counters describing what the engine has done since the last reset.

use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct PipelineDiagnostics {
    pub runs: AtomicUsize,
    pub samples_in: AtomicUsize,
    pub samples_resampled: AtomicUsize,
    pub feature_frames: AtomicUsize,
    pub windows: AtomicUsize,
    pub padded_windows: AtomicUsize,
    pub inference_calls: AtomicUsize,
    pub inference_errors: AtomicUsize,
    pub frames_emitted: AtomicUsize,
}

impl PipelineDiagnostics {
    pub fn reset(&self) {
        self.runs.store(0, Ordering::Relaxed);
        self.samples_in.store(0, Ordering::Relaxed);
        self.samples_resampled.store(0, Ordering::Relaxed);
        self.feature_frames.store(0, Ordering::Relaxed);
        self.windows.store(0, Ordering::Relaxed);
        self.padded_windows.store(0, Ordering::Relaxed);
        self.inference_calls.store(0, Ordering::Relaxed);
        self.inference_errors.store(0, Ordering::Relaxed);
        self.frames_emitted.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            runs: self.runs.load(Ordering::Relaxed),
            samples_in: self.samples_in.load(Ordering::Relaxed),
            samples_resampled: self.samples_resampled.load(Ordering::Relaxed),
            feature_frames: self.feature_frames.load(Ordering::Relaxed),
            windows: self.windows.load(Ordering::Relaxed),
            padded_windows: self.padded_windows.load(Ordering::Relaxed),
            inference_calls: self.inference_calls.load(Ordering::Relaxed),
            inference_errors: self.inference_errors.load(Ordering::Relaxed),
            frames_emitted: self.frames_emitted.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn add(counter: &AtomicUsize, n: usize) {
        counter.fetch_add(n, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsSnapshot {
    pub runs: usize,
    pub samples_in: usize,
    pub samples_resampled: usize,
    pub feature_frames: usize,
    pub windows: usize,
    pub padded_windows: usize,
    pub inference_calls: usize,
    pub inference_errors: usize,
    pub frames_emitted: usize,
}
