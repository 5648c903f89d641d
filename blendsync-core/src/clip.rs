//! Serializable result of one generation run.
//!
//! ```json
//! { "frameRate": 60, "outputFeatures": 68, "frames": [[0.0, 0.12, …], …] }
//! ```
//!
//! One inner array per output frame. Mapping columns to named animation
//! channels and driving playback happen downstream.

use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlendshapeClip {
    /// Frames per second of `frames`.
    pub frame_rate: u32,
    /// Values per frame.
    pub output_features: usize,
    pub frames: Vec<Vec<f32>>,
}

impl BlendshapeClip {
    /// A clip with no frames ("nothing to play").
    pub fn empty(frame_rate: u32) -> Self {
        Self {
            frame_rate,
            output_features: 0,
            frames: Vec::new(),
        }
    }

    pub fn from_matrix(matrix: ArrayView2<'_, f32>, frame_rate: u32) -> Self {
        Self {
            frame_rate,
            output_features: matrix.ncols(),
            frames: matrix.outer_iter().map(|row| row.to_vec()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn duration_secs(&self) -> f64 {
        if self.frame_rate == 0 {
            return 0.0;
        }
        self.frames.len() as f64 / self.frame_rate as f64
    }
}
