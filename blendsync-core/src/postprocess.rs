//! Final in-place shaping of the decoded blendshape matrix.
//!
//! ## Steps (in order)
//!
//! 1. **Scale**: the first `scale_columns` columns are divided by `scale_divisor`.
//! 2. **Ease in**: row `i` of the first `ease_frames()` rows is multiplied by
//!    `i / ease_frames()`, so playback starts from rest instead of popping.
//! 3. **Zero**: every column in `zeroed_columns` is cleared.
//!
//! The defaults encode the decoder model's output layout (61 blendshape
//! channels in percent, eye and tongue channels left to the renderer) and
//! must not be changed without retraining. Scaling is not idempotent, so the
//! decoder applies this exactly once per run.

use ndarray::{s, Array2};
use serde::{Deserialize, Serialize};

use crate::error::{BlendsyncError, Result};

/// Leading columns emitted in percent by the decoder model.
pub const SCALED_COLUMNS: usize = 61;
/// Percent → unit range.
pub const SCALE_DIVISOR: f32 = 100.0;
/// Fade-in length at the start of playback.
pub const EASE_SECONDS: f32 = 0.1;
/// Output frame rate of the decoder model (frames per second).
pub const OUTPUT_FRAME_RATE: u32 = 60;
/// Channels the renderer drives itself (eye blink/look, tongue).
pub const ZEROED_COLUMNS: [usize; 20] = [
    0, 1, 2, 3, 4, 7, 8, 9, 10, 11, 51, 52, 53, 54, 55, 56, 57, 58, 59, 60,
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct PostProcessConfig {
    pub scale_columns: usize,
    pub scale_divisor: f32,
    pub ease_seconds: f32,
    pub frame_rate: u32,
    pub zeroed_columns: Vec<usize>,
}

impl Default for PostProcessConfig {
    fn default() -> Self {
        Self {
            scale_columns: SCALED_COLUMNS,
            scale_divisor: SCALE_DIVISOR,
            ease_seconds: EASE_SECONDS,
            frame_rate: OUTPUT_FRAME_RATE,
            zeroed_columns: ZEROED_COLUMNS.to_vec(),
        }
    }
}

impl PostProcessConfig {
    /// Number of eased rows before clamping to the matrix height (6 by default).
    pub fn ease_frames(&self) -> usize {
        (self.ease_seconds * self.frame_rate as f32) as usize
    }

    pub fn validate(&self) -> Result<()> {
        if !self.scale_divisor.is_finite() || self.scale_divisor == 0.0 {
            return Err(BlendsyncError::InvalidConfig(format!(
                "scale divisor must be finite and non-zero, got {}",
                self.scale_divisor
            )));
        }
        if self.frame_rate == 0 {
            return Err(BlendsyncError::InvalidConfig(
                "output frame rate must be non-zero".into(),
            ));
        }
        if !self.ease_seconds.is_finite() || self.ease_seconds < 0.0 {
            return Err(BlendsyncError::InvalidConfig(format!(
                "ease duration must be a non-negative number of seconds, got {}",
                self.ease_seconds
            )));
        }
        Ok(())
    }

    /// Apply all three steps to `data` in place. Out-of-range columns are skipped.
    pub fn apply(&self, data: &mut Array2<f32>) {
        let (rows, cols) = data.dim();
        if rows == 0 || cols == 0 {
            return;
        }

        let scaled = self.scale_columns.min(cols);
        let divisor = self.scale_divisor;
        data.slice_mut(s![.., ..scaled]).mapv_inplace(|v| v / divisor);

        let ease = self.ease_frames().min(rows);
        for i in 0..ease {
            let factor = i as f32 / ease as f32;
            data.row_mut(i).mapv_inplace(|v| v * factor);
        }

        for &col in self.zeroed_columns.iter().filter(|&&c| c < cols) {
            data.column_mut(col).fill(0.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn default_ease_is_six_frames() {
        assert_eq!(PostProcessConfig::default().ease_frames(), 6);
    }

    #[test]
    fn scales_only_leading_columns() {
        let cfg = PostProcessConfig {
            zeroed_columns: Vec::new(),
            ease_seconds: 0.0,
            ..Default::default()
        };
        let mut data = Array2::from_elem((3, 64), 50.0f32);
        cfg.apply(&mut data);
        for r in 0..3 {
            for c in 0..61 {
                assert_relative_eq!(data[[r, c]], 0.5);
            }
            for c in 61..64 {
                assert_eq!(data[[r, c]], 50.0);
            }
        }
    }

    #[test]
    fn ease_ramps_first_rows() {
        let cfg = PostProcessConfig {
            zeroed_columns: Vec::new(),
            scale_columns: 0,
            ..Default::default()
        };
        let mut data = Array2::from_elem((10, 2), 6.0f32);
        cfg.apply(&mut data);
        let col: Vec<f32> = data.column(1).to_vec();
        for (i, v) in col.iter().enumerate().take(7) {
            assert_relative_eq!(*v, i as f32, epsilon = 1e-5);
        }
        assert!(col[7..].iter().all(|v| *v == 6.0));
    }

    #[test]
    fn ease_clamps_to_short_matrices() {
        let cfg = PostProcessConfig {
            zeroed_columns: Vec::new(),
            scale_columns: 0,
            ..Default::default()
        };
        let mut data = Array2::from_elem((3, 1), 3.0f32);
        cfg.apply(&mut data);
        for (i, v) in data.column(0).iter().enumerate() {
            assert_relative_eq!(*v, i as f32, epsilon = 1e-5);
        }
    }

    #[test]
    fn fixed_columns_are_zeroed_regardless_of_input() {
        let cfg = PostProcessConfig::default();
        let mut data = Array2::from_shape_fn((20, 68), |(r, c)| (r * 68 + c) as f32 + 1.0);
        cfg.apply(&mut data);
        for &c in ZEROED_COLUMNS.iter() {
            assert!(data.column(c).iter().all(|v| *v == 0.0), "column {c}");
        }
        // Untouched column past the ease window keeps its scaled value.
        assert_relative_eq!(data[[10, 20]], (10.0 * 68.0 + 21.0) / 100.0);
        assert_eq!(data[[10, 65]], 10.0 * 68.0 + 66.0);
    }

    #[test]
    fn narrow_matrix_skips_missing_columns() {
        let cfg = PostProcessConfig::default();
        let mut data = Array2::from_elem((8, 6), 100.0f32);
        cfg.apply(&mut data);
        assert!(data.column(5).iter().skip(6).all(|v| *v == 1.0));
        assert!(data.column(4).iter().all(|v| *v == 0.0));
    }

    #[test]
    fn applying_twice_scales_twice() {
        let cfg = PostProcessConfig {
            zeroed_columns: Vec::new(),
            ease_seconds: 0.0,
            ..Default::default()
        };
        let mut data = Array2::from_elem((1, 61), 100.0f32);
        cfg.apply(&mut data);
        cfg.apply(&mut data);
        assert_relative_eq!(data[[0, 12]], 0.01);
    }

    #[test]
    fn zero_divisor_is_rejected() {
        let cfg = PostProcessConfig {
            scale_divisor: 0.0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
        assert!(PostProcessConfig::default().validate().is_ok());
    }
}
