//! Window planning and extraction.
//!
//! Windows start at `0, step, 2*step, …` with `step = frame_size - overlap`
//! and stop once a start reaches `num_frames`. Every window is clamped to the
//! frames that exist; a short window is padded back to `frame_size` by
//! repeating its last real row.

use ndarray::Array2;

/// One inference window over the feature matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSpan {
    /// Zero-based window number within the sweep.
    pub index: usize,
    /// First feature row covered.
    pub start: usize,
    /// Real rows covered (`<= frame_size`); the rest of the window is padding.
    pub len: usize,
}

impl WindowSpan {
    /// Whether this window needs padding rows to reach `frame_size`.
    pub fn is_padded(&self, frame_size: usize) -> bool {
        self.len < frame_size
    }
}

/// Iterator over the windows of one sweep.
#[derive(Debug, Clone)]
pub struct WindowPlan {
    num_frames: usize,
    frame_size: usize,
    step: usize,
    next_start: usize,
    next_index: usize,
}

/// Plan the sweep for `num_frames` rows.
///
/// `overlap < frame_size` must already hold; `DecoderConfig::validate` checks it.
pub fn plan(num_frames: usize, frame_size: usize, overlap: usize) -> WindowPlan {
    WindowPlan {
        num_frames,
        frame_size,
        step: frame_size.saturating_sub(overlap).max(1),
        next_start: 0,
        next_index: 0,
    }
}

impl Iterator for WindowPlan {
    type Item = WindowSpan;

    fn next(&mut self) -> Option<WindowSpan> {
        if self.next_start >= self.num_frames {
            return None;
        }
        let span = WindowSpan {
            index: self.next_index,
            start: self.next_start,
            len: self.frame_size.min(self.num_frames - self.next_start),
        };
        self.next_start += self.step;
        self.next_index += 1;
        Some(span)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self
            .num_frames
            .saturating_sub(self.next_start)
            .div_ceil(self.step);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for WindowPlan {}

/// Copy the rows of `span` out of a flat row-major feature buffer and pad
/// them to `frame_size` rows.
///
/// Reads past the end of `features` yield zeros. Padding rows replicate the
/// last real row rather than introducing silence.
pub fn padded_window(
    features: &[f32],
    num_features: usize,
    span: WindowSpan,
    frame_size: usize,
) -> Array2<f32> {
    let rows = frame_size.max(span.len);
    let mut window = Array2::<f32>::zeros((rows, num_features));

    for i in 0..span.len {
        let base = (span.start + i) * num_features;
        for j in 0..num_features {
            if let Some(v) = features.get(base + j) {
                window[[i, j]] = *v;
            }
        }
    }

    if span.len > 0 && span.len < rows {
        let last = window.row(span.len - 1).to_owned();
        for i in span.len..rows {
            window.row_mut(i).assign(&last);
        }
    }

    window
}
