//! Seam blending between consecutively decoded chunks.
//!
//! Rows that can still be touched by a future cross-fade live in a mutable
//! tail; everything older is moved into an append-only committed prefix.
//! A cross-fade reaches back at most `overlap` rows, so the tail never needs
//! to hold more than that.

use ndarray::{s, Array2, ArrayView2, ArrayViewMut2};

/// Linearly cross-fade `head` into `tail`, in place.
///
/// Both views must have the same shape. Row `i` of `k` becomes
/// `tail[i] + (head[i] - tail[i]) * i / k`: pure `tail` at the first row,
/// approaching `head` at the last.
pub fn cross_fade(mut tail: ArrayViewMut2<'_, f32>, head: ArrayView2<'_, f32>) {
    debug_assert_eq!(tail.dim(), head.dim());
    let k = tail.nrows();
    for (i, (mut dst, src)) in tail.outer_iter_mut().zip(head.outer_iter()).enumerate() {
        let alpha = i as f32 / k as f32;
        dst.zip_mut_with(&src, |a, &b| *a += (b - *a) * alpha);
    }
}

/// The growing output of a decode sweep.
#[derive(Debug)]
pub struct BlendedSequence {
    overlap: usize,
    committed: Vec<Array2<f32>>,
    committed_rows: usize,
    tail: Option<Array2<f32>>,
}

impl BlendedSequence {
    pub fn new(overlap: usize) -> Self {
        Self {
            overlap,
            committed: Vec::new(),
            committed_rows: 0,
            tail: None,
        }
    }

    /// Total rows accumulated so far.
    pub fn len(&self) -> usize {
        self.committed_rows + self.tail.as_ref().map_or(0, |t| t.nrows())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Column count of the accumulated chunks, if any have arrived.
    pub fn columns(&self) -> Option<usize> {
        self.tail
            .as_ref()
            .map(|t| t.ncols())
            .or_else(|| self.committed.first().map(|c| c.ncols()))
    }

    /// Append a trimmed chunk, cross-fading its head over the current end.
    ///
    /// The blend length is `min(overlap, self.len(), chunk.nrows())`; when it
    /// is zero the chunk is simply appended. Callers guarantee the column
    /// count matches earlier chunks.
    pub fn push(&mut self, chunk: Array2<f32>) {
        let Some(mut tail) = self.tail.take() else {
            self.tail = Some(chunk);
            self.commit_excess();
            return;
        };

        // The tail always holds min(overlap, len) rows or more, so the blend
        // region is entirely inside it.
        let k = self.overlap.min(tail.nrows()).min(chunk.nrows());
        if k > 0 {
            let n = tail.nrows();
            cross_fade(
                tail.slice_mut(s![n - k.., ..]),
                chunk.slice(s![..k, ..]),
            );
        }

        let rest = chunk.slice(s![k.., ..]);
        let merged = if rest.nrows() == 0 {
            tail
        } else {
            let n = tail.nrows();
            let mut merged = Array2::<f32>::zeros((n + rest.nrows(), tail.ncols()));
            merged.slice_mut(s![..n, ..]).assign(&tail);
            merged.slice_mut(s![n.., ..]).assign(&rest);
            merged
        };
        self.tail = Some(merged);
        self.commit_excess();
    }

    /// Move tail rows that no future blend can reach into the committed prefix.
    fn commit_excess(&mut self) {
        let Some(tail) = self.tail.take() else {
            return;
        };
        let n = tail.nrows();
        if n <= self.overlap {
            self.tail = Some(tail);
            return;
        }
        let split = n - self.overlap;
        self.committed.push(tail.slice(s![..split, ..]).to_owned());
        self.committed_rows += split;
        self.tail = Some(tail.slice(s![split.., ..]).to_owned());
    }

    /// Concatenate into exactly `total_rows` rows.
    ///
    /// Rows past `total_rows` are dropped; if fewer rows were accumulated the
    /// remainder stays zero. An empty sequence yields a `0 × 0` matrix.
    pub fn into_matrix(self, total_rows: usize) -> Array2<f32> {
        let Some(cols) = self.columns() else {
            return Array2::zeros((0, 0));
        };

        let mut out = Array2::<f32>::zeros((total_rows, cols));
        let mut row = 0usize;
        for chunk in self.committed.iter().chain(self.tail.iter()) {
            if row >= total_rows {
                break;
            }
            let take = chunk.nrows().min(total_rows - row);
            out.slice_mut(s![row..row + take, ..])
                .assign(&chunk.slice(s![..take, ..]));
            row += take;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn constant(rows: usize, cols: usize, v: f32) -> Array2<f32> {
        Array2::from_elem((rows, cols), v)
    }

    #[test]
    fn blend_is_a_linear_ramp() {
        let (a, b, k) = (2.0f32, 10.0f32, 4usize);
        let mut seq = BlendedSequence::new(k);
        seq.push(constant(8, 3, a));
        seq.push(constant(8, 3, b));
        assert_eq!(seq.len(), 12);

        let out = seq.into_matrix(12);
        for r in 0..4 {
            assert!(out.row(r).iter().all(|v| *v == a), "row {r} untouched");
        }
        for i in 0..k {
            let expected = a + (b - a) * i as f32 / k as f32;
            for v in out.row(4 + i) {
                assert_abs_diff_eq!(*v, expected, epsilon = 1e-6);
            }
        }
        for r in 8..12 {
            assert!(out.row(r).iter().all(|v| *v == b), "row {r} untouched");
        }
    }

    #[test]
    fn short_chunk_limits_blend_length() {
        let mut seq = BlendedSequence::new(32);
        seq.push(constant(40, 1, 0.0));
        seq.push(constant(4, 1, 8.0));
        // Blend covers the last 4 rows only; nothing is appended.
        assert_eq!(seq.len(), 40);
        let out = seq.into_matrix(40);
        assert_eq!(out[[35, 0]], 0.0);
        assert_eq!(out[[36, 0]], 0.0);
        assert_abs_diff_eq!(out[[37, 0]], 2.0);
        assert_abs_diff_eq!(out[[38, 0]], 4.0);
        assert_abs_diff_eq!(out[[39, 0]], 6.0);
    }

    #[test]
    fn zero_overlap_concatenates() {
        let mut seq = BlendedSequence::new(0);
        seq.push(constant(2, 2, 1.0));
        seq.push(constant(3, 2, 2.0));
        let out = seq.into_matrix(5);
        assert_eq!(out.column(0).to_vec(), vec![1.0, 1.0, 2.0, 2.0, 2.0]);
    }

    #[test]
    fn blend_reaches_back_across_committed_boundary() {
        // Overlap of 3 with tiny chunks: every blend must still see the
        // three most recent rows even after earlier rows were committed.
        let mut seq = BlendedSequence::new(3);
        seq.push(constant(5, 1, 0.0));
        seq.push(constant(5, 1, 3.0));
        seq.push(constant(3, 1, 6.0));
        assert_eq!(seq.len(), 7);
        let out = seq.into_matrix(7);
        // Before the last blend rows 4..7 held [2, 3, 3].
        assert_abs_diff_eq!(out[[3, 0]], 1.0);
        assert_abs_diff_eq!(out[[4, 0]], 2.0);
        assert_abs_diff_eq!(out[[5, 0]], 4.0);
        assert_abs_diff_eq!(out[[6, 0]], 5.0);
    }

    #[test]
    fn into_matrix_truncates_and_zero_fills() {
        let mut seq = BlendedSequence::new(0);
        seq.push(constant(4, 1, 1.0));
        let short = BlendedSequence {
            overlap: 0,
            committed: Vec::new(),
            committed_rows: 0,
            tail: Some(constant(2, 1, 5.0)),
        };
        assert_eq!(seq.into_matrix(3).nrows(), 3);
        let padded = short.into_matrix(4);
        assert_eq!(padded.column(0).to_vec(), vec![5.0, 5.0, 0.0, 0.0]);
    }

    #[test]
    fn empty_sequence_is_zero_by_zero() {
        assert_eq!(BlendedSequence::new(32).into_matrix(0).dim(), (0, 0));
    }
}
