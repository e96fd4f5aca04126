//! Dense row-major float matrix kernel, plus the spectrogram type
//! frames are stored in between the STFT and mel stages.

use rayon::prelude::*;

use crate::error::{DspError, DspResult};

/// Complex STFT output: `num_frames` columns of `num_bins` rows each,
/// stored as parallel real/imag planes in row-major (bin, frame) order.
/// Kept at `f32` to match the on-disk cache format.
#[derive(Debug, Clone)]
pub struct ComplexSpectrogram {
    pub real: Vec<f32>,
    pub imag: Vec<f32>,
    pub num_bins: usize,
    pub num_frames: usize,
}

impl ComplexSpectrogram {
    /// `real`/`imag` are stored frame-major (`frame * num_bins + bin`);
    /// the returned matrix is bin-major (`bin * num_frames + frame`) to
    /// match the mel projection's expected row layout.
    pub fn magnitude(&self) -> FloatMatrix {
        let mut out = FloatMatrix::zeros(self.num_bins, self.num_frames);
        for frame in 0..self.num_frames {
            for bin in 0..self.num_bins {
                let idx = frame * self.num_bins + bin;
                let r = self.real[idx];
                let i = self.imag[idx];
                out.set(bin, frame, (r * r + i * i).sqrt());
            }
        }
        out
    }
}

/// Row-major dense matrix of `f32`, used for mel spectrograms, the mel
/// filter bank, and any other fixed-size numeric grid passed between
/// stages. Row-major means `data[row * cols + col]`.
#[derive(Debug, Clone, PartialEq)]
pub struct FloatMatrix {
    data: Vec<f32>,
    rows: usize,
    cols: usize,
}

/// Below this FLOP estimate, a blocked single-thread multiply beats the
/// fork/join overhead of splitting work across `rayon`.
const PARALLEL_FLOP_THRESHOLD: usize = 2_000_000;
const BLOCK: usize = 32;

impl FloatMatrix {
    pub fn zeros(rows: usize, cols: usize) -> FloatMatrix {
        FloatMatrix {
            data: vec![0.0; rows * cols],
            rows,
            cols,
        }
    }

    pub fn from_rows(rows: usize, cols: usize, data: Vec<f32>) -> DspResult<FloatMatrix> {
        if data.len() != rows * cols {
            return Err(DspError::InvalidArgument(format!(
                "expected {} elements for a {}x{} matrix, got {}",
                rows * cols,
                rows,
                cols,
                data.len()
            )));
        }
        Ok(FloatMatrix { data, rows, cols })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.data[row * self.cols + col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: f32) {
        self.data[row * self.cols + col] = value;
    }

    pub fn row(&self, row: usize) -> &[f32] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    pub fn add(&self, other: &FloatMatrix) -> DspResult<FloatMatrix> {
        self.elementwise(other, |a, b| a + b)
    }

    pub fn sub(&self, other: &FloatMatrix) -> DspResult<FloatMatrix> {
        self.elementwise(other, |a, b| a - b)
    }

    fn elementwise(
        &self,
        other: &FloatMatrix,
        op: impl Fn(f32, f32) -> f32,
    ) -> DspResult<FloatMatrix> {
        if self.rows != other.rows || self.cols != other.cols {
            return Err(DspError::InvalidArgument(
                "matrix dimensions must match for elementwise ops".into(),
            ));
        }
        let data = self
            .data
            .iter()
            .zip(other.data.iter())
            .map(|(a, b)| op(*a, *b))
            .collect();
        Ok(FloatMatrix {
            data,
            rows: self.rows,
            cols: self.cols,
        })
    }

    pub fn scale(&self, factor: f32) -> FloatMatrix {
        FloatMatrix {
            data: self.data.iter().map(|v| v * factor).collect(),
            rows: self.rows,
            cols: self.cols,
        }
    }

    pub fn transpose(&self) -> FloatMatrix {
        let mut out = FloatMatrix::zeros(self.cols, self.rows);
        for row_block in (0..self.rows).step_by(BLOCK) {
            for col_block in (0..self.cols).step_by(BLOCK) {
                let row_end = (row_block + BLOCK).min(self.rows);
                let col_end = (col_block + BLOCK).min(self.cols);
                for r in row_block..row_end {
                    for c in col_block..col_end {
                        out.set(c, r, self.get(r, c));
                    }
                }
            }
        }
        out
    }

    /// Blocked `self * other`, parallelized over row blocks once the
    /// estimated FLOP count crosses [`PARALLEL_FLOP_THRESHOLD`].
    pub fn matmul(&self, other: &FloatMatrix) -> DspResult<FloatMatrix> {
        if self.cols != other.rows {
            return Err(DspError::InvalidArgument(format!(
                "cannot multiply {}x{} by {}x{}",
                self.rows, self.cols, other.rows, other.cols
            )));
        }
        let m = self.rows;
        let n = other.cols;
        let k = self.cols;
        let flops = m.saturating_mul(n).saturating_mul(k);
        let mut out = FloatMatrix::zeros(m, n);

        let compute_row_block = |row_start: usize, out_chunk: &mut [f32]| {
            let row_end = (row_start + BLOCK).min(m);
            for kb in (0..k).step_by(BLOCK) {
                let k_end = (kb + BLOCK).min(k);
                for r in row_start..row_end {
                    let out_row = &mut out_chunk[(r - row_start) * n..(r - row_start + 1) * n];
                    for kk in kb..k_end {
                        let a_rk = self.get(r, kk);
                        if a_rk == 0.0 {
                            continue;
                        }
                        let b_row = other.row(kk);
                        for c in 0..n {
                            out_row[c] += a_rk * b_row[c];
                        }
                    }
                }
            }
        };

        if flops >= PARALLEL_FLOP_THRESHOLD {
            out.data
                .par_chunks_mut(n * BLOCK)
                .enumerate()
                .for_each(|(block_idx, chunk)| compute_row_block(block_idx * BLOCK, chunk));
        } else {
            let mut row_start = 0;
            while row_start < m {
                let row_end = (row_start + BLOCK).min(m);
                let chunk = &mut out.data[row_start * n..row_end * n];
                compute_row_block(row_start, chunk);
                row_start += BLOCK;
            }
        }

        Ok(out)
    }
}
