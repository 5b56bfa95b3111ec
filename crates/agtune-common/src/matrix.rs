//! Dense row-major host matrices.
//!
//! Shards, gathered inputs and GEMM outputs all live in [`Matrix`]. Storage
//! is `f32` regardless of the configured element type; callers round with
//! [`Matrix::round_to`] when a buffer must carry reduced precision.

use thiserror::Error;

use crate::DType;

/// Errors arising from matrix shape checks.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShapeError {
    #[error("buffer of {len} elements cannot back a {rows}x{cols} matrix")]
    BufferLength { rows: usize, cols: usize, len: usize },

    #[error("matmul shape mismatch: a is {a_rows}x{a_cols} but b^T needs {b_cols} columns")]
    MatmulMismatch { a_rows: usize, a_cols: usize, b_cols: usize },

    #[error("{what} shape mismatch: expected {expected_rows}x{expected_cols}, got {rows}x{cols}")]
    Mismatch {
        what: &'static str,
        expected_rows: usize,
        expected_cols: usize,
        rows: usize,
        cols: usize,
    },
}

/// A dense, contiguous, row-major `rows x cols` matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl Matrix {
    /// A zero-filled matrix.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self { rows, cols, data: vec![0.0; rows * cols] }
    }

    /// Wrap an existing buffer, checking its length.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f32>) -> Result<Self, ShapeError> {
        if data.len() != rows * cols {
            return Err(ShapeError::BufferLength { rows, cols, len: data.len() });
        }
        Ok(Self { rows, cols, data })
    }

    /// Build a matrix element by element.
    pub fn from_fn(rows: usize, cols: usize, mut f: impl FnMut(usize, usize) -> f32) -> Self {
        let mut data = Vec::with_capacity(rows * cols);
        for r in 0..rows {
            for c in 0..cols {
                data.push(f(r, c));
            }
        }
        Self { rows, cols, data }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// `(rows, cols)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.data[row * self.cols + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: f32) {
        self.data[row * self.cols + col] = value;
    }

    /// Borrow one row.
    pub fn row(&self, row: usize) -> &[f32] {
        let start = row * self.cols;
        &self.data[start..start + self.cols]
    }

    /// Contiguous transposed copy.
    pub fn transpose(&self) -> Self {
        let mut out = Self::zeros(self.cols, self.rows);
        for r in 0..self.rows {
            for c in 0..self.cols {
                out.data[c * self.rows + r] = self.data[r * self.cols + c];
            }
        }
        out
    }

    /// Round every element onto the `dtype` grid.
    pub fn round_to(&mut self, dtype: DType) {
        dtype.round_slice(&mut self.data);
    }

    /// Fail unless this matrix is `rows x cols`.
    pub fn expect_shape(
        &self,
        what: &'static str,
        rows: usize,
        cols: usize,
    ) -> Result<(), ShapeError> {
        if self.rows != rows || self.cols != cols {
            return Err(ShapeError::Mismatch {
                what,
                expected_rows: rows,
                expected_cols: cols,
                rows: self.rows,
                cols: self.cols,
            });
        }
        Ok(())
    }

    /// `self * b^T`, accumulated in `f32` in natural `k` order.
    ///
    /// `self` is `m x k`, `b` is `n x k`, the result is `m x n`.
    pub fn matmul_transposed(&self, b: &Matrix) -> Result<Matrix, ShapeError> {
        if self.cols != b.cols {
            return Err(ShapeError::MatmulMismatch {
                a_rows: self.rows,
                a_cols: self.cols,
                b_cols: b.cols,
            });
        }
        let (m, n) = (self.rows, b.rows);
        let mut out = Matrix::zeros(m, n);
        for i in 0..m {
            let a_row = self.row(i);
            for j in 0..n {
                let b_row = b.row(j);
                out.data[i * n + j] = a_row.iter().zip(b_row).map(|(x, y)| x * y).sum();
            }
        }
        Ok(out)
    }

    /// Elementwise `self += other`.
    pub fn add_assign(&mut self, other: &Matrix) -> Result<(), ShapeError> {
        other.expect_shape("addend", self.rows, self.cols)?;
        for (a, b) in self.data.iter_mut().zip(&other.data) {
            *a += *b;
        }
        Ok(())
    }
}
