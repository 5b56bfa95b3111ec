//! Elementwise closeness checks between a kernel result and its reference.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{DType, Matrix};

/// Absolute/relative tolerance pair.
///
/// An element passes when `|actual - expected| <= atol + rtol * |expected|`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tolerance {
    pub atol: f32,
    pub rtol: f32,
}

/// Summary of a failed closeness check.
#[derive(Error, Debug, Clone, PartialEq)]
#[error(
    "{mismatched}/{total} elements outside atol={atol} rtol={rtol}; \
     first at ({row}, {col}): actual={actual} expected={expected}; max |diff|={max_abs_diff}"
)]
pub struct Mismatch {
    pub mismatched: usize,
    pub total: usize,
    pub row: usize,
    pub col: usize,
    pub actual: f32,
    pub expected: f32,
    pub max_abs_diff: f32,
    pub atol: f32,
    pub rtol: f32,
}

impl Tolerance {
    pub const fn new(atol: f32, rtol: f32) -> Self {
        Self { atol, rtol }
    }

    /// The tolerance pair used for results of `dtype`.
    pub const fn for_dtype(dtype: DType) -> Self {
        match dtype {
            DType::BF16 => Self::new(0.02, 0.02),
            DType::F16 => Self::new(0.01, 0.01),
        }
    }

    /// NaN is never close; infinities are close only to themselves.
    #[inline]
    pub fn is_close(&self, actual: f32, expected: f32) -> bool {
        if actual.is_nan() || expected.is_nan() {
            return false;
        }
        if actual.is_infinite() || expected.is_infinite() {
            return actual == expected;
        }
        (actual - expected).abs() <= self.atol + self.rtol * expected.abs()
    }

    /// Compare two matrices elementwise.
    ///
    /// Shapes must already match; a shape difference is reported as a
    /// mismatch of every element.
    pub fn check(&self, actual: &Matrix, expected: &Matrix) -> Result<(), Mismatch> {
        if actual.shape() != expected.shape() {
            return Err(Mismatch {
                mismatched: expected.len(),
                total: expected.len(),
                row: 0,
                col: 0,
                actual: f32::NAN,
                expected: f32::NAN,
                max_abs_diff: f32::INFINITY,
                atol: self.atol,
                rtol: self.rtol,
            });
        }

        let cols = expected.cols().max(1);
        let mut first: Option<usize> = None;
        let mut mismatched = 0usize;
        let mut max_abs_diff = 0.0f32;
        for (idx, (&a, &e)) in actual.as_slice().iter().zip(expected.as_slice()).enumerate() {
            let diff = (a - e).abs();
            if diff.is_nan() || diff > max_abs_diff {
                max_abs_diff = diff;
            }
            if !self.is_close(a, e) {
                mismatched += 1;
                first.get_or_insert(idx);
            }
        }

        match first {
            None => Ok(()),
            Some(idx) => Err(Mismatch {
                mismatched,
                total: expected.len(),
                row: idx / cols,
                col: idx % cols,
                actual: actual.as_slice()[idx],
                expected: expected.as_slice()[idx],
                max_abs_diff,
                atol: self.atol,
                rtol: self.rtol,
            }),
        }
    }
}
