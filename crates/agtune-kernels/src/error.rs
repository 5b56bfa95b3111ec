//! Errors raised by the all-gather GEMM kernel.

use agtune_comm::CommError;
use agtune_common::ShapeError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum KernelError {
    #[error("unsupported problem: {0}")]
    UnsupportedShape(String),

    #[error(transparent)]
    Shape(#[from] ShapeError),

    #[error("collective failed inside kernel: {0}")]
    Comm(#[from] CommError),

    #[error("no kernel variant fits M={m} N={n} K={k}")]
    NoVariant { m: usize, n: usize, k: usize },
}
