//! Common types shared across the agtune workspace.
//!
//! This crate provides the element types, tuning configuration record, dense
//! host matrices, closeness tolerances and run topology used by the
//! communication layer, the kernel collaborator and the tuning harness.

pub mod dtype;
pub mod matrix;
pub mod tolerance;
pub mod topology;
pub mod tuning;

pub use dtype::DType;
pub use matrix::{Matrix, ShapeError};
pub use tolerance::{Mismatch, Tolerance};
pub use topology::{Topology, TopologyError};
pub use tuning::{PreconditionError, TuningConfig};
