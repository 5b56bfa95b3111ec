//! Communication-group primitives for SPMD tuning runs.
//!
//! The harness needs only group introspection, a barrier and an all-gather
//! into a caller-supplied buffer. [`CommGroup`] captures that contract;
//! [`LocalGroup`] implements it for ranks running as threads of one process,
//! and [`launch_local_group`] starts such a group.

pub mod counting;
pub mod group;
pub mod launch;
pub mod local;

pub use counting::{CollectiveCounts, CountingGroup};
pub use group::{CommError, CommGroup};
pub use launch::launch_local_group;
pub use local::LocalGroup;
