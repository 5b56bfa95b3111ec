//! Rank-serialized correctness gate between kernel and reference.

use agtune_comm::CommGroup;
use agtune_common::{Matrix, Tolerance, TuningConfig};
use tracing::{debug, warn};

use crate::error::{HarnessError, Result};

/// A rank-gated critical section.
///
/// Turn `t` belongs to rank `t`: the owner runs the body, every rank then
/// meets at a barrier. Every rank takes exactly `size` turns and so issues
/// exactly `size` barriers whatever the body returns.
#[derive(Debug, Clone, Copy)]
pub struct Turnstile<'g, G: ?Sized> {
    group: &'g G,
}

impl<'g, G: CommGroup + ?Sized> Turnstile<'g, G> {
    pub fn new(group: &'g G) -> Self {
        Self { group }
    }

    /// Run `body` during this rank's turn.
    ///
    /// A body failure is held until the last turn has passed and returned
    /// then. A failed barrier ends the walk immediately: the group is
    /// already broken and its peers are being torn down with it.
    pub fn run<T>(&self, body: impl FnOnce() -> Result<T>) -> Result<T> {
        let rank = self.group.rank();
        for _ in 0..rank {
            self.group.barrier()?;
        }
        let outcome = body();
        for _ in rank..self.group.size() {
            self.group.barrier()?;
        }
        outcome
    }
}

/// Check this rank's kernel output against its reference, one rank at a
/// time across the group.
///
/// Tolerances follow the configuration's element type. A mismatch names the
/// configuration and the rank that saw it.
pub fn validate<G: CommGroup + ?Sized>(
    group: &G,
    config: &TuningConfig,
    kernel: &Matrix,
    reference: &Matrix,
) -> Result<()> {
    let rank = group.rank();
    let tolerance = Tolerance::for_dtype(config.dtype);
    Turnstile::new(group).run(|| match tolerance.check(kernel, reference) {
        Ok(()) => {
            debug!(rank, %config, "kernel output matches reference");
            Ok(())
        }
        Err(detail) => {
            warn!(rank, %config, %detail, "kernel output mismatch");
            Err(HarnessError::Mismatch { config: *config, rank, detail })
        }
    })
}
