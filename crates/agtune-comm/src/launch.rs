//! SPMD launcher for in-process groups.

use std::io;
use std::panic;
use std::thread;

use tracing::error;

use crate::group::CommGroup;
use crate::local::LocalGroup;

/// Aborts the group when a rank leaves its body without success.
struct AbortOnExit {
    group: LocalGroup,
    armed: bool,
}

impl Drop for AbortOnExit {
    fn drop(&mut self) {
        if self.armed {
            self.group.abort();
        }
    }
}

/// Run `body` once per rank of a fresh `size`-rank [`LocalGroup`], each on
/// its own thread, and collect the per-rank results in rank order.
///
/// A rank whose body returns `Err` or panics aborts the group, so its peers
/// fail their next collective instead of blocking forever. A panic is
/// re-raised on the calling thread once every rank has exited.
pub fn launch_local_group<T, E, F>(size: usize, body: F) -> io::Result<Vec<Result<T, E>>>
where
    F: Fn(LocalGroup) -> Result<T, E> + Sync,
    T: Send,
    E: Send,
{
    let groups = LocalGroup::create(size);
    let sentinel = groups[0].clone();
    let body = &body;

    thread::scope(|scope| {
        let mut handles = Vec::with_capacity(size);
        for group in groups {
            let rank = group.rank();
            let spawned = thread::Builder::new().name(format!("rank-{rank}")).spawn_scoped(
                scope,
                move || {
                    let mut guard = AbortOnExit { group: group.clone(), armed: true };
                    let result = body(group);
                    guard.armed = result.is_err();
                    result
                },
            );
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    error!(rank, %err, "failed to spawn rank thread");
                    sentinel.abort();
                    for handle in handles {
                        let _ = handle.join();
                    }
                    return Err(err);
                }
            }
        }

        let mut results = Vec::with_capacity(size);
        let mut first_panic = None;
        for handle in handles {
            match handle.join() {
                Ok(result) => results.push(result),
                Err(payload) => {
                    first_panic.get_or_insert(payload);
                }
            }
        }
        if let Some(payload) = first_panic {
            panic::resume_unwind(payload);
        }
        Ok(results)
    })
}
