// Unit Executor
// Streams a unit's valid range through per-worker scratch blocks
use std::ops::Range;

use rayon::prelude::*;
use tracing::debug;

use crate::engine::error::{OffloadError, OffloadResult};
use crate::engine::kernels::{apply_block, OpMode};
use crate::engine::memory::{UnitGeometry, UnitMemory, UnitView};

/// Blocks owned by worker `worker` over a valid range of `length` elements.
///
/// Bases start at `worker * block_size` and advance by `workers * block_size`;
/// the last block is clipped to `length`. For a fixed `(workers, block_size)`
/// the block sets of distinct workers are disjoint and their union is
/// `[0, length)`. `workers` and `block_size` must be non-zero.
pub fn worker_blocks(
    worker: usize,
    workers: usize,
    block_size: usize,
    length: usize,
) -> impl Iterator<Item = Range<usize>> {
    (worker * block_size..length)
        .step_by(workers * block_size)
        .map(move |base| base..(base + block_size).min(length))
}

/// Runs `mode` over `[0, length)` of the unit's operand regions, writing the
/// output region. Elements of the output region past `length` are untouched.
///
/// Workers run as a parallel-for over worker indices. Each one owns exactly
/// the output blocks named by [`worker_blocks`] and its own slice of the
/// scratch area, so no synchronization is needed between them.
pub fn execute_unit(
    unit: usize,
    memory: &mut UnitMemory,
    mode: OpMode,
    q: u32,
    length: usize,
) -> OffloadResult<()> {
    let UnitGeometry {
        capacity,
        workers,
        block_size,
    } = *memory.geometry();
    if length > capacity {
        return Err(OffloadError::CapacityExceeded {
            unit,
            length,
            capacity,
        });
    }
    if unit == 0 {
        debug!(workers, block_size, length, "unit 0 geometry");
    }

    let UnitView { a, b, out, scratch } = memory.split();

    // Block j of the output belongs to worker j % workers
    let mut lanes: Vec<Vec<&mut [u32]>> = (0..workers).map(|_| Vec::new()).collect();
    for (j, dst) in out[..length].chunks_mut(block_size).enumerate() {
        lanes[j % workers].push(dst);
    }

    lanes
        .into_par_iter()
        .zip(scratch.par_chunks_mut(3 * block_size))
        .enumerate()
        .for_each(|(worker, (dsts, cache))| {
            let (cache_a, rest) = cache.split_at_mut(block_size);
            let (cache_b, cache_o) = rest.split_at_mut(block_size);
            for (range, dst) in worker_blocks(worker, workers, block_size, length).zip(dsts) {
                let n = range.len();
                debug_assert_eq!(dst.len(), n);
                cache_a[..n].copy_from_slice(&a[range.clone()]);
                cache_b[..n].copy_from_slice(&b[range]);
                apply_block(mode, q, &cache_a[..n], &cache_b[..n], &mut cache_o[..n]);
                dst.copy_from_slice(&cache_o[..n]);
            }
        });

    Ok(())
}
