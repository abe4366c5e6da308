// Unit Local Memory
use std::fmt;
use std::io;

use bitvec::prelude::*;
use memmap2::{MmapMut, MmapOptions};
use serde::{Deserialize, Serialize};

const WORD_BYTES: usize = std::mem::size_of::<u32>();

/// Named logical regions of a unit's local storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Region {
    OperandA,
    OperandB,
    Output,
}

impl Region {
    pub const ALL: [Region; 3] = [Region::OperandA, Region::OperandB, Region::Output];

    pub fn name(self) -> &'static str {
        match self {
            Region::OperandA => "polynomial_1",
            Region::OperandB => "polynomial_2",
            Region::Output => "polynomial_0",
        }
    }

    fn index(self) -> usize {
        match self {
            Region::OperandA => 0,
            Region::OperandB => 1,
            Region::Output => 2,
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Static shape of one unit: region capacity and worker scratch layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitGeometry {
    /// Words per region.
    pub capacity: usize,
    pub workers: usize,
    pub block_size: usize,
}

impl UnitGeometry {
    /// Three private buffers (A, B, out) of one block each, per worker.
    pub fn scratch_words(&self) -> usize {
        self.workers * 3 * self.block_size
    }

    pub fn total_words(&self) -> usize {
        3 * self.capacity + self.scratch_words()
    }
}

/// Borrowed split of a unit's arena: shared operands, exclusive output and
/// exclusive scratch.
pub struct UnitView<'a> {
    pub a: &'a [u32],
    pub b: &'a [u32],
    pub out: &'a mut [u32],
    pub scratch: &'a mut [u32],
}

/// Bounded-capacity arena standing in for a unit's local memory.
///
/// Layout: `[A | B | Out]` regions of `capacity` words, then the worker
/// scratch area. Allocated once, never resized; resources are tied to this
/// struct's lifetime.
pub struct UnitMemory {
    mapping: MmapMut,
    geometry: UnitGeometry,
    staged: BitVec, // Tracks which regions hold host-written data
}

impl UnitMemory {
    pub fn new(geometry: UnitGeometry) -> io::Result<Self> {
        let bytes = (geometry.total_words() * WORD_BYTES).max(WORD_BYTES);
        let mapping = MmapOptions::new().len(bytes).map_anon()?;
        // Workers sweep their blocks front to back
        #[cfg(unix)]
        mapping.advise(memmap2::Advice::Sequential)?;
        Ok(Self {
            mapping,
            geometry,
            staged: bitvec![0; Region::ALL.len()],
        })
    }

    pub fn geometry(&self) -> &UnitGeometry {
        &self.geometry
    }

    fn words(&self) -> &[u32] {
        let bytes = self.geometry.total_words() * WORD_BYTES;
        bytemuck::cast_slice(&self.mapping[..bytes])
    }

    fn words_mut(&mut self) -> &mut [u32] {
        let bytes = self.geometry.total_words() * WORD_BYTES;
        bytemuck::cast_slice_mut(&mut self.mapping[..bytes])
    }

    pub fn region(&self, region: Region) -> &[u32] {
        let start = region.index() * self.geometry.capacity;
        &self.words()[start..start + self.geometry.capacity]
    }

    pub fn region_mut(&mut self, region: Region) -> &mut [u32] {
        let cap = self.geometry.capacity;
        let start = region.index() * cap;
        &mut self.words_mut()[start..start + cap]
    }

    /// Copies `data` to the front of `region` and marks it staged.
    /// Caller guarantees `data.len() <= capacity`.
    pub fn stage(&mut self, region: Region, data: &[u32]) {
        self.region_mut(region)[..data.len()].copy_from_slice(data);
        self.mark_staged(region);
    }

    pub fn is_staged(&self, region: Region) -> bool {
        self.staged[region.index()]
    }

    pub fn mark_staged(&mut self, region: Region) {
        self.staged.set(region.index(), true);
    }

    pub fn unstage(&mut self, region: Region) {
        self.staged.set(region.index(), false);
    }

    pub fn split(&mut self) -> UnitView<'_> {
        let cap = self.geometry.capacity;
        let words = self.words_mut();
        let (a, rest) = words.split_at_mut(cap);
        let (b, rest) = rest.split_at_mut(cap);
        let (out, scratch) = rest.split_at_mut(cap);
        UnitView {
            a,
            b,
            out,
            scratch,
        }
    }
}
