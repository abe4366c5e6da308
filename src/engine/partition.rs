// Partitioner
// Splits the global index space into per-unit chunks
use std::ops::Range;

use bitvec::prelude::*;
use serde::Serialize;

use crate::engine::error::{OffloadError, OffloadResult};

/// Contiguous slice of the global polynomial owned by one unit.
///
/// `length` may be shorter than the nominal chunk for the tail unit, and is
/// zero for units past the end of the data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UnitAssignment {
    pub unit: usize,
    pub offset: usize,
    pub length: usize,
}

impl UnitAssignment {
    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
}

/// ceil(n / units). `units` must be non-zero.
#[inline]
pub fn chunk_size(n: usize, units: usize) -> usize {
    n.div_ceil(units)
}

/// Assignment of unit `d`, computed without reference to any other unit.
pub fn assign(n: usize, units: usize, d: usize) -> UnitAssignment {
    let chunk = chunk_size(n, units);
    let offset = d * chunk;
    let length = n.saturating_sub(offset).min(chunk);
    UnitAssignment {
        unit: d,
        offset,
        length,
    }
}

/// The full per-unit table for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionTable {
    n: usize,
    chunk: usize,
    assignments: Vec<UnitAssignment>,
}

impl PartitionTable {
    pub fn new(n: usize, units: usize) -> OffloadResult<Self> {
        if units == 0 {
            return Err(OffloadError::InvalidConfig("unit count must be at least 1".into()));
        }
        let assignments = (0..units).map(|d| assign(n, units, d)).collect();
        Ok(Self {
            n,
            chunk: chunk_size(n, units),
            assignments,
        })
    }

    pub fn n(&self) -> usize {
        self.n
    }

    /// Nominal chunk length; also the row width of per-unit transfer buffers.
    pub fn chunk(&self) -> usize {
        self.chunk
    }

    pub fn units(&self) -> usize {
        self.assignments.len()
    }

    pub fn get(&self, unit: usize) -> Option<&UnitAssignment> {
        self.assignments.get(unit)
    }

    pub fn iter(&self) -> impl Iterator<Item = &UnitAssignment> {
        self.assignments.iter()
    }

    pub fn active_units(&self) -> usize {
        self.assignments.iter().filter(|a| !a.is_empty()).count()
    }

    /// Fails on the first unit whose valid length exceeds `capacity`.
    pub fn check_capacity(&self, capacity: usize) -> OffloadResult<()> {
        match self.assignments.iter().find(|a| a.length > capacity) {
            Some(a) => Err(OffloadError::CapacityExceeded {
                unit: a.unit,
                length: a.length,
                capacity,
            }),
            None => Ok(()),
        }
    }

    pub fn tiles_exactly(&self) -> bool {
        covers_exactly_once(self.n, self.assignments.iter().map(UnitAssignment::range))
    }
}

/// True when `ranges` visit every index of [0, len) exactly once and nothing
/// outside it.
pub fn covers_exactly_once<I>(len: usize, ranges: I) -> bool
where
    I: IntoIterator<Item = Range<usize>>,
{
    let mut seen = bitvec![usize, Lsb0; 0; len];
    for range in ranges {
        if range.end > len {
            return false;
        }
        for i in range {
            if seen.replace(i, true) {
                return false;
            }
        }
    }
    seen.all()
}
