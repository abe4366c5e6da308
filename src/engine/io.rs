// Unit Transport
// Allocation, staging and retrieval interface plus an in-process rack
use ndarray::{Array2, ArrayView2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::engine::error::{OffloadError, OffloadResult};
use crate::engine::executor::execute_unit;
use crate::engine::kernels::OpMode;
use crate::engine::memory::{UnitGeometry, UnitMemory};

pub use crate::engine::memory::Region;

/// Per-unit argument record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UnitArgs {
    pub length: u32,
}

/// The program every unit runs: modulus and worker layout are fixed at build
/// time on real hardware, so they travel with the image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramImage {
    pub name: String,
    pub q: u32,
    pub workers: usize,
    pub block_size: usize,
}

/// Bulk transport to a set of units.
///
/// Buffers cross this interface as `units x len` arrays, row `d` being unit
/// `d`'s contiguous buffer. `execute` blocks until every unit has finished;
/// output regions are readable only after it returns.
pub trait UnitTransport {
    fn unit_count(&self) -> usize;

    /// Words provisioned per region per unit.
    fn capacity(&self) -> usize;

    fn load(&mut self, image: &ProgramImage) -> OffloadResult<()>;

    fn write_region(&mut self, region: Region, buffers: ArrayView2<'_, u32>) -> OffloadResult<()>;

    fn write_args(&mut self, args: &[UnitArgs]) -> OffloadResult<()>;

    /// Broadcasts the global mode selector as its wire code.
    fn write_mode(&mut self, code: u32) -> OffloadResult<()>;

    fn execute(&mut self) -> OffloadResult<()>;

    fn read_region(&self, region: Region, len: usize) -> OffloadResult<Array2<u32>>;
}

struct RackUnit {
    memory: UnitMemory,
    args: Option<UnitArgs>,
}

/// In-process rack: one bounded arena per unit, units run concurrently on the
/// rayon pool.
pub struct LocalRack {
    unit_count: usize,
    capacity: usize,
    image: Option<ProgramImage>,
    units: Vec<RackUnit>,
    mode_code: Option<u32>,
}

impl LocalRack {
    pub fn allocate(unit_count: usize, capacity: usize) -> OffloadResult<Self> {
        if unit_count == 0 {
            return Err(OffloadError::InvalidConfig("cannot allocate zero units".into()));
        }
        info!(unit_count, capacity, "allocated rack");
        Ok(Self {
            unit_count,
            capacity,
            image: None,
            units: Vec::new(),
            mode_code: None,
        })
    }

    pub fn image(&self) -> Option<&ProgramImage> {
        self.image.as_ref()
    }

    fn loaded_image(&self) -> OffloadResult<&ProgramImage> {
        self.image.as_ref().ok_or(OffloadError::ProgramNotLoaded)
    }

    fn check_shape(&self, units: usize, len: usize) -> OffloadResult<()> {
        if units != self.unit_count || len > self.capacity {
            return Err(OffloadError::BufferShape {
                expected_units: self.unit_count,
                capacity: self.capacity,
                units,
                len,
            });
        }
        Ok(())
    }
}

impl UnitTransport for LocalRack {
    fn unit_count(&self) -> usize {
        self.unit_count
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn load(&mut self, image: &ProgramImage) -> OffloadResult<()> {
        if image.q == 0 {
            return Err(OffloadError::InvalidModulus(0));
        }
        if image.workers == 0 || image.block_size == 0 {
            return Err(OffloadError::InvalidConfig(format!(
                "image {} needs non-zero workers and block size, got {} x {}",
                image.name, image.workers, image.block_size
            )));
        }
        let geometry = UnitGeometry {
            capacity: self.capacity,
            workers: image.workers,
            block_size: image.block_size,
        };
        self.units = (0..self.unit_count)
            .map(|_| -> OffloadResult<RackUnit> {
                Ok(RackUnit {
                    memory: UnitMemory::new(geometry)?,
                    args: None,
                })
            })
            .collect::<OffloadResult<Vec<_>>>()?;
        self.mode_code = None;
        self.image = Some(image.clone());
        info!(name = %image.name, workers = image.workers, block_size = image.block_size, "program loaded");
        Ok(())
    }

    fn write_region(&mut self, region: Region, buffers: ArrayView2<'_, u32>) -> OffloadResult<()> {
        self.loaded_image()?;
        let (units, len) = buffers.dim();
        self.check_shape(units, len)?;
        for (unit, row) in self.units.iter_mut().zip(buffers.rows()) {
            match row.as_slice() {
                Some(data) => unit.memory.stage(region, data),
                None => unit.memory.stage(region, &row.to_vec()),
            }
            // Fresh inputs invalidate any previous result
            if region != Region::Output {
                unit.memory.unstage(Region::Output);
            }
        }
        debug!(%region, units, len, "region written");
        Ok(())
    }

    fn write_args(&mut self, args: &[UnitArgs]) -> OffloadResult<()> {
        self.loaded_image()?;
        if args.len() != self.unit_count {
            return Err(OffloadError::LengthMismatch {
                op: "unit args",
                lhs: self.unit_count,
                rhs: args.len(),
            });
        }
        for (unit, &record) in self.units.iter_mut().zip(args) {
            unit.args = Some(record);
        }
        Ok(())
    }

    fn write_mode(&mut self, code: u32) -> OffloadResult<()> {
        self.loaded_image()?;
        self.mode_code = Some(code);
        Ok(())
    }

    fn execute(&mut self) -> OffloadResult<()> {
        let q = self.loaded_image()?.q;
        let mode = OpMode::from_code(self.mode_code.ok_or(OffloadError::ModeNotWritten)?)?;

        for (d, unit) in self.units.iter().enumerate() {
            let args = unit.args.ok_or(OffloadError::ArgsNotWritten { unit: d })?;
            if args.length as usize > self.capacity {
                return Err(OffloadError::CapacityExceeded {
                    unit: d,
                    length: args.length as usize,
                    capacity: self.capacity,
                });
            }
            for region in [Region::OperandA, Region::OperandB] {
                if !unit.memory.is_staged(region) {
                    return Err(OffloadError::RegionNotStaged { unit: d, region });
                }
            }
        }

        self.units
            .par_iter_mut()
            .enumerate()
            .try_for_each(|(d, unit)| {
                let length = unit.args.map_or(0, |a| a.length as usize);
                execute_unit(d, &mut unit.memory, mode, q, length)?;
                unit.memory.mark_staged(Region::Output);
                Ok::<(), OffloadError>(())
            })?;
        Ok(())
    }

    fn read_region(&self, region: Region, len: usize) -> OffloadResult<Array2<u32>> {
        self.loaded_image()?;
        self.check_shape(self.unit_count, len)?;
        let mut out = Array2::<u32>::zeros((self.unit_count, len));
        for (d, (unit, mut row)) in self.units.iter().zip(out.rows_mut()).enumerate() {
            if !unit.memory.is_staged(region) {
                return Err(OffloadError::RegionNotStaged { unit: d, region });
            }
            row.iter_mut()
                .zip(&unit.memory.region(region)[..len])
                .for_each(|(dst, &src)| *dst = src);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image() -> ProgramImage {
        ProgramImage {
            name: "poly_ops".into(),
            q: 17,
            workers: 2,
            block_size: 2,
        }
    }

    fn loaded_rack(units: usize, capacity: usize) -> LocalRack {
        let mut rack = LocalRack::allocate(units, capacity).unwrap();
        rack.load(&image()).unwrap();
        rack
    }

    #[test]
    fn full_cycle() {
        let mut rack = loaded_rack(2, 4);
        let a = Array2::from_shape_vec((2, 3), vec![1, 2, 3, 4, 5, 16]).unwrap();
        let b = Array2::from_shape_vec((2, 3), vec![10, 10, 10, 1, 1, 1]).unwrap();
        rack.write_region(Region::OperandA, a.view()).unwrap();
        rack.write_region(Region::OperandB, b.view()).unwrap();
        rack.write_args(&[UnitArgs { length: 3 }, UnitArgs { length: 3 }]).unwrap();
        rack.write_mode(OpMode::Add.code()).unwrap();
        rack.execute().unwrap();
        let out = rack.read_region(Region::Output, 3).unwrap();
        assert_eq!(out.row(0).to_vec(), vec![11, 12, 13]);
        assert_eq!(out.row(1).to_vec(), vec![5, 6, 0]);
    }

    #[test]
    fn output_unreadable_before_execution() {
        let mut rack = loaded_rack(2, 4);
        let a = Array2::<u32>::zeros((2, 4));
        rack.write_region(Region::OperandA, a.view()).unwrap();
        assert!(matches!(
            rack.read_region(Region::Output, 4),
            Err(OffloadError::RegionNotStaged { unit: 0, region: Region::Output })
        ));
    }

    #[test]
    fn execute_requires_every_input() {
        let mut rack = LocalRack::allocate(2, 4).unwrap();
        assert!(matches!(rack.execute(), Err(OffloadError::ProgramNotLoaded)));

        rack.load(&image()).unwrap();
        assert!(matches!(rack.execute(), Err(OffloadError::ModeNotWritten)));

        rack.write_mode(7).unwrap();
        assert!(matches!(rack.execute(), Err(OffloadError::UnknownMode(_))));

        rack.write_mode(OpMode::Mul.code()).unwrap();
        assert!(matches!(rack.execute(), Err(OffloadError::ArgsNotWritten { unit: 0 })));

        rack.write_args(&[UnitArgs { length: 4 }; 2]).unwrap();
        let a = Array2::<u32>::ones((2, 4));
        rack.write_region(Region::OperandA, a.view()).unwrap();
        assert!(matches!(
            rack.execute(),
            Err(OffloadError::RegionNotStaged { unit: 0, region: Region::OperandB })
        ));

        rack.write_region(Region::OperandB, a.view()).unwrap();
        rack.execute().unwrap();
    }

    #[test]
    fn shape_and_capacity_enforced() {
        let mut rack = loaded_rack(2, 4);
        let wide = Array2::<u32>::zeros((2, 5));
        let tall = Array2::<u32>::zeros((3, 4));
        assert!(matches!(
            rack.write_region(Region::OperandA, wide.view()),
            Err(OffloadError::BufferShape { len: 5, .. })
        ));
        assert!(rack.write_region(Region::OperandA, tall.view()).is_err());
        assert!(rack.write_args(&[UnitArgs { length: 1 }]).is_err());

        rack.write_args(&[UnitArgs { length: 5 }; 2]).unwrap();
        rack.write_mode(0).unwrap();
        assert!(matches!(rack.execute(), Err(OffloadError::CapacityExceeded { unit: 0, .. })));
    }

    #[test]
    fn non_contiguous_rows_are_staged() {
        let mut rack = loaded_rack(2, 3);
        let cols = Array2::from_shape_vec((3, 2), vec![1, 4, 2, 5, 3, 6]).unwrap();
        rack.write_region(Region::OperandA, cols.t()).unwrap();
        rack.write_region(Region::OperandB, Array2::<u32>::ones((2, 3)).view()).unwrap();
        rack.write_args(&[UnitArgs { length: 3 }; 2]).unwrap();
        rack.write_mode(OpMode::Mul.code()).unwrap();
        rack.execute().unwrap();
        let out = rack.read_region(Region::Output, 3).unwrap();
        assert_eq!(out.row(1).to_vec(), vec![4, 5, 6]);
    }

    #[test]
    fn zero_units_rejected() {
        assert!(LocalRack::allocate(0, 8).is_err());
    }
}
