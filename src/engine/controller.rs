// Controller
// Host side: generate, partition, dispatch, merge, verify
use std::fmt;
use std::io::Write;

use ndarray::Array2;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::engine::config::OffloadConfig;
use crate::engine::error::{OffloadError, OffloadResult};
use crate::engine::io::{LocalRack, ProgramImage, Region, UnitArgs, UnitTransport};
use crate::engine::kernels::{self, OpMode};
use crate::engine::partition::PartitionTable;
use crate::engine::poly::{Poly, PolyParams, UniformGenerator};
use crate::engine::timing::{RunContext, TimingReport};

pub const PROGRAM_NAME: &str = "poly_elementwise";

/// Seed tweak for the second operand. Sets a bit no coefficient index reaches,
/// so the two operands never share a hash input.
const OPERAND_B_TWEAK: u64 = 1 << 63;

/// Outcome of comparing the merged result against the reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Verdict {
    Pass,
    Fail {
        first_index: usize,
        expected: u32,
        actual: u32,
        mismatches: usize,
    },
}

impl Verdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Pass => write!(f, "[OK] Equal"),
            Verdict::Fail {
                first_index,
                expected,
                actual,
                mismatches,
            } => write!(
                f,
                "[ERROR] Not same: index {first_index} expected {expected}, got {actual} ({mismatches} mismatching)"
            ),
        }
    }
}

/// Elementwise comparison. Differing parameters are an error, not a `Fail`.
pub fn compare(reference: &Poly, candidate: &Poly) -> OffloadResult<Verdict> {
    reference.check_compatible(candidate, "compare")?;
    let mut diffs = reference
        .coeffs()
        .iter()
        .zip(candidate.coeffs())
        .enumerate()
        .filter(|(_, (x, y))| x != y);

    let Some((first_index, (&expected, &actual))) = diffs.next() else {
        return Ok(Verdict::Pass);
    };
    Ok(Verdict::Fail {
        first_index,
        expected,
        actual,
        mismatches: 1 + diffs.count(),
    })
}

/// The two seeded input operands for a run.
pub fn generate_operands(params: PolyParams, seed: u64) -> (Poly, Poly) {
    let a = Poly::sample(params, &UniformGenerator::new(seed));
    let b = Poly::sample(params, &UniformGenerator::new(seed ^ OPERAND_B_TWEAK));
    (a, b)
}

/// Result of one partition-dispatch-merge pass.
#[derive(Debug, Clone)]
pub struct Offloaded {
    pub merged: Poly,
    pub table: PartitionTable,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub verdict: Verdict,
    pub reference: Poly,
    pub merged: Poly,
    pub table: PartitionTable,
    pub timing: TimingReport,
}

pub struct OffloadController<T: UnitTransport> {
    transport: T,
    config: OffloadConfig,
}

impl OffloadController<LocalRack> {
    /// Controller over an in-process rack sized from `config`.
    pub fn local(config: OffloadConfig) -> OffloadResult<Self> {
        config.validate()?;
        let rack = LocalRack::allocate(config.units, config.unit_capacity)?;
        Self::new(rack, config)
    }
}

impl<T: UnitTransport> OffloadController<T> {
    pub fn new(transport: T, config: OffloadConfig) -> OffloadResult<Self> {
        config.validate()?;
        Ok(Self { transport, config })
    }

    pub fn config(&self) -> &OffloadConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn image(&self) -> ProgramImage {
        ProgramImage {
            name: PROGRAM_NAME.to_string(),
            q: self.config.q,
            workers: self.config.workers,
            block_size: self.config.block_size,
        }
    }

    /// Full run: generate inputs, compute the reference, offload, verify.
    ///
    /// A mismatch is reported in the outcome; only configuration and
    /// transport errors abort. The timing report goes to `sink` on every exit
    /// path.
    pub fn run(&mut self, sink: Option<Box<dyn Write + Send>>) -> OffloadResult<RunOutcome> {
        let mut ctx = RunContext::acquire(sink);
        let mode = self.config.mode;
        let params = PolyParams::new(self.config.n, self.config.q)?;
        let (a, b) = generate_operands(params, self.config.seed);

        let reference = {
            let _t = ctx.phase(mode.reference_phase());
            a.apply(&b, mode)?
        };

        let Offloaded { merged, table } = self.offload(&a, &b, mode, &mut ctx)?;

        let verdict = {
            let _t = ctx.phase("verify");
            compare(&reference, &merged)?
        };
        match &verdict {
            Verdict::Pass => info!(n = params.n, units = table.units(), %mode, "{}", verdict),
            Verdict::Fail { .. } => warn!(n = params.n, units = table.units(), %mode, "{}", verdict),
        }

        Ok(RunOutcome {
            verdict,
            reference,
            merged,
            table,
            timing: ctx.finish(),
        })
    }

    /// Partitions `a` and `b` over the transport's units, runs `mode` on every
    /// unit and merges the per-unit outputs back into global order.
    pub fn offload(
        &mut self,
        a: &Poly,
        b: &Poly,
        mode: OpMode,
        ctx: &mut RunContext,
    ) -> OffloadResult<Offloaded> {
        a.check_compatible(b, "offload operands")?;
        let params = *a.params();
        if params.q != self.config.q {
            return Err(OffloadError::ParamMismatch {
                op: "offload modulus",
                lhs_n: params.n,
                lhs_q: params.q,
                rhs_n: self.config.n,
                rhs_q: self.config.q,
            });
        }
        kernels::check_reduced(params.q, a.coeffs())?;
        kernels::check_reduced(params.q, b.coeffs())?;

        let table = PartitionTable::new(params.n, self.transport.unit_count())?;
        table.check_capacity(self.transport.capacity())?;

        let units = table.units();
        let chunk = table.chunk();
        let mut in_a = Array2::<u32>::zeros((units, chunk));
        let mut in_b = Array2::<u32>::zeros((units, chunk));
        let mut args = Vec::with_capacity(units);
        for assignment in table.iter() {
            let range = assignment.range();
            let d = assignment.unit;
            for (dst, &src) in in_a.row_mut(d).iter_mut().zip(&a.coeffs()[range.clone()]) {
                *dst = src;
            }
            for (dst, &src) in in_b.row_mut(d).iter_mut().zip(&b.coeffs()[range]) {
                *dst = src;
            }
            args.push(UnitArgs {
                length: assignment.length as u32,
            });
            debug!(unit = d, offset = assignment.offset, length = assignment.length, "unit assignment");
        }

        let image = self.image();
        self.transport.load(&image)?;

        {
            let _t = ctx.phase("host_to_unit_copy");
            self.transport.write_region(Region::OperandA, in_a.view())?;
            self.transport.write_region(Region::OperandB, in_b.view())?;
            self.transport.write_args(&args)?;
            self.transport.write_mode(mode.code())?;
        }

        {
            let _t = ctx.phase("unit_exec");
            self.transport.execute()?;
        }

        let out = {
            let _t = ctx.phase("unit_to_host_copy");
            self.transport.read_region(Region::Output, chunk)?
        };

        let merged = {
            let _t = ctx.phase("merge");
            merge(&table, &out, params)?
        };

        info!(units, active = table.active_units(), chunk, "offload complete");
        Ok(Offloaded { merged, table })
    }
}

/// Writes each unit's first `length` outputs back at its offset. Buffer
/// contents past `length` are never read.
pub fn merge(table: &PartitionTable, out: &Array2<u32>, params: PolyParams) -> OffloadResult<Poly> {
    let (units, width) = out.dim();
    if units != table.units() || width < table.chunk() {
        return Err(OffloadError::BufferShape {
            expected_units: table.units(),
            capacity: table.chunk(),
            units,
            len: width,
        });
    }
    let mut merged = vec![0u32; table.n()];
    for assignment in table.iter() {
        let row = out.row(assignment.unit);
        for (dst, &src) in merged[assignment.range()].iter_mut().zip(row.iter()) {
            *dst = src;
        }
    }
    Poly::from_vec(params, merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> OffloadConfig {
        OffloadConfig {
            n: 1000,
            q: 97,
            units: 3,
            workers: 4,
            block_size: 16,
            unit_capacity: 512,
            seed: 7,
            mode: OpMode::Add,
        }
    }

    #[test]
    fn operands_differ_and_are_reproducible() {
        let params = PolyParams::new(256, 65537).unwrap();
        let (a1, b1) = generate_operands(params, 99);
        let (a2, b2) = generate_operands(params, 99);
        assert_eq!(a1, a2);
        assert_eq!(b1, b2);
        assert_ne!(a1, b1);
    }

    #[test]
    fn compare_reports_first_and_count() {
        let params = PolyParams::new(5, 11).unwrap();
        let r = Poly::from_vec(params, vec![1, 2, 3, 4, 5]).unwrap();
        let c = Poly::from_vec(params, vec![1, 9, 3, 0, 5]).unwrap();
        assert_eq!(compare(&r, &r).unwrap(), Verdict::Pass);
        assert_eq!(
            compare(&r, &c).unwrap(),
            Verdict::Fail {
                first_index: 1,
                expected: 2,
                actual: 9,
                mismatches: 2
            }
        );
    }

    #[test]
    fn compare_rejects_param_mismatch() {
        let r = Poly::zero(PolyParams::new(5, 11).unwrap());
        let c = Poly::zero(PolyParams::new(5, 13).unwrap());
        let d = Poly::zero(PolyParams::new(6, 11).unwrap());
        assert!(matches!(compare(&r, &c), Err(OffloadError::ParamMismatch { .. })));
        assert!(compare(&r, &d).is_err());
    }

    #[test]
    fn merge_ignores_trailing_buffer_contents() {
        let table = PartitionTable::new(5, 2).unwrap();
        // chunk = 3; unit 1 holds 2 valid elements then garbage
        let out = Array2::from_shape_vec((2, 3), vec![1, 2, 3, 4, 5, 99]).unwrap();
        let merged = merge(&table, &out, PolyParams::new(5, 100).unwrap()).unwrap();
        assert_eq!(merged.coeffs(), &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn merge_rejects_narrow_buffers() {
        let table = PartitionTable::new(6, 2).unwrap();
        let out = Array2::<u32>::zeros((2, 2));
        assert!(merge(&table, &out, PolyParams::new(6, 7).unwrap()).is_err());
    }

    #[test]
    fn local_run_passes() {
        let mut controller = OffloadController::local(small_config()).unwrap();
        let outcome = controller.run(None).unwrap();
        assert!(outcome.verdict.is_pass());
        assert_eq!(outcome.merged, outcome.reference);
        for phase in ["cpu_compute_addition", "host_to_unit_copy", "unit_exec", "unit_to_host_copy", "merge", "verify"] {
            assert_eq!(outcome.timing.get(phase).map(|s| s.count), Some(1), "{phase}");
        }
    }

    #[test]
    fn capacity_checked_before_dispatch() {
        let config = OffloadConfig {
            unit_capacity: 300,
            ..small_config()
        };
        let mut controller = OffloadController::local(config).unwrap();
        let err = controller.run(None).unwrap_err();
        assert!(matches!(
            err,
            OffloadError::CapacityExceeded { unit: 0, length: 334, capacity: 300 }
        ));
        // Nothing was loaded, so nothing was dispatched
        assert!(controller.transport().image().is_none());
    }

    #[test]
    fn offload_rejects_foreign_modulus() {
        let mut controller = OffloadController::local(small_config()).unwrap();
        let params = PolyParams::new(1000, 101).unwrap();
        let (a, b) = generate_operands(params, 1);
        let mut ctx = RunContext::acquire(None);
        let err = controller.offload(&a, &b, OpMode::Mul, &mut ctx).unwrap_err();
        assert!(matches!(err, OffloadError::ParamMismatch { op: "offload modulus", .. }));
    }
}
