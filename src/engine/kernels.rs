// Computation Kernels
// Elementwise modular arithmetic over equal-length word slices
use std::fmt;
use std::str::FromStr;

use itertools::izip;
use serde::{Deserialize, Serialize};

use crate::engine::error::{OffloadError, OffloadResult};

/// Elementwise operation applied by every unit.
///
/// Travels to the units as a wire code (`0 = Add`, `1 = Mul`); there is no
/// default, an unknown code is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpMode {
    Add,
    Mul,
}

impl OpMode {
    /// Wire code written to the global mode selector.
    pub const fn code(self) -> u32 {
        match self {
            OpMode::Add => 0,
            OpMode::Mul => 1,
        }
    }

    pub fn from_code(code: u32) -> OffloadResult<Self> {
        match code {
            0 => Ok(OpMode::Add),
            1 => Ok(OpMode::Mul),
            other => Err(OffloadError::UnknownMode(format!("code {other}"))),
        }
    }

    /// Timing phase name for the host-side reference computation.
    pub fn reference_phase(self) -> &'static str {
        match self {
            OpMode::Add => "cpu_compute_addition",
            OpMode::Mul => "cpu_compute_multiplication",
        }
    }
}

impl TryFrom<u32> for OpMode {
    type Error = OffloadError;

    fn try_from(code: u32) -> OffloadResult<Self> {
        OpMode::from_code(code)
    }
}

impl FromStr for OpMode {
    type Err = OffloadError;

    fn from_str(name: &str) -> OffloadResult<Self> {
        match name.to_uppercase().as_str() {
            "ADD" => Ok(OpMode::Add),
            "MUL" => Ok(OpMode::Mul),
            _ => Err(OffloadError::UnknownMode(name.to_string())),
        }
    }
}

impl fmt::Display for OpMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpMode::Add => write!(f, "add"),
            OpMode::Mul => write!(f, "mul"),
        }
    }
}

pub trait ReduceOnce {
    /// Returns self-q if self >= q else self.
    /// User must ensure that 2q fits in Self.
    fn reduce_once(self, q: Self) -> Self;
}

impl ReduceOnce for u64 {
    #[inline(always)]
    fn reduce_once(self, q: u64) -> u64 {
        if self >= q {
            self - q
        } else {
            self
        }
    }
}

/// (a + b) mod q for a, b < q. The sum is at most 2q - 2, so one conditional
/// subtraction suffices.
#[inline(always)]
pub fn add_mod(a: u32, b: u32, q: u32) -> u32 {
    (a as u64 + b as u64).reduce_once(q as u64) as u32
}

/// (a * b) mod q with the full 64-bit product formed before reduction.
#[inline(always)]
pub fn mul_mod(a: u32, b: u32, q: u32) -> u32 {
    ((a as u64 * b as u64) % q as u64) as u32
}

/// Applies `mode` elementwise: out[i] = a[i] (op) b[i] mod q.
///
/// Rejects slices of unequal length. Operands must already be reduced below
/// `q`; see [`check_reduced`].
pub fn apply(mode: OpMode, q: u32, a: &[u32], b: &[u32], out: &mut [u32]) -> OffloadResult<()> {
    if a.len() != b.len() {
        return Err(OffloadError::LengthMismatch {
            op: "kernel operands",
            lhs: a.len(),
            rhs: b.len(),
        });
    }
    if a.len() != out.len() {
        return Err(OffloadError::LengthMismatch {
            op: "kernel output",
            lhs: a.len(),
            rhs: out.len(),
        });
    }
    apply_block(mode, q, a, b, out);
    Ok(())
}

/// Hot-loop variant used on staged scratch blocks whose lengths are equal by
/// construction.
#[inline]
pub(crate) fn apply_block(mode: OpMode, q: u32, a: &[u32], b: &[u32], out: &mut [u32]) {
    debug_assert_eq!(a.len(), b.len());
    debug_assert_eq!(a.len(), out.len());
    match mode {
        OpMode::Add => {
            for (o, &x, &y) in izip!(out.iter_mut(), a, b) {
                *o = add_mod(x, y, q);
            }
        }
        OpMode::Mul => {
            for (o, &x, &y) in izip!(out.iter_mut(), a, b) {
                *o = mul_mod(x, y, q);
            }
        }
    }
}

/// Entry-boundary check: every element must lie in [0, q).
pub fn check_reduced(q: u32, values: &[u32]) -> OffloadResult<()> {
    match values.iter().position(|&v| v >= q) {
        Some(index) => Err(OffloadError::NotReduced {
            index,
            value: values[index],
            q,
        }),
        None => Ok(()),
    }
}
