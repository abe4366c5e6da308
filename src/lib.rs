//! Elementwise modular polynomial arithmetic offloaded to a set of
//! bounded-memory compute units.
//!
//! The host splits both operands with a [`PartitionTable`], stages one chunk
//! per unit through a [`UnitTransport`], lets every unit stream its chunk
//! through per-worker scratch blocks, then merges the outputs and checks them
//! against a locally computed reference.

pub mod engine;

#[cfg(feature = "python")]
mod python;

pub use engine::config::OffloadConfig;
pub use engine::controller::{compare, generate_operands, OffloadController, RunOutcome, Verdict};
pub use engine::error::{OffloadError, OffloadResult};
pub use engine::io::{LocalRack, ProgramImage, Region, UnitArgs, UnitTransport};
pub use engine::kernels::OpMode;
pub use engine::partition::{PartitionTable, UnitAssignment};
pub use engine::poly::{Poly, PolyFormat, PolyParams, UniformGenerator};
pub use engine::timing::{RunContext, TimingReport};
