// Error Taxonomy
use crate::engine::memory::Region;

/// Errors raised before or around dispatch.
///
/// Every variant is a configuration or interface-misuse error that aborts the
/// run before any unit is invoked. A result mismatch is *not* an error: it is
/// reported through [`crate::engine::controller::Verdict`].
#[derive(Debug, thiserror::Error)]
pub enum OffloadError {
    #[error("Unit {unit} assigned {length} elements, capacity is {capacity}")]
    CapacityExceeded {
        unit: usize,
        length: usize,
        capacity: usize,
    },

    #[error("Unrecognized operation mode: {0}")]
    UnknownMode(String),

    #[error("Parameter mismatch in {op}: (n={lhs_n}, q={lhs_q}) vs (n={rhs_n}, q={rhs_q})")]
    ParamMismatch {
        op: &'static str,
        lhs_n: usize,
        lhs_q: u32,
        rhs_n: usize,
        rhs_q: u32,
    },

    #[error("Slice length mismatch in {op}: {lhs} vs {rhs}")]
    LengthMismatch {
        op: &'static str,
        lhs: usize,
        rhs: usize,
    },

    #[error("Operand not reduced: element {index} = {value} is not below q = {q}")]
    NotReduced { index: usize, value: u32, q: u32 },

    #[error("Modulus must be non-zero and fit in 32 bits, got {0}")]
    InvalidModulus(u64),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("No program image loaded")]
    ProgramNotLoaded,

    #[error("Operation mode was never written to the units")]
    ModeNotWritten,

    #[error("Unit {unit}: region {region} not staged before execution")]
    RegionNotStaged { unit: usize, region: Region },

    #[error("Unit {unit}: argument record not written before execution")]
    ArgsNotWritten { unit: usize },

    #[error("Buffer shape mismatch: expected {expected_units} units x at most {capacity}, got {units} x {len}")]
    BufferShape {
        expected_units: usize,
        capacity: usize,
        units: usize,
        len: usize,
    },

    #[error("Unit memory allocation failed: {0}")]
    Arena(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Config(#[from] serde_json::Error),
}

pub type OffloadResult<T> = Result<T, OffloadError>;
