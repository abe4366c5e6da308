// Run Configuration
use serde::{Deserialize, Serialize};

use crate::engine::error::{OffloadError, OffloadResult};
use crate::engine::kernels::OpMode;

pub const DEFAULT_POLY_SIZE: usize = 65536;
pub const DEFAULT_MODULUS: u32 = 65537;
pub const DEFAULT_UNITS: usize = 4;
pub const DEFAULT_WORKERS: usize = 16;
pub const DEFAULT_BLOCK_SIZE: usize = 64;
pub const DEFAULT_SEED: u64 = 0xdead_beef;

/// Everything one run needs. Missing JSON fields take the defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OffloadConfig {
    /// Polynomial length.
    pub n: usize,
    pub q: u32,
    pub units: usize,
    /// Workers per unit.
    pub workers: usize,
    pub block_size: usize,
    /// Words provisioned per region per unit.
    pub unit_capacity: usize,
    pub seed: u64,
    pub mode: OpMode,
}

impl Default for OffloadConfig {
    fn default() -> Self {
        Self {
            n: DEFAULT_POLY_SIZE,
            q: DEFAULT_MODULUS,
            units: DEFAULT_UNITS,
            workers: DEFAULT_WORKERS,
            block_size: DEFAULT_BLOCK_SIZE,
            unit_capacity: DEFAULT_POLY_SIZE,
            seed: DEFAULT_SEED,
            mode: OpMode::Mul,
        }
    }
}

impl OffloadConfig {
    pub fn from_json_str(json: &str) -> OffloadResult<Self> {
        let config: OffloadConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_mode(mut self, mode: OpMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_units(mut self, units: usize) -> Self {
        self.units = units;
        self
    }

    pub fn with_size(mut self, n: usize) -> Self {
        self.n = n;
        self
    }

    pub fn validate(&self) -> OffloadResult<()> {
        if self.q == 0 {
            return Err(OffloadError::InvalidModulus(0));
        }
        if self.units == 0 {
            return Err(OffloadError::InvalidConfig("units must be at least 1".into()));
        }
        if self.workers == 0 || self.block_size == 0 {
            return Err(OffloadError::InvalidConfig(format!(
                "workers and block_size must be non-zero, got {} x {}",
                self.workers, self.block_size
            )));
        }
        if self.unit_capacity > u32::MAX as usize {
            return Err(OffloadError::InvalidConfig(format!(
                "unit_capacity {} does not fit the 32-bit length record",
                self.unit_capacity
            )));
        }
        Ok(())
    }
}
