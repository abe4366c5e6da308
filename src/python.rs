// Python bindings
use numpy::{IntoPyArray, PyArray1};
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;

use crate::engine::config::{OffloadConfig, DEFAULT_MODULUS, DEFAULT_POLY_SIZE, DEFAULT_SEED, DEFAULT_UNITS};
use crate::engine::controller::OffloadController;
use crate::engine::error::OffloadError;
use crate::engine::kernels::OpMode;
use crate::engine::partition::PartitionTable;

fn to_py_err(e: OffloadError) -> PyErr {
    match e {
        OffloadError::Arena(_)
        | OffloadError::ProgramNotLoaded
        | OffloadError::ModeNotWritten
        | OffloadError::RegionNotStaged { .. }
        | OffloadError::ArgsNotWritten { .. } => PyRuntimeError::new_err(e.to_string()),
        _ => PyValueError::new_err(e.to_string()),
    }
}

#[pyclass]
pub struct RunController {
    config: OffloadConfig,
}

#[pymethods]
impl RunController {
    #[new]
    #[pyo3(signature = (n = DEFAULT_POLY_SIZE, q = DEFAULT_MODULUS, units = DEFAULT_UNITS, mode = "mul", seed = DEFAULT_SEED))]
    pub fn new(n: usize, q: u32, units: usize, mode: &str, seed: u64) -> PyResult<Self> {
        let mode: OpMode = mode.parse().map_err(to_py_err)?;
        let config = OffloadConfig {
            n,
            q,
            units,
            seed,
            mode,
            ..OffloadConfig::default()
        };
        config.validate().map_err(to_py_err)?;
        Ok(Self { config })
    }

    /// Runs one offload and returns (passed, merged result).
    pub fn run<'py>(&self, py: Python<'py>) -> PyResult<(bool, Bound<'py, PyArray1<u32>>)> {
        let mut controller = OffloadController::local(self.config.clone()).map_err(to_py_err)?;
        let outcome = controller.run(None).map_err(to_py_err)?;
        let merged = outcome.merged.into_coeffs().into_pyarray(py);
        Ok((outcome.verdict.is_pass(), merged))
    }
}

/// Per-unit (offset, length) pairs for `n` elements over `units` units.
#[pyfunction]
fn partition(n: usize, units: usize) -> PyResult<Vec<(usize, usize)>> {
    let table = PartitionTable::new(n, units).map_err(to_py_err)?;
    Ok(table.iter().map(|a| (a.offset, a.length)).collect())
}

/// Python module definition
#[pymodule]
fn pim_polyoffload(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<RunController>()?;
    m.add_function(wrap_pyfunction!(partition, m)?)?;
    Ok(())
}
