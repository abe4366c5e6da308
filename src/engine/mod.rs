// Module Definition
pub mod config;
pub mod controller; // Host side: partition, dispatch, merge, verify
pub mod error;
pub mod executor; // Per-unit worker striding over scratch blocks
pub mod io; // Transport interface and in-process rack
pub mod kernels; // Elementwise modular arithmetic
pub mod memory;
pub mod partition;
pub mod poly;
pub mod timing;
