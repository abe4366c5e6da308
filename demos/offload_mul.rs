//! Runs one offloaded multiplication and prints the verdict and timing report.
//!
//! `RUST_LOG=debug cargo run --example offload_mul -- '{"units": 16}'`
use pim_polyoffload::{OffloadConfig, OffloadController};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match std::env::args().nth(1) {
        Some(json) => OffloadConfig::from_json_str(&json)?,
        None => OffloadConfig::default(),
    };
    let mut controller = OffloadController::local(config)?;
    let outcome = controller.run(Some(Box::new(std::io::stdout())))?;
    println!("{}", outcome.verdict);
    Ok(())
}
