//! Schema module - Configuration, gene and result types for fuzzing runs.

mod config;
mod evolution;
mod gene;

pub use config::*;
pub use evolution::*;
pub use gene::*;
