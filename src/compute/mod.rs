//! Compute module - Scenario execution, evaluation hand-off, search and its
//! supervision.

mod bridge;
mod campaign;
mod driver;
mod fitness;
mod kinematic;
mod scenario;
mod sink;
mod world;

pub mod evolution;

pub use bridge::*;
pub use campaign::*;
pub use driver::*;
pub use fitness::*;
pub use kinematic::*;
pub use scenario::*;
pub use sink::*;
pub use world::*;
