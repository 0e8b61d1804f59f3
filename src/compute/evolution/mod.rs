//! Co-evolutionary search over walker and vehicle NPC populations.
//!
//! # Overview
//!
//! - **Populations** (`population`): per-species gene containers with fitness
//! - **Genome Operations** (`genome`): random generation, crossover, and mutation
//! - **Selection** (`nsga2`): non-dominated sorting with crowding distance
//! - **Pareto Archive** (`archive`): running hall of fame per species
//! - **Search Loop** (`search`): the generational loop and its background handle
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ms_fuzz::compute::EvaluationBridge;
//! use ms_fuzz::compute::evolution::CoEvolution;
//! use ms_fuzz::schema::FuzzConfig;
//!
//! let config = FuzzConfig::default();
//! let bridge = Arc::new(EvaluationBridge::new(config.bridge.clone()));
//!
//! // A drive loop must be consuming `bridge` on another thread.
//! let mut engine = CoEvolution::new(config, bridge).unwrap();
//! let result = engine
//!     .run_with_callback(|progress| {
//!         println!(
//!             "Generation {}: best distance = {:.2}",
//!             progress.generation, progress.best_min_distance
//!         );
//!     })
//!     .unwrap();
//!
//! println!("Vehicle front: {}", result.vehicle_archive.members.len());
//! ```

mod archive;
mod genome;
mod nsga2;
mod population;
mod search;

pub use archive::*;
pub use genome::*;
pub use nsga2::*;
pub use population::*;
pub use search::*;
