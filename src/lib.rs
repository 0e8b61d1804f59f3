//! ms-fuzz - Co-evolutionary NPC scenario fuzzing for autonomous driving.
//!
//! A genetic algorithm evolves two cooperating populations, pedestrians and
//! vehicles, towards scenarios that stress the vehicle under test. Each
//! walker/vehicle pair is handed to a drive loop that spawns the NPCs in a
//! simulated world and runs one control thread per actor, in lock-step with
//! the world's ticks.
//!
//! # Architecture
//!
//! The crate is split into two main modules:
//!
//! - `schema`: Configuration, gene and result types
//! - `compute`: World interface, scenario runtime, evaluation bridge, drive
//!   loop and the co-evolutionary search (`compute::evolution`)
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ms_fuzz::{
//!     compute::{Campaign, EvaluationBridge, EvaluationWorker, KinematicWorld, evolution::CoEvolution},
//!     schema::{FuzzConfig, Location},
//! };
//!
//! let config = FuzzConfig::default();
//! let bridge = Arc::new(EvaluationBridge::new(config.bridge.clone()));
//!
//! let world = Arc::new(
//!     KinematicWorld::new(config.drive.fixed_delta_seconds)
//!         .with_ego(Location::new(-15.0, 0.0, 0.0), 8.0),
//! );
//! let worker = EvaluationWorker::new(world, Arc::clone(&bridge), &config);
//! let engine = CoEvolution::new(config, bridge).unwrap();
//!
//! // Search and drive loop on their own threads; a failing drive loop
//! // cancels the search.
//! let result = Campaign::new(engine, worker).run().unwrap();
//! println!("Vehicle front: {}", result.vehicle_archive.members.len());
//! ```

pub mod compute;
pub mod schema;

// Re-export commonly used types
pub use compute::evolution::{CoEvolution, CoEvolutionHandle, EngineError};
pub use compute::{Campaign, EvaluationBridge, EvaluationWorker, ScenarioRuntime, World};
pub use schema::{FitnessVector, FuzzConfig, NpcGene};
