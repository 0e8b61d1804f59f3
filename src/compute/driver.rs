//! Simulation drive loop: the consumer side of the evaluation bridge.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::compute::bridge::{BridgeError, EvaluationBridge, ScenarioPair};
use crate::schema::{DriveConfig, FitnessVector, FuzzConfig, ScenarioConfig, ScenarioTemplate};

use super::fitness::{FitnessTracker, scenario_diversity};
use super::scenario::ScenarioRuntime;
use super::world::{World, WorldError};

/// Drive loop errors.
#[derive(Debug, thiserror::Error)]
pub enum DriveError {
    #[error(transparent)]
    World(#[from] WorldError),
    #[error(transparent)]
    Bridge(#[from] BridgeError),
    #[error("Failed to start the drive loop thread: {0}")]
    Spawn(#[from] io::Error),
    #[error("Drive loop thread panicked")]
    Panicked,
    #[error("Scenario evaluation was cancelled")]
    Cancelled,
}

/// How a single scenario run ended.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScenarioOutcome {
    Evaluated(FitnessVector),
    Cancelled,
}

/// Pulls scenario pairs from the bridge and runs them in a world.
pub struct EvaluationWorker {
    runtime: ScenarioRuntime,
    bridge: Arc<EvaluationBridge>,
    drive: DriveConfig,
    template: ScenarioTemplate,
}

impl EvaluationWorker {
    pub fn new(world: Arc<dyn World>, bridge: Arc<EvaluationBridge>, config: &FuzzConfig) -> Self {
        Self {
            runtime: ScenarioRuntime::new(world, ScenarioConfig::from(&config.template)),
            bridge,
            drive: config.drive.clone(),
            template: config.template.clone(),
        }
    }

    /// Serve requests until `cancel` is set. Returns how many were evaluated.
    pub fn run(&self, cancel: &AtomicBool) -> Result<usize, DriveError> {
        let idle = Duration::from_millis(self.drive.idle_interval_ms);
        let mut served = 0;

        while !cancel.load(Ordering::Relaxed) {
            let Some(request) = self.bridge.take_next_unevaluated() else {
                thread::sleep(idle);
                continue;
            };

            let outcome = match self.run_scenario(&request.pair, cancel) {
                Ok(outcome) => outcome,
                Err(e) => {
                    log::error!("Scenario {} failed: {e}", request.id);
                    // Best effort; the scheduler may already have cleared it.
                    let _ = self.bridge.release(request.id);
                    return Err(e);
                }
            };

            match outcome {
                ScenarioOutcome::Evaluated(fitness) => {
                    match self.bridge.complete(request.id, fitness) {
                        Ok(()) => served += 1,
                        // Cleared by a scheduler that gave up on the batch.
                        Err(BridgeError::UnknownRequest(id)) => {
                            log::debug!("Request {id} was withdrawn before completion");
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
                ScenarioOutcome::Cancelled => {
                    let _ = self.bridge.release(request.id);
                }
            }
        }

        log::info!("Drive loop stopped after {served} scenarios");
        Ok(served)
    }

    /// Run one scenario to completion and score it.
    pub fn evaluate(&self, pair: &ScenarioPair) -> Result<FitnessVector, DriveError> {
        let never = AtomicBool::new(false);
        match self.run_scenario(pair, &never)? {
            ScenarioOutcome::Evaluated(fitness) => Ok(fitness),
            ScenarioOutcome::Cancelled => Err(DriveError::Cancelled),
        }
    }

    fn run_scenario(
        &self,
        pair: &ScenarioPair,
        cancel: &AtomicBool,
    ) -> Result<ScenarioOutcome, DriveError> {
        let world = self.runtime.world();
        let mut handle = self.runtime.materialize(pair);
        let mut tracker = FitnessTracker::new(&self.drive);

        handle.start();
        for _ in 0..self.drive.scenario_ticks {
            if cancel.load(Ordering::Relaxed) {
                handle.end();
                return Ok(ScenarioOutcome::Cancelled);
            }
            handle.drive_one_tick()?;
            tracker.observe(world.as_ref(), handle.actors(), handle.elapsed());

            if handle.actor_count() > 0 && handle.all_finished() {
                break;
            }
        }

        let duration = handle.elapsed();
        handle.end();

        let diversity = scenario_diversity(pair, &self.template);
        let fitness = tracker.finish(diversity, duration);
        log::debug!(
            "Scenario {} scored after {} ticks: {:?}",
            pair.id,
            tracker.ticks(),
            fitness
        );
        Ok(ScenarioOutcome::Evaluated(fitness))
    }

    /// Run the loop on a background thread.
    pub fn spawn(
        self,
        cancel: Arc<AtomicBool>,
    ) -> Result<JoinHandle<Result<usize, DriveError>>, DriveError> {
        let handle = thread::Builder::new()
            .name("drive_loop".to_string())
            .spawn(move || self.run(&cancel))?;
        Ok(handle)
    }
}
