//! Co-evolutionary generational loop (CEGA).
//!
//! Two species, walkers and vehicles, evolve side by side. Offspring are
//! paired by index and evaluated together through the [`EvaluationBridge`].

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::compute::bridge::{AwaitOutcome, BridgeError, EvaluationBridge};
use crate::compute::sink::{FitnessSink, LogSink};
use crate::schema::{
    CoEvolutionResult, ConfigError, EvolutionHistory, EvolutionPhase, EvolutionProgress,
    EvolutionStats, FuzzConfig, GaConfig, GenerationSnapshot, Species, StopReason,
    species_objectives,
};

use super::archive::ParetoArchive;
use super::genome::{GeneRng, GeneSpace, VariationError};
use super::nsga2::select_nsga2;
use super::population::Population;

/// Errors that abort a co-evolution run.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Variation(#[from] VariationError),
    #[error(transparent)]
    Bridge(#[from] BridgeError),
    #[error("Initial evaluation was not picked up within {waited:?}")]
    EvaluationTimeout { waited: Duration },
    #[error("Offspring batches differ in length ({walkers} walkers, {vehicles} vehicles)")]
    MismatchedBatch { walkers: usize, vehicles: usize },
    #[error("Failed to start the co-evolution thread: {0}")]
    Spawn(#[from] io::Error),
    #[error("Co-evolution thread panicked")]
    Panicked,
}

/// Co-evolution engine that runs the search.
pub struct CoEvolution {
    config: FuzzConfig,
    space: GeneSpace,
    rng: GeneRng,
    bridge: Arc<EvaluationBridge>,
    sink: Box<dyn FitnessSink>,
    walkers: Vec<Population>,
    vehicles: Vec<Population>,
    walker_archive: ParetoArchive,
    vehicle_archive: ParetoArchive,
    history: EvolutionHistory,
    generation: usize,
    evaluations: usize,
    phase: EvolutionPhase,
    cancelled: Arc<AtomicBool>,
}

impl CoEvolution {
    /// Create a new engine that evaluates through `bridge`.
    pub fn new(config: FuzzConfig, bridge: Arc<EvaluationBridge>) -> Result<Self, EngineError> {
        config.validate()?;

        let seed = config.ga.random_seed.unwrap_or_else(rand::random);
        let archive_max = config.ga.archive_max_size;

        Ok(Self {
            space: GeneSpace::from_config(&config),
            rng: GeneRng::new(seed),
            bridge,
            sink: Box::new(LogSink),
            walkers: Vec::new(),
            vehicles: Vec::new(),
            walker_archive: ParetoArchive::new(Species::Walker, archive_max),
            vehicle_archive: ParetoArchive::new(Species::Vehicle, archive_max),
            history: EvolutionHistory::default(),
            generation: 0,
            evaluations: 0,
            phase: EvolutionPhase::Initializing,
            cancelled: Arc::new(AtomicBool::new(false)),
            config,
        })
    }

    /// Replace the default [`LogSink`].
    pub fn with_sink(mut self, sink: Box<dyn FitnessSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Get cancellation handle.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    pub fn walkers(&self) -> &[Population] {
        &self.walkers
    }

    pub fn vehicles(&self) -> &[Population] {
        &self.vehicles
    }

    /// Build fresh random populations for both species.
    pub fn initialize(&mut self) {
        self.generation = 0;
        self.phase = EvolutionPhase::Initializing;

        let size = self.config.ga.population_size;
        self.walkers = (0..size)
            .map(|i| self.rng.random_population(Species::Walker, 0, i, &self.space))
            .collect();
        self.vehicles = (0..size)
            .map(|i| self.rng.random_population(Species::Vehicle, 0, i, &self.space))
            .collect();
    }

    /// Evaluate every index pair where either side lacks fitness.
    ///
    /// Returns `Ok(false)` when cancelled. On error the batch is cleared
    /// from the bridge before returning.
    fn evaluate_batch(
        &mut self,
        generation: usize,
        walkers: &mut [Population],
        vehicles: &mut [Population],
        claim_timeout: Option<Duration>,
    ) -> Result<bool, EngineError> {
        if walkers.len() != vehicles.len() {
            return Err(EngineError::MismatchedBatch {
                walkers: walkers.len(),
                vehicles: vehicles.len(),
            });
        }

        let needed: Vec<usize> = (0..walkers.len())
            .filter(|&i| !walkers[i].is_evaluated() || !vehicles[i].is_evaluated())
            .collect();
        if needed.is_empty() {
            return Ok(true);
        }

        self.phase = EvolutionPhase::Evaluating;
        let ids = self.bridge.submit(
            generation,
            needed
                .iter()
                .map(|&i| (walkers[i].clone(), vehicles[i].clone())),
        );

        let outcome = self
            .bridge
            .await_all_within(&ids, &self.cancelled, claim_timeout);
        self.bridge.clear(&ids);

        let fitness = match outcome {
            Ok(AwaitOutcome::Completed(fitness)) => fitness,
            Ok(AwaitOutcome::Cancelled) => return Ok(false),
            Err(BridgeError::ClaimTimeout { waited }) => {
                return Err(EngineError::EvaluationTimeout { waited });
            }
            Err(e) => return Err(e.into()),
        };

        for (&i, f) in needed.iter().zip(fitness) {
            walkers[i].fitness = Some(f);
            vehicles[i].fitness = Some(f);
            self.sink.record_individual(&walkers[i].to_record());
            self.sink.record_individual(&vehicles[i].to_record());
        }
        self.evaluations += needed.len();
        Ok(true)
    }

    /// Evaluate the initial populations under the claim timeout.
    fn evaluate_initial(&mut self) -> Result<bool, EngineError> {
        let timeout = Some(self.bridge.claim_timeout());
        let mut walkers = std::mem::take(&mut self.walkers);
        let mut vehicles = std::mem::take(&mut self.vehicles);

        let result = self.evaluate_batch(0, &mut walkers, &mut vehicles, timeout);
        self.walkers = walkers;
        self.vehicles = vehicles;

        if result? {
            self.walker_archive.update(&self.walkers);
            self.vehicle_archive.update(&self.vehicles);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Run one vary/evaluate/archive/select cycle.
    ///
    /// Returns `Ok(false)` if cancelled while the batch was in flight; the
    /// populations, archives and generation counter are then left as they
    /// were.
    fn step_generation(&mut self) -> Result<bool, EngineError> {
        let generation = self.generation + 1;

        let mut walker_offspring = vary(
            &mut self.rng,
            &self.space,
            &self.config.ga,
            &self.walkers,
            generation,
        )?;
        let mut vehicle_offspring = vary(
            &mut self.rng,
            &self.space,
            &self.config.ga,
            &self.vehicles,
            generation,
        )?;

        if !self.evaluate_batch(generation, &mut walker_offspring, &mut vehicle_offspring, None)? {
            return Ok(false);
        }

        self.phase = EvolutionPhase::Selecting;
        self.walker_archive.update(&walker_offspring);
        self.vehicle_archive.update(&vehicle_offspring);

        let size = self.config.ga.population_size;
        let pool: Vec<_> = std::mem::take(&mut self.walkers)
            .into_iter()
            .chain(walker_offspring)
            .collect();
        self.walkers = select_nsga2(pool, size, species_objectives(Species::Walker));

        let pool: Vec<_> = std::mem::take(&mut self.vehicles)
            .into_iter()
            .chain(vehicle_offspring)
            .collect();
        self.vehicles = select_nsga2(pool, size, species_objectives(Species::Vehicle));

        self.generation = generation;
        Ok(true)
    }

    /// Lowest minimum distance among the current populations.
    fn best_min_distance(&self) -> f32 {
        self.walkers
            .iter()
            .chain(self.vehicles.iter())
            .filter_map(|p| p.fitness)
            .map(|f| f.min_distance())
            .fold(f32::INFINITY, f32::min)
    }

    fn record_generation(&mut self) {
        let best = self.best_min_distance();
        self.history.walker_front_size.push(self.walker_archive.len());
        self.history.vehicle_front_size.push(self.vehicle_archive.len());
        self.history.best_min_distance.push(best);
        self.history.evaluations.push(self.evaluations);

        self.sink.record_generation(&GenerationSnapshot {
            generation: self.generation,
            walker_archive: self.walker_archive.snapshot(),
            vehicle_archive: self.vehicle_archive.snapshot(),
            evaluations: self.evaluations,
        });
    }

    /// Get current progress.
    pub fn progress(&self) -> EvolutionProgress {
        EvolutionProgress {
            generation: self.generation,
            total_generations: self.config.ga.max_generations,
            evaluations_completed: self.evaluations,
            walker_front_size: self.walker_archive.len(),
            vehicle_front_size: self.vehicle_archive.len(),
            best_min_distance: self.best_min_distance(),
            phase: self.phase,
        }
    }

    /// Check if evolution should stop.
    fn should_stop(&self) -> Option<StopReason> {
        if self.cancelled.load(Ordering::Relaxed) {
            return Some(StopReason::Cancelled);
        }

        if self.generation >= self.config.ga.max_generations {
            return Some(StopReason::MaxGenerations);
        }

        None
    }

    fn evolve<F>(&mut self, callback: &mut F) -> Result<StopReason, EngineError>
    where
        F: FnMut(&EvolutionProgress),
    {
        if !self.evaluate_initial()? {
            return Ok(StopReason::Cancelled);
        }
        self.record_generation();
        callback(&self.progress());

        loop {
            if let Some(reason) = self.should_stop() {
                return Ok(reason);
            }
            if !self.step_generation()? {
                return Ok(StopReason::Cancelled);
            }

            log::info!(
                "Generation {}/{}: archives walker={} vehicle={}, best distance {:.2}",
                self.generation,
                self.config.ga.max_generations,
                self.walker_archive.len(),
                self.vehicle_archive.len(),
                self.best_min_distance()
            );
            self.record_generation();
            callback(&self.progress());
        }
    }

    /// Run evolution with progress callback.
    pub fn run_with_callback<F>(&mut self, mut callback: F) -> Result<CoEvolutionResult, EngineError>
    where
        F: FnMut(&EvolutionProgress),
    {
        let start_time = Instant::now();

        self.initialize();
        callback(&self.progress());

        let stop_reason = match self.evolve(&mut callback) {
            Ok(reason) => reason,
            Err(e) => {
                self.phase = EvolutionPhase::Stopped;
                log::error!("Co-evolution aborted at generation {}: {e}", self.generation);
                return Err(e);
            }
        };

        self.phase = match stop_reason {
            StopReason::MaxGenerations => EvolutionPhase::Complete,
            StopReason::Cancelled => EvolutionPhase::Stopped,
        };
        callback(&self.progress());

        let elapsed = start_time.elapsed().as_secs_f64();
        log::info!(
            "Co-evolution finished after {} generations ({:?}, {} evaluations, {:.1}s)",
            self.generation,
            stop_reason,
            self.evaluations,
            elapsed
        );

        Ok(CoEvolutionResult {
            walker_archive: self.walker_archive.snapshot(),
            vehicle_archive: self.vehicle_archive.snapshot(),
            stats: EvolutionStats {
                generations: self.generation,
                total_evaluations: self.evaluations,
                elapsed_seconds: elapsed,
                stop_reason,
            },
            history: self.history.clone(),
        })
    }

    /// Run evolution (blocking).
    pub fn run(&mut self) -> Result<CoEvolutionResult, EngineError> {
        self.run_with_callback(|_| {})
    }

    /// Run evolution on a background thread.
    pub fn spawn(self) -> Result<CoEvolutionHandle, EngineError> {
        self.spawn_with_callback(|_| {})
    }

    /// Run evolution on a background thread; `callback` is invoked there.
    pub fn spawn_with_callback<F>(mut self, callback: F) -> Result<CoEvolutionHandle, EngineError>
    where
        F: FnMut(&EvolutionProgress) + Send + 'static,
    {
        let cancel = self.cancel_handle();
        let join = thread::Builder::new()
            .name("cega".to_string())
            .spawn(move || self.run_with_callback(callback))?;
        Ok(CoEvolutionHandle { cancel, join })
    }
}

/// Produce one offspring batch by crossover, mutation or reproduction.
fn vary(
    rng: &mut GeneRng,
    space: &GeneSpace,
    ga: &GaConfig,
    parents: &[Population],
    generation: usize,
) -> Result<Vec<Population>, VariationError> {
    let mut offspring = Vec::with_capacity(ga.offspring_count);
    if parents.is_empty() {
        return Ok(offspring);
    }

    for index in 0..ga.offspring_count {
        let p = rng.unit();
        let child = if p < ga.crossover_prob {
            let (a, b) = rng.index_pair(parents.len());
            rng.crossover(&parents[a], &parents[b], generation, index)?
        } else if p < ga.crossover_prob + ga.mutation_prob {
            let mut child = parents[rng.index(parents.len())].clone();
            child.relabel(generation, index);
            rng.mutate(&mut child, space);
            child
        } else {
            let mut child = parents[rng.index(parents.len())].clone();
            child.relabel(generation, index);
            child
        };
        offspring.push(child);
    }

    Ok(offspring)
}

/// Handle to a co-evolution run on its own thread.
pub struct CoEvolutionHandle {
    cancel: Arc<AtomicBool>,
    join: JoinHandle<Result<CoEvolutionResult, EngineError>>,
}

impl CoEvolutionHandle {
    /// Ask the run to stop; in-flight waits return promptly.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the run to end.
    pub fn join(self) -> Result<CoEvolutionResult, EngineError> {
        self.join.join().map_err(|_| EngineError::Panicked)?
    }
}
