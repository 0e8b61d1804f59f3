//! Supervised campaign: the search and the drive loop on their own threads,
//! torn down together.
//!
//! Without a drive loop the search waits on the bridge indefinitely, so the
//! supervisor cancels the search as soon as the drive loop exits.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crate::schema::{CoEvolutionResult, EvolutionProgress};

use super::driver::{DriveError, EvaluationWorker};
use super::evolution::{CoEvolution, EngineError};

const DEFAULT_WATCH_INTERVAL: Duration = Duration::from_millis(20);

/// Errors that end a supervised campaign.
#[derive(Debug, thiserror::Error)]
pub enum CampaignError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("Drive loop failed: {0}")]
    Drive(#[from] DriveError),
}

/// One search paired with one drive loop over a shared bridge.
pub struct Campaign {
    engine: CoEvolution,
    worker: EvaluationWorker,
    watch_interval: Duration,
}

impl Campaign {
    pub fn new(engine: CoEvolution, worker: EvaluationWorker) -> Self {
        Self {
            engine,
            worker,
            watch_interval: DEFAULT_WATCH_INTERVAL,
        }
    }

    /// How often the supervisor checks both threads.
    pub fn with_watch_interval(mut self, interval: Duration) -> Self {
        self.watch_interval = interval;
        self
    }

    /// Run to completion (blocking).
    pub fn run(self) -> Result<CoEvolutionResult, CampaignError> {
        self.run_with_callback(|_| {})
    }

    /// Run to completion; `callback` is invoked on the search thread.
    ///
    /// A drive loop failure cancels the search and is returned in preference
    /// to the search's own outcome.
    pub fn run_with_callback<F>(self, callback: F) -> Result<CoEvolutionResult, CampaignError>
    where
        F: FnMut(&EvolutionProgress) + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let worker = self.worker.spawn(Arc::clone(&stop))?;
        let engine = match self.engine.spawn_with_callback(callback) {
            Ok(handle) => handle,
            Err(e) => {
                stop.store(true, Ordering::Relaxed);
                let _ = worker.join();
                return Err(e.into());
            }
        };

        // The drive loop only returns on its own when it failed.
        while !engine.is_finished() {
            if worker.is_finished() {
                log::warn!("Drive loop exited during the search; cancelling");
                engine.cancel();
                break;
            }
            thread::sleep(self.watch_interval);
        }

        stop.store(true, Ordering::Relaxed);
        let drive = worker.join().map_err(|_| DriveError::Panicked).and_then(|r| r);
        let search = engine.join();

        match drive {
            Ok(served) => {
                log::info!("Drive loop served {served} scenarios");
                Ok(search?)
            }
            Err(e) => {
                if let Err(search_error) = search {
                    log::error!("Search also failed: {search_error}");
                }
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;
    use std::time::Instant;

    use crate::compute::world::{
        ActorId, Blueprint, EgoState, LaneKind, NavigationAgent, Transform, VehicleControl, World,
        WorldError,
    };
    use crate::compute::{EvaluationBridge, KinematicWorld};
    use crate::schema::{
        BridgeConfig, DrivingProfile, FuzzConfig, Location, StopReason, Vector3,
    };

    /// Kinematic world whose connection drops after a fixed number of ticks.
    struct FailingWorld {
        inner: KinematicWorld,
        ticks: AtomicU64,
        fail_after: u64,
    }

    impl World for FailingWorld {
        fn tick(&self) -> Result<u64, WorldError> {
            if self.ticks.fetch_add(1, Ordering::Relaxed) >= self.fail_after {
                return Err(WorldError::Tick("connection lost".to_string()));
            }
            self.inner.tick()
        }

        fn elapsed_seconds(&self) -> f64 {
            self.inner.elapsed_seconds()
        }

        fn project_to_lane(&self, location: Location, lane: LaneKind) -> Option<Transform> {
            self.inner.project_to_lane(location, lane)
        }

        fn try_spawn(&self, blueprint: Blueprint, transform: &Transform) -> Option<ActorId> {
            self.inner.try_spawn(blueprint, transform)
        }

        fn forward_vector(&self, actor: ActorId) -> Result<Vector3, WorldError> {
            self.inner.forward_vector(actor)
        }

        fn set_target_velocity(&self, actor: ActorId, velocity: Vector3) -> Result<(), WorldError> {
            self.inner.set_target_velocity(actor, velocity)
        }

        fn apply_control(&self, actor: ActorId, control: VehicleControl) -> Result<(), WorldError> {
            self.inner.apply_control(actor, control)
        }

        fn navigation_agent(
            &self,
            actor: ActorId,
            destination: Location,
            profile: DrivingProfile,
        ) -> Result<Box<dyn NavigationAgent>, WorldError> {
            self.inner.navigation_agent(actor, destination, profile)
        }

        fn walk_to(
            &self,
            actor: ActorId,
            destination: Location,
            max_speed: f32,
        ) -> Result<(), WorldError> {
            self.inner.walk_to(actor, destination, max_speed)
        }

        fn stop_walker(&self, actor: ActorId) -> Result<(), WorldError> {
            self.inner.stop_walker(actor)
        }

        fn actor_location(&self, actor: ActorId) -> Option<Location> {
            self.inner.actor_location(actor)
        }

        fn ego(&self) -> Option<EgoState> {
            self.inner.ego()
        }

        fn destroy(&self, actor: ActorId) -> bool {
            self.inner.destroy(actor)
        }
    }

    fn config(generations: usize) -> FuzzConfig {
        let mut config = FuzzConfig::default();
        config.ga.population_size = 2;
        config.ga.offspring_count = 2;
        config.ga.max_generations = generations;
        config.ga.random_seed = Some(7);
        config.drive.scenario_ticks = 5;
        config.drive.idle_interval_ms = 1;
        config.bridge = BridgeConfig {
            poll_interval_ms: 5,
            claim_timeout_secs: 10,
        };
        config
    }

    fn kinematic(config: &FuzzConfig) -> KinematicWorld {
        KinematicWorld::new(config.drive.fixed_delta_seconds)
            .with_ego(Location::new(-15.0, 0.0, 0.0), 8.0)
    }

    #[test]
    fn test_campaign_completes() {
        let config = config(2);
        let bridge = Arc::new(EvaluationBridge::new(config.bridge.clone()));
        let world = Arc::new(kinematic(&config));
        let engine = CoEvolution::new(config.clone(), Arc::clone(&bridge)).unwrap();
        let worker = EvaluationWorker::new(world, Arc::clone(&bridge), &config);

        let result = Campaign::new(engine, worker)
            .with_watch_interval(Duration::from_millis(2))
            .run()
            .unwrap();

        assert_eq!(result.stats.stop_reason, StopReason::MaxGenerations);
        assert_eq!(result.stats.generations, 2);
        assert_eq!(bridge.pending_len(), 0);
    }

    #[test]
    fn test_failed_drive_loop_ends_campaign() {
        let config = config(1_000_000);
        let bridge = Arc::new(EvaluationBridge::new(config.bridge.clone()));
        let world = Arc::new(FailingWorld {
            inner: kinematic(&config),
            ticks: AtomicU64::new(0),
            fail_after: 12,
        });
        let engine = CoEvolution::new(config.clone(), Arc::clone(&bridge)).unwrap();
        let worker = EvaluationWorker::new(world, Arc::clone(&bridge), &config);

        let started = Instant::now();
        let result = Campaign::new(engine, worker)
            .with_watch_interval(Duration::from_millis(2))
            .run();

        assert!(matches!(
            result,
            Err(CampaignError::Drive(DriveError::World(WorldError::Tick(_))))
        ));
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(bridge.pending_len(), 0);
    }
}
