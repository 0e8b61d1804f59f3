//! Scenario runtime: live NPC actors driven in lock-step with world ticks.
//!
//! Every spawned NPC gets one control thread. The drive loop advances the
//! world and broadcasts a [`TickSignal`]; each thread performs at most one
//! state-machine step per observed tick. Broadcasting does not wait for the
//! threads, so a slow actor may lag one or more ticks behind.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use crate::compute::bridge::{RequestId, ScenarioPair};
use crate::schema::{
    DrivingProfile, Location, NpcGene, NpcKind, ScenarioConfig, Species, VehicleMotion,
    WalkerMotion,
};

use super::world::{
    ActorId, Blueprint, LaneKind, NavigationAgent, VehicleControl, World, WorldError,
};

/// Distance at which a walker counts as arrived.
const WALKER_ARRIVAL_RADIUS: f32 = 1.0;

/// Externally visible state of an NPC actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorStatus {
    /// Spawned, waiting for its start time (or never moving).
    Pending,
    Running,
    /// Arrived, or its thread has exited.
    Finished,
}

#[derive(Debug, Default)]
struct TickState {
    tick: u64,
    closed: bool,
}

/// Broadcast of world ticks to actor threads.
#[derive(Debug, Default)]
pub struct TickSignal {
    state: Mutex<TickState>,
    changed: Condvar,
}

impl TickSignal {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, TickState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Latest broadcast tick.
    pub fn current(&self) -> u64 {
        self.lock().tick
    }

    /// Announce one new tick to every waiter.
    pub fn broadcast(&self) -> u64 {
        let mut state = self.lock();
        state.tick += 1;
        let tick = state.tick;
        drop(state);
        self.changed.notify_all();
        tick
    }

    /// Wake every waiter for good.
    pub fn close(&self) {
        self.lock().closed = true;
        self.changed.notify_all();
    }

    /// Block until a tick newer than `seen` is broadcast.
    ///
    /// Returns `None` once the signal is closed or `cancel` is set. The cancel
    /// flag is only rechecked on a wakeup, so it must be paired with
    /// [`close`](Self::close) or a broadcast.
    pub fn wait_after(&self, seen: u64, cancel: &AtomicBool) -> Option<u64> {
        let mut state = self.lock();
        loop {
            if state.closed || cancel.load(Ordering::Relaxed) {
                return None;
            }
            if state.tick > seen {
                return Some(state.tick);
            }
            state = self
                .changed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// Runtime state of one spawned NPC.
struct NpcActor {
    label: String,
    gene: NpcGene,
    actor: ActorId,
    destination: Location,
    agent: Option<Box<dyn NavigationAgent>>,
    cancel: Arc<AtomicBool>,
    status: Arc<Mutex<ActorStatus>>,
    thread: Option<JoinHandle<()>>,
}

fn set_status(status: &Mutex<ActorStatus>, value: ActorStatus) {
    *status.lock().unwrap_or_else(PoisonError::into_inner) = value;
}

fn get_status(status: &Mutex<ActorStatus>) -> ActorStatus {
    *status.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Turns scenario pairs into live actors in a world.
#[derive(Clone)]
pub struct ScenarioRuntime {
    world: Arc<dyn World>,
    config: ScenarioConfig,
}

impl ScenarioRuntime {
    pub fn new(world: Arc<dyn World>, config: ScenarioConfig) -> Self {
        Self { world, config }
    }

    pub fn world(&self) -> &Arc<dyn World> {
        &self.world
    }

    /// Spawn every NPC of the pair. Failed spawns are logged and skipped.
    pub fn materialize(&self, pair: &ScenarioPair) -> ScenarioHandle {
        let mut actors = Vec::with_capacity(pair.npc_count());
        let mut failed_spawns = 0;

        let genes = pair
            .vehicles
            .genes
            .iter()
            .map(|g| (Species::Vehicle, g))
            .chain(pair.walkers.genes.iter().map(|g| (Species::Walker, g)));
        let mut counters = [0usize; 2];

        for (species, gene) in genes {
            let n = &mut counters[species as usize];
            let label = format!("npc_{}_{}", species.label(), *n);
            *n += 1;

            match self.spawn(gene, &label) {
                Some(actor) => actors.push(actor),
                None => failed_spawns += 1,
            }
        }

        log::info!(
            "Scenario {} materialized: {} actors, {} failed spawns",
            pair.id,
            actors.len(),
            failed_spawns
        );

        ScenarioHandle {
            world: Arc::clone(&self.world),
            id: pair.id,
            actors,
            failed_spawns,
            signal: Arc::new(TickSignal::new()),
            start_seconds: None,
            ended: false,
        }
    }

    fn spawn(&self, gene: &NpcGene, label: &str) -> Option<NpcActor> {
        let (lane, lift, blueprint) = match &gene.kind {
            NpcKind::Vehicle(traits) => {
                let lane = match traits.motion {
                    VehicleMotion::Driving { .. } => LaneKind::Driving,
                    _ => LaneKind::Shoulder,
                };
                (
                    lane,
                    self.config.vehicle_spawn_lift,
                    Blueprint::Vehicle(traits.category),
                )
            }
            NpcKind::Walker(_) => (
                LaneKind::Sidewalk,
                self.config.walker_spawn_lift,
                Blueprint::Walker,
            ),
        };

        let start = gene.route.start.offset(&self.config.origin);
        let end = gene.route.end.offset(&self.config.origin);

        let Some(mut transform) = self.world.project_to_lane(start, lane) else {
            log::warn!("{label}: no {lane:?} lane near {start:?}; skipped");
            return None;
        };
        transform.location.z += lift;

        let Some(actor) = self.world.try_spawn(blueprint, &transform) else {
            log::warn!("{label}: spawn failed at {:?}; skipped", transform.location);
            return None;
        };

        let destination = self
            .world
            .project_to_lane(end, lane)
            .map_or(end, |t| t.location);

        let agent = match &gene.kind {
            NpcKind::Vehicle(traits) if !traits.motion.is_parked() => {
                match self
                    .world
                    .navigation_agent(actor, destination, traits.profile)
                {
                    Ok(agent) => Some(agent),
                    Err(e) => {
                        log::warn!("{label}: no navigation agent ({e}); treated as parked");
                        None
                    }
                }
            }
            _ => None,
        };

        Some(NpcActor {
            label: label.to_string(),
            gene: *gene,
            actor,
            destination,
            agent,
            cancel: Arc::new(AtomicBool::new(false)),
            status: Arc::new(Mutex::new(ActorStatus::Pending)),
            thread: None,
        })
    }
}

/// A materialized scenario. Dropping it ends the scenario.
pub struct ScenarioHandle {
    world: Arc<dyn World>,
    id: RequestId,
    actors: Vec<NpcActor>,
    failed_spawns: usize,
    signal: Arc<TickSignal>,
    start_seconds: Option<f64>,
    ended: bool,
}

impl ScenarioHandle {
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Number of successfully spawned actors.
    pub fn actor_count(&self) -> usize {
        self.actors.len()
    }

    pub fn failed_spawns(&self) -> usize {
        self.failed_spawns
    }

    /// Spawned actors with their species.
    pub fn actors(&self) -> impl Iterator<Item = (ActorId, Species)> + '_ {
        self.actors.iter().map(|a| (a.actor, a.gene.species()))
    }

    pub fn statuses(&self) -> Vec<ActorStatus> {
        self.actors.iter().map(|a| get_status(&a.status)).collect()
    }

    pub fn all_finished(&self) -> bool {
        self.actors
            .iter()
            .all(|a| get_status(&a.status) == ActorStatus::Finished)
    }

    /// Simulated seconds since [`start`](Self::start).
    pub fn elapsed(&self) -> f64 {
        self.start_seconds
            .map_or(0.0, |s| self.world.elapsed_seconds() - s)
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Record the start time and launch one control thread per actor.
    pub fn start(&mut self) {
        if self.start_seconds.is_some() || self.ended {
            return;
        }
        let start_seconds = self.world.elapsed_seconds();
        let start_tick = self.signal.current();
        self.start_seconds = Some(start_seconds);

        for npc in &mut self.actors {
            let ctx = ActorContext {
                world: Arc::clone(&self.world),
                signal: Arc::clone(&self.signal),
                cancel: Arc::clone(&npc.cancel),
                status: Arc::clone(&npc.status),
                actor: npc.actor,
                gene: npc.gene,
                destination: npc.destination,
                start_seconds,
                start_tick,
            };
            let agent = npc.agent.take();
            let spawned = thread::Builder::new()
                .name(npc.label.clone())
                .spawn(move || match ctx.gene.kind {
                    NpcKind::Vehicle(traits) => {
                        run_vehicle(&ctx, traits.motion, traits.profile, agent)
                    }
                    NpcKind::Walker(traits) => run_walker(&ctx, traits.motion),
                });
            match spawned {
                Ok(handle) => npc.thread = Some(handle),
                Err(e) => log::warn!("{}: failed to start control thread: {e}", npc.label),
            }
        }

        log::info!("Scenario {} started with {} actors", self.id, self.actors.len());
    }

    /// Advance the world one step and wake every actor thread once.
    ///
    /// Returns the world frame. Does not wait for the actors.
    pub fn drive_one_tick(&self) -> Result<u64, WorldError> {
        let frame = self.world.tick()?;
        self.signal.broadcast();
        Ok(frame)
    }

    /// Stop every thread, join it, then remove every actor from the world.
    ///
    /// Safe to call more than once.
    pub fn end(&mut self) {
        if self.ended {
            return;
        }
        self.ended = true;

        for npc in &self.actors {
            npc.cancel.store(true, Ordering::Relaxed);
        }
        self.signal.close();

        for npc in &mut self.actors {
            if let Some(handle) = npc.thread.take()
                && handle.join().is_err()
            {
                log::warn!("{}: control thread panicked", npc.label);
            }
            set_status(&npc.status, ActorStatus::Finished);
        }

        let mut destroyed = 0;
        for npc in &self.actors {
            if self.world.destroy(npc.actor) {
                destroyed += 1;
            }
        }
        log::info!(
            "Scenario {} ended after {:.2}s: {destroyed} actors removed",
            self.id,
            self.elapsed()
        );
    }
}

impl Drop for ScenarioHandle {
    fn drop(&mut self) {
        self.end();
    }
}

/// Everything an actor thread needs.
struct ActorContext {
    world: Arc<dyn World>,
    signal: Arc<TickSignal>,
    cancel: Arc<AtomicBool>,
    status: Arc<Mutex<ActorStatus>>,
    actor: ActorId,
    gene: NpcGene,
    destination: Location,
    start_seconds: f64,
    start_tick: u64,
}

impl ActorContext {
    fn due(&self) -> bool {
        self.world.elapsed_seconds() - self.start_seconds >= self.gene.start_time as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VehicleState {
    Waiting,
    Running,
    ReachedDestination,
}

fn run_vehicle(
    ctx: &ActorContext,
    motion: VehicleMotion,
    profile: DrivingProfile,
    mut agent: Option<Box<dyn NavigationAgent>>,
) {
    let mut state = VehicleState::Waiting;
    let mut seen = ctx.start_tick;

    while let Some(tick) = ctx.signal.wait_after(seen, &ctx.cancel) {
        seen = tick;
        match state {
            VehicleState::Waiting => {
                if motion.is_parked() || agent.is_none() || !ctx.due() {
                    continue;
                }
                if let VehicleMotion::Driving { initial_speed } = motion {
                    let velocity = ctx
                        .world
                        .forward_vector(ctx.actor)
                        .and_then(|f| ctx.world.set_target_velocity(ctx.actor, f.scale(initial_speed)));
                    if let Err(e) = velocity {
                        log::warn!("{}: initial velocity failed: {e}", ctx.actor);
                        break;
                    }
                }
                log::debug!("{} ({profile:?}) running at tick {tick}", ctx.actor);
                state = VehicleState::Running;
                set_status(&ctx.status, ActorStatus::Running);
            }
            VehicleState::Running => {
                let Some(agent) = agent.as_mut() else {
                    break;
                };
                match agent.run_step() {
                    Ok(control) => {
                        if let Err(e) = ctx.world.apply_control(ctx.actor, control) {
                            log::debug!("{}: control rejected: {e}", ctx.actor);
                        }
                    }
                    Err(e) => log::debug!("{}: no movement this tick: {e}", ctx.actor),
                }
                if agent.done() {
                    state = VehicleState::ReachedDestination;
                    set_status(&ctx.status, ActorStatus::Finished);
                    break;
                }
            }
            VehicleState::ReachedDestination => break,
        }
    }

    // Closing
    if state != VehicleState::ReachedDestination
        && let Err(e) = ctx
            .world
            .apply_control(ctx.actor, VehicleControl::emergency_stop())
    {
        log::debug!("{}: emergency stop failed: {e}", ctx.actor);
    }
    set_status(&ctx.status, ActorStatus::Finished);
}

fn run_walker(ctx: &ActorContext, motion: WalkerMotion) {
    let mut walking = false;
    let mut seen = ctx.start_tick;

    while let Some(tick) = ctx.signal.wait_after(seen, &ctx.cancel) {
        seen = tick;
        if walking {
            let arrived = ctx
                .world
                .actor_location(ctx.actor)
                .is_some_and(|l| l.distance_2d(&ctx.destination) <= WALKER_ARRIVAL_RADIUS);
            if arrived {
                set_status(&ctx.status, ActorStatus::Finished);
            }
            continue;
        }

        // Stationary walkers never leave Pending.
        let WalkerMotion::Walking { max_speed } = motion else {
            continue;
        };
        if !ctx.due() {
            continue;
        }
        match ctx.world.walk_to(ctx.actor, ctx.destination, max_speed) {
            Ok(()) => {
                walking = true;
                set_status(&ctx.status, ActorStatus::Running);
            }
            Err(e) => {
                log::warn!("{}: walk command failed: {e}", ctx.actor);
                break;
            }
        }
    }

    if walking && let Err(e) = ctx.world.stop_walker(ctx.actor) {
        log::debug!("{}: stop failed: {e}", ctx.actor);
    }
    set_status(&ctx.status, ActorStatus::Finished);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::evolution::Population;
    use crate::compute::kinematic::{CommandRecord, KinematicWorld};
    use crate::schema::{Route, VehicleCategory, VehicleTraits, WalkerTraits};
    use std::time::{Duration, Instant};

    fn pair(walkers: Vec<NpcGene>, vehicles: Vec<NpcGene>) -> ScenarioPair {
        ScenarioPair {
            id: RequestId {
                sequence: 0,
                generation: 0,
                index: 0,
            },
            walkers: Population::new(Species::Walker, 0, 0, walkers),
            vehicles: Population::new(Species::Vehicle, 0, 0, vehicles),
        }
    }

    fn vehicle(motion: VehicleMotion, start_time: f32) -> NpcGene {
        NpcGene {
            route: Route {
                start: Location::new(0.0, -3.0, 0.0),
                end: Location::new(40.0, -3.0, 0.0),
            },
            start_time,
            kind: NpcKind::Vehicle(VehicleTraits {
                category: VehicleCategory::Car,
                motion,
                profile: DrivingProfile::Normal,
            }),
        }
    }

    fn walker(motion: WalkerMotion, x: f32) -> NpcGene {
        NpcGene {
            route: Route {
                start: Location::new(x, -8.0, 0.0),
                end: Location::new(x, 8.0, 0.0),
            },
            start_time: 0.0,
            kind: NpcKind::Walker(WalkerTraits { motion }),
        }
    }

    fn runtime(world: &Arc<KinematicWorld>) -> ScenarioRuntime {
        let world: Arc<dyn World> = Arc::clone(world) as Arc<dyn World>;
        ScenarioRuntime::new(world, ScenarioConfig::default())
    }

    fn wait_for(handle: &ScenarioHandle, status: ActorStatus) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if handle.statuses().iter().all(|s| *s == status) {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn test_tick_signal_wait() {
        let signal = TickSignal::new();
        let cancel = AtomicBool::new(false);
        assert_eq!(signal.broadcast(), 1);
        assert_eq!(signal.wait_after(0, &cancel), Some(1));

        signal.close();
        assert_eq!(signal.wait_after(1, &cancel), None);
    }

    #[test]
    fn test_driving_vehicle_gets_initial_velocity_once() {
        let world = Arc::new(KinematicWorld::new(0.05));
        let runtime = runtime(&world);
        let mut handle = runtime.materialize(&pair(
            vec![],
            vec![vehicle(VehicleMotion::Driving { initial_speed: 5.0 }, 0.0)],
        ));
        assert_eq!(handle.actor_count(), 1);
        let (actor, _) = handle.actors().next().unwrap();
        let forward = world.forward_vector(actor).unwrap();

        handle.start();
        assert_eq!(handle.statuses(), vec![ActorStatus::Pending]);
        handle.drive_one_tick().unwrap();
        assert!(wait_for(&handle, ActorStatus::Running));

        let velocity_commands: Vec<_> = world
            .commands()
            .into_iter()
            .filter_map(|c| match c {
                CommandRecord::SetTargetVelocity { actor: a, velocity } if a == actor => {
                    Some(velocity)
                }
                _ => None,
            })
            .collect();
        assert_eq!(velocity_commands, vec![forward.scale(5.0)]);

        handle.end();
        let stops = world
            .commands()
            .into_iter()
            .filter(|c| {
                matches!(c, CommandRecord::ApplyControl { control, .. }
                    if *control == VehicleControl::emergency_stop())
            })
            .count();
        assert_eq!(stops, 1);
    }

    #[test]
    fn test_start_time_respected() {
        let world = Arc::new(KinematicWorld::new(0.05));
        let runtime = runtime(&world);
        let mut handle = runtime.materialize(&pair(
            vec![],
            vec![vehicle(VehicleMotion::Driving { initial_speed: 5.0 }, 1.0)],
        ));
        handle.start();

        for _ in 0..5 {
            handle.drive_one_tick().unwrap();
        }
        thread::sleep(Duration::from_millis(50));
        assert_eq!(handle.statuses(), vec![ActorStatus::Pending]);

        for _ in 0..20 {
            handle.drive_one_tick().unwrap();
            thread::sleep(Duration::from_millis(1));
        }
        assert!(wait_for(&handle, ActorStatus::Running) || handle.all_finished());
        handle.end();
    }

    #[test]
    fn test_stationary_walker_never_leaves_pending() {
        let world = Arc::new(KinematicWorld::new(0.05));
        let runtime = runtime(&world);
        let mut handle = runtime.materialize(&pair(vec![walker(WalkerMotion::Stationary, 0.0)], vec![]));
        handle.start();

        for _ in 0..50 {
            handle.drive_one_tick().unwrap();
        }
        thread::sleep(Duration::from_millis(50));
        assert_eq!(handle.statuses(), vec![ActorStatus::Pending]);

        handle.end();
        assert_eq!(handle.statuses(), vec![ActorStatus::Finished]);
        assert!(
            !world
                .commands()
                .iter()
                .any(|c| matches!(c, CommandRecord::WalkTo { .. }))
        );
    }

    #[test]
    fn test_walking_walker_commanded_and_stopped() {
        let world = Arc::new(KinematicWorld::new(0.05));
        let runtime = runtime(&world);
        let mut handle = runtime.materialize(&pair(
            vec![walker(WalkerMotion::Walking { max_speed: 1.5 }, 0.0)],
            vec![],
        ));
        handle.start();
        handle.drive_one_tick().unwrap();
        assert!(wait_for(&handle, ActorStatus::Running));

        handle.end();
        let commands = world.commands();
        assert!(commands.iter().any(|c| matches!(c, CommandRecord::WalkTo { max_speed, .. } if *max_speed == 1.5)));
        assert!(commands.iter().any(|c| matches!(c, CommandRecord::StopWalker { .. })));
    }

    #[test]
    fn test_end_with_failed_spawn_is_idempotent() {
        let world = Arc::new(KinematicWorld::new(0.05));
        let runtime = runtime(&world);
        let same_spot = walker(WalkerMotion::Walking { max_speed: 1.0 }, 5.0);
        let mut handle = runtime.materialize(&pair(
            vec![same_spot, same_spot],
            vec![vehicle(VehicleMotion::Parked, 0.0)],
        ));
        assert_eq!(handle.actor_count(), 2);
        assert_eq!(handle.failed_spawns(), 1);

        handle.start();
        for _ in 0..3 {
            handle.drive_one_tick().unwrap();
        }
        handle.end();
        assert!(handle.is_ended());
        assert!(handle.statuses().iter().all(|s| *s == ActorStatus::Finished));
        assert!(handle.actors.iter().all(|a| a.thread.is_none()));
        assert_eq!(world.npc_count(), 0);

        let commands = world.commands().len();
        handle.end();
        assert_eq!(world.commands().len(), commands);
    }

    #[test]
    fn test_drop_ends_scenario() {
        let world = Arc::new(KinematicWorld::new(0.05));
        let runtime = runtime(&world);
        {
            let mut handle =
                runtime.materialize(&pair(vec![walker(WalkerMotion::Stationary, 0.0)], vec![]));
            handle.start();
            handle.drive_one_tick().unwrap();
        }
        assert_eq!(world.npc_count(), 0);
    }

    #[test]
    fn test_end_without_start() {
        let world = Arc::new(KinematicWorld::new(0.05));
        let runtime = runtime(&world);
        let mut handle = runtime.materialize(&pair(
            vec![],
            vec![vehicle(VehicleMotion::StartingParked, 0.0)],
        ));
        handle.end();
        assert_eq!(world.npc_count(), 0);
        assert_eq!(handle.elapsed(), 0.0);
    }
}
