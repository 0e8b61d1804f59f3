//! In-memory kinematic world.
//!
//! A straight road along +x centred on y = 0 with point-mass actors. Good
//! enough to exercise the scenario runtime, the drive loop and the fitness
//! tracker without a simulator; it is not a physics model.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::schema::{DrivingProfile, Location, Vector3};

use super::world::{
    ActorId, Blueprint, EgoState, LaneKind, NavigationAgent, NavigationError, Transform,
    VehicleControl, World, WorldError,
};

const LANE_WIDTH: f32 = 3.5;
const SIDEWALK_OFFSET: f32 = 1.5;
/// Distance at which a navigation agent counts as arrived.
const ARRIVAL_RADIUS: f32 = 2.0;
/// Ego reaction: look-ahead distance and half-width of its corridor.
const EGO_LOOKAHEAD: f32 = 12.0;
const EGO_CORRIDOR: f32 = 2.0;
const EGO_BRAKE: f32 = 6.0;
const EGO_ACCEL: f32 = 2.0;

/// A command issued to the world, kept for inspection.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandRecord {
    SetTargetVelocity { actor: ActorId, velocity: Vector3 },
    ApplyControl { actor: ActorId, control: VehicleControl },
    WalkTo { actor: ActorId, destination: Location, max_speed: f32 },
    StopWalker { actor: ActorId },
    Destroy { actor: ActorId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyKind {
    Vehicle,
    Walker,
    Ego,
}

#[derive(Debug, Clone)]
struct Body {
    kind: BodyKind,
    location: Location,
    yaw: f32,
    velocity: Vector3,
    walk_target: Option<(Location, f32)>,
}

#[derive(Debug, Default)]
struct WorldState {
    frame: u64,
    next_id: u64,
    bodies: BTreeMap<ActorId, Body>,
    ego: Option<(ActorId, f32)>,
    blocked: Vec<Location>,
    commands: Vec<CommandRecord>,
}

impl WorldState {
    fn body(&self, actor: ActorId) -> Result<&Body, WorldError> {
        self.bodies.get(&actor).ok_or(WorldError::UnknownActor(actor))
    }

    fn body_mut(&mut self, actor: ActorId) -> Result<&mut Body, WorldError> {
        self.bodies
            .get_mut(&actor)
            .ok_or(WorldError::UnknownActor(actor))
    }
}

#[derive(Debug)]
struct Shared {
    dt: f64,
    road_half_width: f32,
    spawn_clearance: f32,
    state: Mutex<WorldState>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, WorldState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Point-mass world on a straight road.
#[derive(Debug, Clone)]
pub struct KinematicWorld {
    shared: Arc<Shared>,
}

impl KinematicWorld {
    /// Create an empty world stepping `dt` seconds per tick.
    pub fn new(dt: f64) -> Self {
        Self {
            shared: Arc::new(Shared {
                dt,
                road_half_width: LANE_WIDTH * 2.0,
                spawn_clearance: 1.0,
                state: Mutex::new(WorldState::default()),
            }),
        }
    }

    fn shared_mut(&mut self) -> Option<&mut Shared> {
        Arc::get_mut(&mut self.shared)
    }

    /// Set the minimum distance between a new actor and existing ones.
    pub fn with_spawn_clearance(mut self, clearance: f32) -> Self {
        if let Some(shared) = self.shared_mut() {
            shared.spawn_clearance = clearance;
        }
        self
    }

    /// Add an ego vehicle cruising along +x.
    pub fn with_ego(self, start: Location, cruise_speed: f32) -> Self {
        {
            let mut state = self.shared.lock();
            let id = ActorId(state.next_id);
            state.next_id += 1;
            state.bodies.insert(
                id,
                Body {
                    kind: BodyKind::Ego,
                    location: start,
                    yaw: 0.0,
                    velocity: Vector3::new(cruise_speed, 0.0, 0.0),
                    walk_target: None,
                },
            );
            state.ego = Some((id, cruise_speed));
        }
        self
    }

    /// Refuse every spawn near `location`.
    pub fn block_spawn_at(self, location: Location) -> Self {
        self.shared.lock().blocked.push(location);
        self
    }

    /// Every command issued so far.
    pub fn commands(&self) -> Vec<CommandRecord> {
        self.shared.lock().commands.clone()
    }

    /// Number of live NPC actors, ego excluded.
    pub fn npc_count(&self) -> usize {
        self.shared
            .lock()
            .bodies
            .values()
            .filter(|b| b.kind != BodyKind::Ego)
            .count()
    }

    pub fn velocity(&self, actor: ActorId) -> Option<Vector3> {
        self.shared.lock().bodies.get(&actor).map(|b| b.velocity)
    }

    fn step_ego(state: &mut WorldState, dt: f32) {
        let Some((ego_id, cruise)) = state.ego else {
            return;
        };
        let Some(ego) = state.bodies.get(&ego_id) else {
            return;
        };
        let ego_location = ego.location;

        let obstructed = state.bodies.iter().any(|(id, b)| {
            let ahead = b.location.x - ego_location.x;
            *id != ego_id
                && (0.0..=EGO_LOOKAHEAD).contains(&ahead)
                && (b.location.y - ego_location.y).abs() <= EGO_CORRIDOR
        });

        if let Some(ego) = state.bodies.get_mut(&ego_id) {
            let speed = ego.velocity.x;
            let speed = if obstructed {
                (speed - EGO_BRAKE * dt).max(0.0)
            } else {
                (speed + EGO_ACCEL * dt).min(cruise)
            };
            ego.velocity = Vector3::new(speed, 0.0, 0.0);
        }
    }
}

fn advance(location: Location, velocity: Vector3, dt: f32) -> Location {
    Location::new(
        location.x + velocity.x * dt,
        location.y + velocity.y * dt,
        location.z + velocity.z * dt,
    )
}

fn heading(from: Location, to: Location) -> (Vector3, f32) {
    let (dx, dy) = (to.x - from.x, to.y - from.y);
    let length = (dx * dx + dy * dy).sqrt();
    if length <= f32::EPSILON {
        return (Vector3::default(), 0.0);
    }
    (Vector3::new(dx / length, dy / length, 0.0), length)
}

impl World for KinematicWorld {
    fn tick(&self) -> Result<u64, WorldError> {
        let dt = self.shared.dt as f32;
        let mut state = self.shared.lock();

        Self::step_ego(&mut state, dt);

        for body in state.bodies.values_mut() {
            if let Some((target, max_speed)) = body.walk_target {
                let (direction, remaining) = heading(body.location, target);
                let step = max_speed * dt;
                if remaining <= step {
                    body.location = Location::new(target.x, target.y, body.location.z);
                    body.velocity = Vector3::default();
                    body.walk_target = None;
                    continue;
                }
                body.velocity = direction.scale(max_speed);
            }
            body.location = advance(body.location, body.velocity, dt);
        }

        state.frame += 1;
        Ok(state.frame)
    }

    fn elapsed_seconds(&self) -> f64 {
        self.shared.lock().frame as f64 * self.shared.dt
    }

    fn project_to_lane(&self, location: Location, lane: LaneKind) -> Option<Transform> {
        if !location.x.is_finite() || !location.y.is_finite() {
            return None;
        }
        let half = self.shared.road_half_width;
        let side = if location.y < 0.0 { -1.0 } else { 1.0 };

        let (y, yaw) = match lane {
            LaneKind::Driving => {
                let lanes = ((half * 2.0) / LANE_WIDTH).floor().max(1.0);
                let index = ((location.y + half) / LANE_WIDTH).floor().clamp(0.0, lanes - 1.0);
                (-half + LANE_WIDTH * (index + 0.5), 0.0)
            }
            LaneKind::Shoulder => (side * (half - 0.5), 0.0),
            LaneKind::Sidewalk => (
                side * (half + SIDEWALK_OFFSET),
                -side * std::f32::consts::FRAC_PI_2,
            ),
        };
        Some(Transform::new(Location::new(location.x, y, location.z), yaw))
    }

    fn try_spawn(&self, blueprint: Blueprint, transform: &Transform) -> Option<ActorId> {
        let clearance = self.shared.spawn_clearance;
        let mut state = self.shared.lock();
        let location = transform.location;

        let occupied = state
            .bodies
            .values()
            .map(|b| b.location)
            .chain(state.blocked.iter().copied())
            .any(|other| other.distance_2d(&location) < clearance);
        if occupied {
            return None;
        }

        let id = ActorId(state.next_id);
        state.next_id += 1;
        let kind = match blueprint {
            Blueprint::Vehicle(_) => BodyKind::Vehicle,
            Blueprint::Walker => BodyKind::Walker,
        };
        state.bodies.insert(
            id,
            Body {
                kind,
                location,
                yaw: transform.yaw,
                velocity: Vector3::default(),
                walk_target: None,
            },
        );
        Some(id)
    }

    fn forward_vector(&self, actor: ActorId) -> Result<Vector3, WorldError> {
        let state = self.shared.lock();
        let body = state.body(actor)?;
        Ok(Transform::new(body.location, body.yaw).forward())
    }

    fn set_target_velocity(&self, actor: ActorId, velocity: Vector3) -> Result<(), WorldError> {
        let mut state = self.shared.lock();
        state.body_mut(actor)?.velocity = velocity;
        state
            .commands
            .push(CommandRecord::SetTargetVelocity { actor, velocity });
        Ok(())
    }

    fn apply_control(&self, actor: ActorId, control: VehicleControl) -> Result<(), WorldError> {
        let mut state = self.shared.lock();
        let body = state.body_mut(actor)?;
        if control.brake > 0.0 || control.hand_brake {
            let keep = if control.hand_brake {
                0.0
            } else {
                (1.0 - control.brake).clamp(0.0, 1.0)
            };
            body.velocity = body.velocity.scale(keep);
        }
        state
            .commands
            .push(CommandRecord::ApplyControl { actor, control });
        Ok(())
    }

    fn navigation_agent(
        &self,
        actor: ActorId,
        destination: Location,
        profile: DrivingProfile,
    ) -> Result<Box<dyn NavigationAgent>, WorldError> {
        let state = self.shared.lock();
        if state.body(actor)?.kind != BodyKind::Vehicle {
            return Err(WorldError::WrongActorKind(actor, "vehicle"));
        }
        Ok(Box::new(KinematicAgent {
            shared: Arc::clone(&self.shared),
            actor,
            destination,
            cruise_speed: cruise_speed(profile),
            done: false,
        }))
    }

    fn walk_to(
        &self,
        actor: ActorId,
        destination: Location,
        max_speed: f32,
    ) -> Result<(), WorldError> {
        let mut state = self.shared.lock();
        let body = state.body_mut(actor)?;
        if body.kind != BodyKind::Walker {
            return Err(WorldError::WrongActorKind(actor, "walker"));
        }
        body.walk_target = Some((destination, max_speed));
        state.commands.push(CommandRecord::WalkTo {
            actor,
            destination,
            max_speed,
        });
        Ok(())
    }

    fn stop_walker(&self, actor: ActorId) -> Result<(), WorldError> {
        let mut state = self.shared.lock();
        let body = state.body_mut(actor)?;
        body.walk_target = None;
        body.velocity = Vector3::default();
        state.commands.push(CommandRecord::StopWalker { actor });
        Ok(())
    }

    fn actor_location(&self, actor: ActorId) -> Option<Location> {
        self.shared.lock().bodies.get(&actor).map(|b| b.location)
    }

    fn ego(&self) -> Option<EgoState> {
        let state = self.shared.lock();
        let (id, _) = state.ego?;
        state.bodies.get(&id).map(|b| EgoState {
            location: b.location,
            velocity: b.velocity,
        })
    }

    fn destroy(&self, actor: ActorId) -> bool {
        let mut state = self.shared.lock();
        let removed = state.bodies.remove(&actor).is_some();
        if removed {
            state.commands.push(CommandRecord::Destroy { actor });
        }
        removed
    }
}

fn cruise_speed(profile: DrivingProfile) -> f32 {
    match profile {
        DrivingProfile::Cautious => 6.0,
        DrivingProfile::Normal => 9.0,
        DrivingProfile::Aggressive => 13.0,
    }
}

/// Steers straight at the destination at a profile-dependent speed.
struct KinematicAgent {
    shared: Arc<Shared>,
    actor: ActorId,
    destination: Location,
    cruise_speed: f32,
    done: bool,
}

impl NavigationAgent for KinematicAgent {
    fn run_step(&mut self) -> Result<VehicleControl, NavigationError> {
        let mut state = self.shared.lock();
        let body = state.body_mut(self.actor)?;

        let (direction, remaining) = heading(body.location, self.destination);
        if remaining <= ARRIVAL_RADIUS {
            self.done = true;
            body.velocity = Vector3::default();
            return Ok(VehicleControl::emergency_stop());
        }
        if !remaining.is_finite() {
            return Err(NavigationError::NoRoute { actor: self.actor });
        }

        let steer = (direction.y.atan2(direction.x) - body.yaw).clamp(-1.0, 1.0);
        body.yaw = direction.y.atan2(direction.x);
        body.velocity = direction.scale(self.cruise_speed);

        Ok(VehicleControl {
            throttle: (self.cruise_speed / 15.0).min(1.0),
            steer,
            brake: 0.0,
            hand_brake: false,
        })
    }

    fn done(&self) -> bool {
        self.done
    }
}
