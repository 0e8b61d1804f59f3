//! Capability interface of the simulated world.
//!
//! The scenario runtime and the drive loop only talk to the world through
//! [`World`] and [`NavigationAgent`]. A simulator client implements these
//! traits; [`KinematicWorld`](super::KinematicWorld) is an in-memory
//! implementation.

use serde::{Deserialize, Serialize};

use crate::schema::{DrivingProfile, Location, VehicleCategory, Vector3};

/// Handle of a live world actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorId(pub u64);

impl std::fmt::Display for ActorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "actor {}", self.0)
    }
}

/// Pose of an actor: location plus heading in radians around +z.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Transform {
    pub location: Location,
    pub yaw: f32,
}

impl Transform {
    pub fn new(location: Location, yaw: f32) -> Self {
        Self { location, yaw }
    }

    /// Unit vector along the heading.
    pub fn forward(&self) -> Vector3 {
        Vector3::new(self.yaw.cos(), self.yaw.sin(), 0.0)
    }
}

/// Kind of lane a spawn point is projected onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LaneKind {
    Driving,
    Shoulder,
    Sidewalk,
}

/// What to spawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Blueprint {
    Vehicle(VehicleCategory),
    Walker,
}

/// One low-level control command for a vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct VehicleControl {
    pub throttle: f32,
    pub steer: f32,
    pub brake: f32,
    pub hand_brake: bool,
}

impl VehicleControl {
    /// Full brake, no throttle, wheels straight.
    pub fn emergency_stop() -> Self {
        Self {
            throttle: 0.0,
            steer: 0.0,
            brake: 1.0,
            hand_brake: false,
        }
    }
}

/// Observed state of the vehicle under test.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EgoState {
    pub location: Location,
    pub velocity: Vector3,
}

/// World errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WorldError {
    #[error("Unknown {0}")]
    UnknownActor(ActorId),
    #[error("{0} is not a {1}")]
    WrongActorKind(ActorId, &'static str),
    #[error("World tick failed: {0}")]
    Tick(String),
}

/// Errors from a single navigation step.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NavigationError {
    #[error("No route from {actor} to its destination")]
    NoRoute { actor: ActorId },
    #[error(transparent)]
    World(#[from] WorldError),
}

/// The simulated world.
///
/// Every method takes `&self`: one world is shared by the drive loop and
/// every actor control thread.
pub trait World: Send + Sync {
    /// Advance the simulation by one discrete step; returns the new frame.
    fn tick(&self) -> Result<u64, WorldError>;

    /// Simulated seconds since the world started.
    fn elapsed_seconds(&self) -> f64;

    /// Nearest lane point of the requested kind, oriented along the lane.
    fn project_to_lane(&self, location: Location, lane: LaneKind) -> Option<Transform>;

    /// Spawn an actor; `None` when the world refuses the placement.
    fn try_spawn(&self, blueprint: Blueprint, transform: &Transform) -> Option<ActorId>;

    fn forward_vector(&self, actor: ActorId) -> Result<Vector3, WorldError>;

    fn set_target_velocity(&self, actor: ActorId, velocity: Vector3) -> Result<(), WorldError>;

    fn apply_control(&self, actor: ActorId, control: VehicleControl) -> Result<(), WorldError>;

    /// Route-following controller driving `actor` to `destination`.
    fn navigation_agent(
        &self,
        actor: ActorId,
        destination: Location,
        profile: DrivingProfile,
    ) -> Result<Box<dyn NavigationAgent>, WorldError>;

    /// Command the pedestrian controller of `actor`.
    fn walk_to(&self, actor: ActorId, destination: Location, max_speed: f32)
    -> Result<(), WorldError>;

    fn stop_walker(&self, actor: ActorId) -> Result<(), WorldError>;

    fn actor_location(&self, actor: ActorId) -> Option<Location>;

    /// The externally driven vehicle under test, if present.
    fn ego(&self) -> Option<EgoState>;

    /// Remove an actor; returns false if it was already gone.
    fn destroy(&self, actor: ActorId) -> bool;
}

/// Local planner that produces one control per tick.
pub trait NavigationAgent: Send {
    fn run_step(&mut self) -> Result<VehicleControl, NavigationError>;

    /// True once the destination has been reached.
    fn done(&self) -> bool;
}
