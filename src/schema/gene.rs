//! Gene types describing a single NPC behaviour.
//!
//! Every gene shares a common header (route and start-time offset) and
//! carries a species-specific payload in [`NpcKind`].

use serde::{Deserialize, Serialize};

/// A point in world space, in metres.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Location {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Location {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance to another location.
    pub fn distance(&self, other: &Location) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Planar distance, ignoring height.
    pub fn distance_2d(&self, other: &Location) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn offset(&self, by: &Location) -> Location {
        Location::new(self.x + by.x, self.y + by.y, self.z + by.z)
    }
}

/// A direction or velocity in world space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn length(&self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn scale(&self, factor: f32) -> Vector3 {
        Vector3::new(self.x * factor, self.y * factor, self.z * factor)
    }

    pub fn sub(&self, other: &Vector3) -> Vector3 {
        Vector3::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }
}

/// Start and end point of an NPC, relative to the scenario origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub start: Location,
    pub end: Location,
}

/// Vehicle blueprint category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VehicleCategory {
    Car,
    Truck,
    Van,
    Motorcycle,
    Bicycle,
}

impl VehicleCategory {
    pub const ALL: [VehicleCategory; 5] = [
        VehicleCategory::Car,
        VehicleCategory::Truck,
        VehicleCategory::Van,
        VehicleCategory::Motorcycle,
        VehicleCategory::Bicycle,
    ];
}

/// How a vehicle behaves once its start time is reached.
///
/// The initial speed only exists for driving vehicles.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state")]
pub enum VehicleMotion {
    /// Already moving at `initial_speed` (m/s) when released.
    Driving { initial_speed: f32 },
    /// Pulls out from the shoulder from standstill.
    StartingParked,
    /// Never moves.
    Parked,
}

impl VehicleMotion {
    pub fn is_parked(&self) -> bool {
        matches!(self, VehicleMotion::Parked)
    }

    pub fn initial_speed(&self) -> Option<f32> {
        match self {
            VehicleMotion::Driving { initial_speed } => Some(*initial_speed),
            _ => None,
        }
    }
}

/// Aggressiveness of the navigation agent steering a vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DrivingProfile {
    Cautious,
    #[default]
    Normal,
    Aggressive,
}

/// How a pedestrian behaves once its start time is reached.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state")]
pub enum WalkerMotion {
    /// Walks to the end point, capped at `max_speed` (m/s).
    Walking { max_speed: f32 },
    /// Stays at the spawn point.
    Stationary,
}

impl WalkerMotion {
    pub fn max_speed(&self) -> Option<f32> {
        match self {
            WalkerMotion::Walking { max_speed } => Some(*max_speed),
            WalkerMotion::Stationary => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VehicleTraits {
    pub category: VehicleCategory,
    pub motion: VehicleMotion,
    pub profile: DrivingProfile,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WalkerTraits {
    pub motion: WalkerMotion,
}

/// Species-specific part of a gene.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "species")]
pub enum NpcKind {
    Vehicle(VehicleTraits),
    Walker(WalkerTraits),
}

/// One candidate NPC behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NpcGene {
    pub route: Route,
    /// Seconds after scenario start before the NPC is released.
    pub start_time: f32,
    pub kind: NpcKind,
}

impl NpcGene {
    pub fn species(&self) -> Species {
        match self.kind {
            NpcKind::Vehicle(_) => Species::Vehicle,
            NpcKind::Walker(_) => Species::Walker,
        }
    }

    pub fn vehicle(&self) -> Option<&VehicleTraits> {
        match &self.kind {
            NpcKind::Vehicle(traits) => Some(traits),
            NpcKind::Walker(_) => None,
        }
    }

    pub fn walker(&self) -> Option<&WalkerTraits> {
        match &self.kind {
            NpcKind::Walker(traits) => Some(traits),
            NpcKind::Vehicle(_) => None,
        }
    }
}

/// The two co-evolved populations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Species {
    Walker,
    Vehicle,
}

impl Species {
    pub fn label(&self) -> &'static str {
        match self {
            Species::Walker => "walker",
            Species::Vehicle => "vehicle",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_motion_speed_only_when_moving() {
        assert_eq!(
            VehicleMotion::Driving { initial_speed: 5.0 }.initial_speed(),
            Some(5.0)
        );
        assert_eq!(VehicleMotion::StartingParked.initial_speed(), None);
        assert_eq!(VehicleMotion::Parked.initial_speed(), None);
        assert_eq!(WalkerMotion::Stationary.max_speed(), None);
    }

    #[test]
    fn test_gene_serialization() {
        let gene = NpcGene {
            route: Route {
                start: Location::new(1.0, 2.0, 0.0),
                end: Location::new(10.0, -3.0, 0.0),
            },
            start_time: 0.5,
            kind: NpcKind::Vehicle(VehicleTraits {
                category: VehicleCategory::Van,
                motion: VehicleMotion::Driving { initial_speed: 7.5 },
                profile: DrivingProfile::Aggressive,
            }),
        };

        let json = serde_json::to_string(&gene).unwrap();
        let parsed: NpcGene = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, gene);
        assert_eq!(parsed.species(), Species::Vehicle);
    }

    #[test]
    fn test_distance() {
        let a = Location::new(0.0, 0.0, 0.0);
        let b = Location::new(3.0, 4.0, 12.0);
        assert!((a.distance_2d(&b) - 5.0).abs() < 1e-6);
        assert!((a.distance(&b) - 13.0).abs() < 1e-6);
    }
}
