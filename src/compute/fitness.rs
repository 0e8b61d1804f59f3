//! Fitness of one executed scenario.
//!
//! Every objective is oriented so that lower means more adversarial:
//!
//! - `min_distance`: closest ego-NPC approach, capped at `max_distance`
//! - `smoothness`: negated mean absolute ego acceleration
//! - `diversity`: negated spread of the scenario's NPCs
//! - `crossing_time`: seconds until a walker first crosses the ego path
//!   (scenario duration if none does)
//! - `interaction`: one minus the fraction of ticks with a vehicle near the ego

use std::collections::HashSet;

use crate::compute::bridge::ScenarioPair;
use crate::schema::{DriveConfig, FitnessVector, ScenarioTemplate, Species, VehicleCategory, Vector3};

use super::world::{ActorId, World};

/// Accumulates per-tick observations of a running scenario.
#[derive(Debug, Clone)]
pub struct FitnessTracker {
    dt: f32,
    crossing_radius: f32,
    interaction_radius: f32,
    max_distance: f32,
    min_distance: f32,
    last_velocity: Option<Vector3>,
    accel_sum: f32,
    accel_samples: usize,
    first_crossing: Option<f64>,
    interaction_ticks: usize,
    ticks: usize,
}

impl FitnessTracker {
    pub fn new(config: &DriveConfig) -> Self {
        Self {
            dt: config.fixed_delta_seconds as f32,
            crossing_radius: config.crossing_radius,
            interaction_radius: config.interaction_radius,
            max_distance: config.max_distance,
            min_distance: config.max_distance,
            last_velocity: None,
            accel_sum: 0.0,
            accel_samples: 0,
            first_crossing: None,
            interaction_ticks: 0,
            ticks: 0,
        }
    }

    /// Record one tick. `elapsed` is the scenario time in seconds.
    pub fn observe<I>(&mut self, world: &dyn World, actors: I, elapsed: f64)
    where
        I: IntoIterator<Item = (ActorId, Species)>,
    {
        self.ticks += 1;
        let Some(ego) = world.ego() else {
            return;
        };

        if let Some(previous) = self.last_velocity
            && self.dt > 0.0
        {
            self.accel_sum += ego.velocity.sub(&previous).length() / self.dt;
            self.accel_samples += 1;
        }
        self.last_velocity = Some(ego.velocity);

        let mut interacting = false;
        for (actor, species) in actors {
            let Some(location) = world.actor_location(actor) else {
                continue;
            };
            let distance = location.distance_2d(&ego.location);
            self.min_distance = self.min_distance.min(distance);

            match species {
                Species::Walker => {
                    if distance <= self.crossing_radius && self.first_crossing.is_none() {
                        self.first_crossing = Some(elapsed);
                    }
                }
                Species::Vehicle => interacting |= distance <= self.interaction_radius,
            }
        }
        if interacting {
            self.interaction_ticks += 1;
        }
    }

    pub fn ticks(&self) -> usize {
        self.ticks
    }

    /// Final fitness vector; `duration` stands in for a crossing that never
    /// happened.
    pub fn finish(&self, diversity: f32, duration: f64) -> FitnessVector {
        let mean_accel = if self.accel_samples == 0 {
            0.0
        } else {
            self.accel_sum / self.accel_samples as f32
        };
        let interaction_rate = if self.ticks == 0 {
            0.0
        } else {
            self.interaction_ticks as f32 / self.ticks as f32
        };

        FitnessVector::new(
            self.min_distance.min(self.max_distance),
            -mean_accel,
            -diversity,
            self.first_crossing.unwrap_or(duration) as f32,
            1.0 - interaction_rate,
        )
    }
}

/// Spatial and categorical spread of a scenario, roughly in `[0, 2]`.
///
/// Mean pairwise start distance normalised by the template diagonal, plus
/// the share of vehicle categories present.
pub fn scenario_diversity(pair: &ScenarioPair, template: &ScenarioTemplate) -> f32 {
    let starts: Vec<_> = pair
        .walkers
        .genes
        .iter()
        .chain(pair.vehicles.genes.iter())
        .map(|g| g.route.start)
        .collect();

    let mut total = 0.0;
    let mut pairs = 0usize;
    for (i, a) in starts.iter().enumerate() {
        for b in &starts[i + 1..] {
            total += a.distance_2d(b);
            pairs += 1;
        }
    }
    let diagonal = template.diagonal();
    let spread = if pairs == 0 || diagonal <= 0.0 {
        0.0
    } else {
        total / pairs as f32 / diagonal
    };

    let categories: HashSet<VehicleCategory> = pair
        .vehicles
        .genes
        .iter()
        .filter_map(|g| g.vehicle().map(|v| v.category))
        .collect();

    spread + categories.len() as f32 / VehicleCategory::ALL.len() as f32
}
