//! Fitness, progress and result types for the co-evolutionary search.

use serde::{Deserialize, Serialize};

use super::{NpcGene, Species};

/// One objective of the fitness vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Objective {
    /// Closest approach between ego and any NPC.
    MinDistance,
    /// Ego acceleration penalty (negated mean absolute acceleration).
    Smoothness,
    /// Negated scenario diversity.
    Diversity,
    /// Seconds until a pedestrian first crosses the ego path.
    CrossingTime,
    /// One minus the fraction of ticks with a vehicle near the ego.
    Interaction,
}

impl Objective {
    pub const ALL: [Objective; 5] = [
        Objective::MinDistance,
        Objective::Smoothness,
        Objective::Diversity,
        Objective::CrossingTime,
        Objective::Interaction,
    ];

    pub const fn index(self) -> usize {
        match self {
            Objective::MinDistance => 0,
            Objective::Smoothness => 1,
            Objective::Diversity => 2,
            Objective::CrossingTime => 3,
            Objective::Interaction => 4,
        }
    }
}

/// Objectives each species is selected on.
pub fn species_objectives(species: Species) -> &'static [Objective] {
    const WALKER: [Objective; 4] = [
        Objective::MinDistance,
        Objective::Smoothness,
        Objective::Diversity,
        Objective::CrossingTime,
    ];
    const VEHICLE: [Objective; 4] = [
        Objective::MinDistance,
        Objective::Smoothness,
        Objective::Diversity,
        Objective::Interaction,
    ];
    match species {
        Species::Walker => &WALKER,
        Species::Vehicle => &VEHICLE,
    }
}

/// Multi-objective score of one evaluated scenario. Lower is better for
/// every component.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FitnessVector(pub [f32; 5]);

impl FitnessVector {
    pub fn new(
        min_distance: f32,
        smoothness: f32,
        diversity: f32,
        crossing_time: f32,
        interaction: f32,
    ) -> Self {
        Self([min_distance, smoothness, diversity, crossing_time, interaction])
    }

    pub fn get(&self, objective: Objective) -> f32 {
        self.0[objective.index()]
    }

    pub fn min_distance(&self) -> f32 {
        self.get(Objective::MinDistance)
    }
    pub fn smoothness(&self) -> f32 {
        self.get(Objective::Smoothness)
    }
    pub fn diversity(&self) -> f32 {
        self.get(Objective::Diversity)
    }
    pub fn crossing_time(&self) -> f32 {
        self.get(Objective::CrossingTime)
    }
    pub fn interaction(&self) -> f32 {
        self.get(Objective::Interaction)
    }
}

/// Serializable view of one evaluated population.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndividualRecord {
    pub id: String,
    pub species: Species,
    pub generation: usize,
    pub genes: Vec<NpcGene>,
    pub fitness: Option<FitnessVector>,
}

/// Pareto archive contents for one species at one point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveSnapshot {
    pub species: Species,
    pub members: Vec<IndividualRecord>,
}

/// Per-generation export handed to fitness sinks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationSnapshot {
    pub generation: usize,
    pub walker_archive: ArchiveSnapshot,
    pub vehicle_archive: ArchiveSnapshot,
    pub evaluations: usize,
}

/// Evolution history for plotting.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EvolutionHistory {
    /// Walker Pareto archive size per generation.
    pub walker_front_size: Vec<usize>,
    /// Vehicle Pareto archive size per generation.
    pub vehicle_front_size: Vec<usize>,
    /// Best (lowest) minimum ego distance seen per generation.
    pub best_min_distance: Vec<f32>,
    /// Evaluations submitted per generation.
    pub evaluations: Vec<usize>,
}

/// Current phase of evolution.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum EvolutionPhase {
    #[default]
    Initializing,
    Evaluating,
    Selecting,
    Complete,
    Stopped,
}

/// Snapshot passed to progress callbacks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionProgress {
    pub generation: usize,
    pub total_generations: usize,
    pub evaluations_completed: usize,
    pub walker_front_size: usize,
    pub vehicle_front_size: usize,
    pub best_min_distance: f32,
    pub phase: EvolutionPhase,
}

/// Reason evolution stopped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum StopReason {
    MaxGenerations,
    Cancelled,
}

/// Statistics from an evolution run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionStats {
    pub generations: usize,
    pub total_evaluations: usize,
    pub elapsed_seconds: f64,
    pub stop_reason: StopReason,
}

/// Final result of an evolution run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoEvolutionResult {
    pub walker_archive: ArchiveSnapshot,
    pub vehicle_archive: ArchiveSnapshot,
    pub stats: EvolutionStats,
    pub history: EvolutionHistory,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors() {
        let f = FitnessVector::new(1.0, 2.0, 3.0, 4.0, 5.0);
        assert_eq!(f.min_distance(), 1.0);
        assert_eq!(f.smoothness(), 2.0);
        assert_eq!(f.diversity(), 3.0);
        assert_eq!(f.crossing_time(), 4.0);
        assert_eq!(f.interaction(), 5.0);
    }

    #[test]
    fn test_species_objectives() {
        assert!(species_objectives(Species::Walker).contains(&Objective::CrossingTime));
        assert!(!species_objectives(Species::Walker).contains(&Objective::Interaction));
        assert!(species_objectives(Species::Vehicle).contains(&Objective::Interaction));
        for o in Objective::ALL {
            assert_eq!(Objective::ALL[o.index()], o);
        }
    }
}
