//! Configuration types for a fuzzing run.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{Location, Species};

/// Top-level configuration for a co-evolutionary fuzzing run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FuzzConfig {
    /// Generational loop settings.
    #[serde(default)]
    pub ga: GaConfig,
    /// Spatial extent and road classification of the scenario segment.
    #[serde(default)]
    pub template: ScenarioTemplate,
    /// Sampling bounds for individual genes.
    #[serde(default)]
    pub genes: GeneBounds,
    /// Evaluation hand-off settings.
    #[serde(default)]
    pub bridge: BridgeConfig,
    /// Scenario execution settings for the drive loop.
    #[serde(default)]
    pub drive: DriveConfig,
}

/// Genetic algorithm settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GaConfig {
    /// Individuals kept per species after selection.
    #[serde(default = "default_population_size")]
    pub population_size: usize,
    /// Offspring produced per species each generation.
    #[serde(default = "default_offspring_count")]
    pub offspring_count: usize,
    /// Generations to run after the initial batch.
    #[serde(default = "default_max_generations")]
    pub max_generations: usize,
    /// Probability an offspring comes from crossover.
    #[serde(default = "default_crossover_prob")]
    pub crossover_prob: f32,
    /// Probability an offspring comes from mutation.
    #[serde(default = "default_mutation_prob")]
    pub mutation_prob: f32,
    /// Optional cap on each Pareto archive.
    #[serde(default)]
    pub archive_max_size: Option<usize>,
    /// Random seed for reproducibility.
    #[serde(default)]
    pub random_seed: Option<u64>,
}

impl Default for GaConfig {
    fn default() -> Self {
        Self {
            population_size: default_population_size(),
            offspring_count: default_offspring_count(),
            max_generations: default_max_generations(),
            crossover_prob: default_crossover_prob(),
            mutation_prob: default_mutation_prob(),
            archive_max_size: None,
            random_seed: None,
        }
    }
}

fn default_population_size() -> usize {
    10
}
fn default_offspring_count() -> usize {
    10
}
fn default_max_generations() -> usize {
    100
}
fn default_crossover_prob() -> f32 {
    0.6
}
fn default_mutation_prob() -> f32 {
    0.4
}

/// Bounds used when sampling genes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneBounds {
    /// Upper bound of the start-time offset in seconds.
    #[serde(default = "default_max_start_time")]
    pub max_start_time: f32,
    /// Upper bound of a driving vehicle's initial speed (m/s).
    #[serde(default = "default_max_initial_speed")]
    pub max_initial_speed: f32,
    /// Minimum lateral distance a walker must cover between start and end.
    #[serde(default = "default_min_lateral_offset")]
    pub min_lateral_offset: f32,
    /// Mean pedestrian walking speed (m/s).
    #[serde(default = "default_walker_speed_mean")]
    pub walker_speed_mean: f32,
    /// Standard deviation of pedestrian walking speed.
    #[serde(default = "default_walker_speed_std")]
    pub walker_speed_std: f32,
    /// Clamp range for pedestrian walking speed.
    #[serde(default = "default_walker_speed_bounds")]
    pub walker_speed_bounds: (f32, f32),
}

impl Default for GeneBounds {
    fn default() -> Self {
        Self {
            max_start_time: default_max_start_time(),
            max_initial_speed: default_max_initial_speed(),
            min_lateral_offset: default_min_lateral_offset(),
            walker_speed_mean: default_walker_speed_mean(),
            walker_speed_std: default_walker_speed_std(),
            walker_speed_bounds: default_walker_speed_bounds(),
        }
    }
}

fn default_max_start_time() -> f32 {
    2.0
}
fn default_max_initial_speed() -> f32 {
    20.0
}
fn default_min_lateral_offset() -> f32 {
    5.0
}
fn default_walker_speed_mean() -> f32 {
    1.4
}
fn default_walker_speed_std() -> f32 {
    0.4
}
fn default_walker_speed_bounds() -> (f32, f32) {
    (0.5, 3.0)
}

/// Scenario segment handed over by road segmentation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioTemplate {
    /// Segment length along the ego route (metres).
    #[serde(default = "default_extent")]
    pub length: f32,
    /// Segment width across the road (metres).
    #[serde(default = "default_extent")]
    pub width: f32,
    /// Road classification as reported by segmentation.
    #[serde(default = "default_road_type")]
    pub road_type: String,
    /// World location of the segment centre.
    #[serde(default)]
    pub origin: Location,
}

impl Default for ScenarioTemplate {
    fn default() -> Self {
        Self {
            length: default_extent(),
            width: default_extent(),
            road_type: default_road_type(),
            origin: Location::default(),
        }
    }
}

fn default_extent() -> f32 {
    30.0
}
fn default_road_type() -> String {
    "single-lane".to_string()
}

impl ScenarioTemplate {
    /// Parse the road type, falling back to the default on bad input.
    pub fn resolve(&self) -> (RoadType, SpeciesCaps) {
        let road = match self.road_type.parse::<RoadType>() {
            Ok(road) => road,
            Err(e) => {
                log::warn!("{e}; using {} caps", RoadType::default());
                RoadType::default()
            }
        };
        (road, SpeciesCaps::for_road(road))
    }

    /// Diagonal of the sampling area, used to normalise distances.
    pub fn diagonal(&self) -> f32 {
        // End points may lie up to 1.5 lengths ahead of the segment start.
        let span = self.length * 2.0;
        (span * span + self.width * self.width).sqrt()
    }
}

/// Road classification used to pick population caps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RoadType {
    #[default]
    SingleLane,
    MultiLane,
    Junction,
}

impl fmt::Display for RoadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RoadType::SingleLane => "single-lane",
            RoadType::MultiLane => "multi-lane",
            RoadType::Junction => "junction",
        };
        f.write_str(s)
    }
}

impl FromStr for RoadType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        match normalized.as_str() {
            "single-lane" | "singlelane" | "straight" => Ok(RoadType::SingleLane),
            "multi-lane" | "multilane" | "wide" => Ok(RoadType::MultiLane),
            "junction" | "intersection" => Ok(RoadType::Junction),
            _ => Err(ConfigError::UnknownRoadType(s.to_string())),
        }
    }
}

/// Maximum number of NPCs per species in one scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeciesCaps {
    pub walkers: usize,
    pub vehicles: usize,
}

impl Default for SpeciesCaps {
    fn default() -> Self {
        Self::for_road(RoadType::default())
    }
}

impl SpeciesCaps {
    /// Wider roads hold more vehicles; junctions more pedestrians.
    pub fn for_road(road: RoadType) -> Self {
        match road {
            RoadType::SingleLane => Self {
                walkers: 4,
                vehicles: 4,
            },
            RoadType::MultiLane => Self {
                walkers: 4,
                vehicles: 8,
            },
            RoadType::Junction => Self {
                walkers: 6,
                vehicles: 6,
            },
        }
    }

    pub fn cap(&self, species: Species) -> usize {
        match species {
            Species::Walker => self.walkers,
            Species::Vehicle => self.vehicles,
        }
    }
}

/// Settings of the evaluation hand-off between scheduler and drive loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Longest interval between cancellation checks while waiting.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// How long the initial batch may sit unclaimed before the run aborts.
    #[serde(default = "default_claim_timeout_secs")]
    pub claim_timeout_secs: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            claim_timeout_secs: default_claim_timeout_secs(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    50
}
fn default_claim_timeout_secs() -> u64 {
    60
}

/// Settings for executing one scenario in the world.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveConfig {
    /// World ticks driven per scenario.
    #[serde(default = "default_scenario_ticks")]
    pub scenario_ticks: u64,
    /// Simulated seconds per tick.
    #[serde(default = "default_fixed_delta_seconds")]
    pub fixed_delta_seconds: f64,
    /// Sleep between polls when no request is pending.
    #[serde(default = "default_idle_interval_ms")]
    pub idle_interval_ms: u64,
    /// Walker distance to ego that counts as crossing its path.
    #[serde(default = "default_crossing_radius")]
    pub crossing_radius: f32,
    /// Vehicle distance to ego that counts as an interaction.
    #[serde(default = "default_interaction_radius")]
    pub interaction_radius: f32,
    /// Upper bound reported for the minimum ego distance.
    #[serde(default = "default_max_distance")]
    pub max_distance: f32,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            scenario_ticks: default_scenario_ticks(),
            fixed_delta_seconds: default_fixed_delta_seconds(),
            idle_interval_ms: default_idle_interval_ms(),
            crossing_radius: default_crossing_radius(),
            interaction_radius: default_interaction_radius(),
            max_distance: default_max_distance(),
        }
    }
}

fn default_scenario_ticks() -> u64 {
    200
}
fn default_fixed_delta_seconds() -> f64 {
    0.05
}
fn default_idle_interval_ms() -> u64 {
    10
}
fn default_crossing_radius() -> f32 {
    4.0
}
fn default_interaction_radius() -> f32 {
    8.0
}
fn default_max_distance() -> f32 {
    100.0
}

/// Placement settings for the scenario runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioConfig {
    /// World location gene coordinates are relative to.
    #[serde(default)]
    pub origin: Location,
    /// Height added to vehicle spawn points.
    #[serde(default = "default_vehicle_lift")]
    pub vehicle_spawn_lift: f32,
    /// Height added to walker spawn points.
    #[serde(default = "default_walker_lift")]
    pub walker_spawn_lift: f32,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            origin: Location::default(),
            vehicle_spawn_lift: default_vehicle_lift(),
            walker_spawn_lift: default_walker_lift(),
        }
    }
}

fn default_vehicle_lift() -> f32 {
    2.5
}
fn default_walker_lift() -> f32 {
    1.5
}

impl From<&ScenarioTemplate> for ScenarioConfig {
    fn from(template: &ScenarioTemplate) -> Self {
        Self {
            origin: template.origin,
            ..Default::default()
        }
    }
}

// ============================================================================
// Validation
// ============================================================================

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Population size must be at least 1")]
    PopulationTooSmall,
    #[error("Offspring count must be at least 1")]
    NoOffspring,
    #[error("Invalid variation probabilities: {0}")]
    InvalidProbability(String),
    #[error("Scenario extent must be positive (length {length}, width {width})")]
    InvalidExtent { length: f32, width: f32 },
    #[error("Invalid gene bounds: {0}")]
    InvalidBounds(String),
    #[error("Scenario must run for at least one tick")]
    InvalidTicks,
    #[error("Unknown road type '{0}'")]
    UnknownRoadType(String),
}

impl FuzzConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ga.population_size < 1 {
            return Err(ConfigError::PopulationTooSmall);
        }
        if self.ga.offspring_count < 1 {
            return Err(ConfigError::NoOffspring);
        }

        let (cx, mt) = (self.ga.crossover_prob, self.ga.mutation_prob);
        if !(0.0..=1.0).contains(&cx) || !(0.0..=1.0).contains(&mt) {
            return Err(ConfigError::InvalidProbability(format!(
                "crossover {cx} and mutation {mt} must lie in [0, 1]"
            )));
        }
        if cx + mt > 1.0 + f32::EPSILON {
            return Err(ConfigError::InvalidProbability(format!(
                "crossover + mutation = {} exceeds 1",
                cx + mt
            )));
        }

        if self.template.length <= 0.0 || self.template.width <= 0.0 {
            return Err(ConfigError::InvalidExtent {
                length: self.template.length,
                width: self.template.width,
            });
        }

        let genes = &self.genes;
        if genes.max_start_time < 0.0 {
            return Err(ConfigError::InvalidBounds(format!(
                "max_start_time {} is negative",
                genes.max_start_time
            )));
        }
        if genes.max_initial_speed < 0.0 {
            return Err(ConfigError::InvalidBounds(format!(
                "max_initial_speed {} is negative",
                genes.max_initial_speed
            )));
        }
        if genes.min_lateral_offset < 0.0 {
            return Err(ConfigError::InvalidBounds(format!(
                "min_lateral_offset {} is negative",
                genes.min_lateral_offset
            )));
        }
        let (lo, hi) = genes.walker_speed_bounds;
        if lo < 0.0 || lo > hi {
            return Err(ConfigError::InvalidBounds(format!(
                "walker speed min ({lo}) > max ({hi})"
            )));
        }

        if self.drive.scenario_ticks == 0 {
            return Err(ConfigError::InvalidTicks);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = FuzzConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.ga.crossover_prob, 0.6);
        assert_eq!(config.ga.mutation_prob, 0.4);
    }

    #[test]
    fn test_probabilities_checked() {
        let mut config = FuzzConfig::default();
        config.ga.crossover_prob = 0.8;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidProbability(_))
        ));
    }

    #[test]
    fn test_extent_checked() {
        let mut config = FuzzConfig::default();
        config.template.width = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidExtent { .. })
        ));
    }

    #[test]
    fn test_road_type_parse() {
        assert_eq!("Multi_Lane".parse::<RoadType>(), Ok(RoadType::MultiLane));
        assert_eq!(" junction ".parse::<RoadType>(), Ok(RoadType::Junction));
        assert!("roundabout???".parse::<RoadType>().is_err());
    }

    #[test]
    fn test_malformed_road_type_falls_back() {
        let template = ScenarioTemplate {
            road_type: "%%garbage".to_string(),
            ..Default::default()
        };
        let (road, caps) = template.resolve();
        assert_eq!(road, RoadType::SingleLane);
        assert_eq!(caps, SpeciesCaps::default());
    }

    #[test]
    fn test_wider_roads_hold_more_vehicles() {
        let single = SpeciesCaps::for_road(RoadType::SingleLane);
        let multi = SpeciesCaps::for_road(RoadType::MultiLane);
        assert!(multi.vehicles > single.vehicles);
        assert_eq!(multi.cap(Species::Vehicle), multi.vehicles);
    }

    #[test]
    fn test_serialization() {
        let config = FuzzConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: FuzzConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.ga.population_size, config.ga.population_size);

        let sparse: FuzzConfig = serde_json::from_str(r#"{"ga": {"max_generations": 3}}"#).unwrap();
        assert_eq!(sparse.ga.max_generations, 3);
        assert_eq!(sparse.ga.offspring_count, 10);
    }
}
