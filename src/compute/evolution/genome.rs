//! Gene manipulation utilities for the co-evolutionary search.
//!
//! Provides random generation, crossover, and mutation of populations.

use rand::prelude::*;
use rand_distr::Normal;

use crate::schema::{
    DrivingProfile, FuzzConfig, GeneBounds, Location, NpcGene, NpcKind, Route, Species,
    SpeciesCaps, VehicleCategory, VehicleMotion, VehicleTraits, WalkerMotion, WalkerTraits,
};

use super::population::Population;

/// Number of weighted field draws per field mutation (with replacement).
const FIELDS_PER_MUTATION: usize = 3;

/// Attempts at sampling a lateral offset before falling back to the far edge.
const LATERAL_ATTEMPTS: usize = 16;

const CATEGORY_WEIGHTS: [(VehicleCategory, f32); 5] = [
    (VehicleCategory::Car, 0.35),
    (VehicleCategory::Truck, 0.25),
    (VehicleCategory::Van, 0.2),
    (VehicleCategory::Motorcycle, 0.1),
    (VehicleCategory::Bicycle, 0.1),
];

const PROFILE_WEIGHTS: [(DrivingProfile, f32); 3] = [
    (DrivingProfile::Normal, 0.6),
    (DrivingProfile::Cautious, 0.2),
    (DrivingProfile::Aggressive, 0.2),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VehicleMotionKind {
    Driving,
    StartingParked,
    Parked,
}

const VEHICLE_MOTION_WEIGHTS: [(VehicleMotionKind, f32); 3] = [
    (VehicleMotionKind::Driving, 0.6),
    (VehicleMotionKind::StartingParked, 0.3),
    (VehicleMotionKind::Parked, 0.1),
];

/// Probability a freshly sampled walker walks rather than stands.
const WALKING_PROB: f64 = 0.8;

/// Mutable attributes of a vehicle gene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VehicleField {
    Start,
    End,
    StartTime,
    Category,
    InitialSpeed,
    Motion,
    Profile,
}

impl VehicleField {
    /// Selection weight of each field; positions outweigh status.
    pub const WEIGHTS: [(VehicleField, f32); 7] = [
        (VehicleField::Start, 0.2),
        (VehicleField::End, 0.2),
        (VehicleField::StartTime, 0.1),
        (VehicleField::Category, 0.15),
        (VehicleField::InitialSpeed, 0.1),
        (VehicleField::Motion, 0.05),
        (VehicleField::Profile, 0.2),
    ];
}

/// Mutable attributes of a walker gene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WalkerField {
    Start,
    End,
    StartTime,
    Motion,
    MaxSpeed,
}

impl WalkerField {
    pub const WEIGHTS: [(WalkerField, f32); 5] = [
        (WalkerField::Start, 0.3),
        (WalkerField::End, 0.3),
        (WalkerField::StartTime, 0.2),
        (WalkerField::Motion, 0.1),
        (WalkerField::MaxSpeed, 0.1),
    ];
}

/// A field resampled by a field mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutatedField {
    Vehicle(VehicleField),
    Walker(WalkerField),
}

/// Which of the three mutation operators fired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    /// A gene was removed from the population.
    Removed { index: usize },
    /// A fresh random gene was appended.
    Added,
    /// Fields of one gene were resampled.
    FieldsMutated {
        index: usize,
        fields: Vec<MutatedField>,
    },
    /// The add operator was chosen but the population was at its cap.
    Unchanged,
}

/// Variation errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VariationError {
    #[error("Cannot cross a {left:?} population with a {right:?} population")]
    SpeciesMismatch { left: Species, right: Species },
}

/// Sampling space for genes: scenario extent, bounds and species caps.
#[derive(Debug, Clone)]
pub struct GeneSpace {
    pub length: f32,
    pub width: f32,
    pub bounds: GeneBounds,
    pub caps: SpeciesCaps,
}

impl GeneSpace {
    pub fn from_config(config: &FuzzConfig) -> Self {
        let (_, caps) = config.template.resolve();
        Self {
            length: config.template.length,
            width: config.template.width,
            bounds: config.genes.clone(),
            caps,
        }
    }
}

impl Default for GeneSpace {
    fn default() -> Self {
        Self::from_config(&FuzzConfig::default())
    }
}

/// Random number generator wrapper for gene operations.
pub struct GeneRng {
    rng: StdRng,
}

impl GeneRng {
    /// Create from seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Uniform draw in `[0, 1)`.
    pub fn unit(&mut self) -> f32 {
        self.rng.r#gen::<f32>()
    }

    /// Uniform index in `0..len`; `len` must be non-zero.
    pub fn index(&mut self, len: usize) -> usize {
        self.rng.gen_range(0..len)
    }

    /// Two distinct indices in `0..len`, or the same one when `len == 1`.
    pub fn index_pair(&mut self, len: usize) -> (usize, usize) {
        if len < 2 {
            return (0, 0);
        }
        let first = self.rng.gen_range(0..len);
        let mut second = self.rng.gen_range(0..len - 1);
        if second >= first {
            second += 1;
        }
        (first, second)
    }

    /// Generate a population with a random number of agents in `[1, cap]`.
    pub fn random_population(
        &mut self,
        species: Species,
        generation: usize,
        index: usize,
        space: &GeneSpace,
    ) -> Population {
        let cap = space.caps.cap(species).max(1);
        let count = self.rng.gen_range(1..=cap);
        let genes = (0..count).map(|_| self.random_gene(species, space)).collect();
        Population::new(species, generation, index, genes)
    }

    /// Generate a random gene within the scenario extent.
    pub fn random_gene(&mut self, species: Species, space: &GeneSpace) -> NpcGene {
        match species {
            Species::Vehicle => {
                let start = self.random_start(space);
                let end = self.random_end(space);
                NpcGene {
                    route: Route { start, end },
                    start_time: self.random_start_time(space),
                    kind: NpcKind::Vehicle(VehicleTraits {
                        category: self.random_category(),
                        motion: self.random_vehicle_motion(space),
                        profile: self.random_profile(),
                    }),
                }
            }
            Species::Walker => {
                let start = self.random_start(space);
                let mut end = self.random_end(space);
                end.y = self.crossing_y(start.y, space);
                NpcGene {
                    route: Route { start, end },
                    start_time: self.random_start_time(space),
                    kind: NpcKind::Walker(WalkerTraits {
                        motion: self.random_walker_motion(space),
                    }),
                }
            }
        }
    }

    fn random_start(&mut self, space: &GeneSpace) -> Location {
        let half_l = space.length / 2.0;
        let half_w = space.width / 2.0;
        Location::new(
            self.rng.gen_range(-half_l..=half_l),
            self.rng.gen_range(-half_w..=half_w),
            0.0,
        )
    }

    fn random_end(&mut self, space: &GeneSpace) -> Location {
        let half_l = space.length / 2.0;
        let half_w = space.width / 2.0;
        Location::new(
            self.rng.gen_range(-half_l..=half_l * 3.0),
            self.rng.gen_range(-half_w..=half_w),
            0.0,
        )
    }

    /// A lateral coordinate at least `min_lateral_offset` away from `anchor`.
    fn crossing_y(&mut self, anchor: f32, space: &GeneSpace) -> f32 {
        let half_w = space.width / 2.0;
        let min_offset = space.bounds.min_lateral_offset;
        for _ in 0..LATERAL_ATTEMPTS {
            let y = self.rng.gen_range(-half_w..=half_w);
            if (y - anchor).abs() >= min_offset {
                return y;
            }
        }
        // Road too narrow for the offset: use the far edge.
        if anchor >= 0.0 { -half_w } else { half_w }
    }

    fn random_start_time(&mut self, space: &GeneSpace) -> f32 {
        self.rng.gen_range(0.0..=space.bounds.max_start_time)
    }

    fn random_category(&mut self) -> VehicleCategory {
        CATEGORY_WEIGHTS
            .choose_weighted(&mut self.rng, |(_, w)| *w)
            .map_or(VehicleCategory::Car, |(c, _)| *c)
    }

    fn random_profile(&mut self) -> DrivingProfile {
        PROFILE_WEIGHTS
            .choose_weighted(&mut self.rng, |(_, w)| *w)
            .map_or(DrivingProfile::Normal, |(p, _)| *p)
    }

    fn random_initial_speed(&mut self, space: &GeneSpace) -> f32 {
        self.rng.gen_range(0.0..=space.bounds.max_initial_speed)
    }

    fn random_vehicle_motion(&mut self, space: &GeneSpace) -> VehicleMotion {
        let kind = VEHICLE_MOTION_WEIGHTS
            .choose_weighted(&mut self.rng, |(_, w)| *w)
            .map_or(VehicleMotionKind::Driving, |(k, _)| *k);
        match kind {
            VehicleMotionKind::Driving => VehicleMotion::Driving {
                initial_speed: self.random_initial_speed(space),
            },
            VehicleMotionKind::StartingParked => VehicleMotion::StartingParked,
            VehicleMotionKind::Parked => VehicleMotion::Parked,
        }
    }

    fn random_walker_speed(&mut self, space: &GeneSpace) -> f32 {
        let bounds = &space.bounds;
        let (lo, hi) = bounds.walker_speed_bounds;
        match Normal::new(bounds.walker_speed_mean, bounds.walker_speed_std.max(0.0)) {
            Ok(normal) => self.rng.sample(normal).clamp(lo, hi),
            Err(_) => bounds.walker_speed_mean.clamp(lo, hi),
        }
    }

    fn random_walker_motion(&mut self, space: &GeneSpace) -> WalkerMotion {
        if self.rng.gen_bool(WALKING_PROB) {
            WalkerMotion::Walking {
                max_speed: self.random_walker_speed(space),
            }
        } else {
            WalkerMotion::Stationary
        }
    }

    /// Pick one of two values with equal probability.
    fn pick<T>(&mut self, a: T, b: T) -> T {
        if self.rng.gen_bool(0.5) { a } else { b }
    }

    /// Uniform attribute-wise crossover of two populations.
    ///
    /// Overlapping indices take every attribute independently from either
    /// parent, with a walker's route counted as one attribute. The tail of
    /// the longer parent is copied unchanged.
    pub fn crossover(
        &mut self,
        parent1: &Population,
        parent2: &Population,
        generation: usize,
        index: usize,
    ) -> Result<Population, VariationError> {
        if parent1.species != parent2.species {
            return Err(VariationError::SpeciesMismatch {
                left: parent1.species,
                right: parent2.species,
            });
        }

        let overlap = parent1.len().min(parent2.len());
        let longer = if parent1.len() >= parent2.len() {
            parent1
        } else {
            parent2
        };

        let mut genes: Vec<NpcGene> = parent1
            .genes
            .iter()
            .zip(parent2.genes.iter())
            .map(|(a, b)| self.crossover_gene(a, b))
            .collect();
        genes.extend(longer.genes[overlap..].iter().copied());

        Ok(Population::new(parent1.species, generation, index, genes))
    }

    /// Walker routes are inherited whole so the road crossing survives.
    fn crossover_gene(&mut self, a: &NpcGene, b: &NpcGene) -> NpcGene {
        let route = if a.walker().is_some() && b.walker().is_some() {
            self.pick(a.route, b.route)
        } else {
            Route {
                start: self.pick(a.route.start, b.route.start),
                end: self.pick(a.route.end, b.route.end),
            }
        };
        let start_time = self.pick(a.start_time, b.start_time);

        let kind = match (&a.kind, &b.kind) {
            (NpcKind::Vehicle(va), NpcKind::Vehicle(vb)) => NpcKind::Vehicle(VehicleTraits {
                category: self.pick(va.category, vb.category),
                motion: self.pick(va.motion, vb.motion),
                profile: self.pick(va.profile, vb.profile),
            }),
            (NpcKind::Walker(wa), NpcKind::Walker(wb)) => NpcKind::Walker(WalkerTraits {
                motion: self.pick(wa.motion, wb.motion),
            }),
            _ => self.pick(a.kind, b.kind),
        };

        NpcGene {
            route,
            start_time,
            kind,
        }
    }

    /// Apply exactly one of remove, add, or field mutation.
    ///
    /// Never leaves the population empty or above its species cap.
    pub fn mutate(&mut self, population: &mut Population, space: &GeneSpace) -> MutationOutcome {
        let cap = space.caps.cap(population.species).max(1);
        let p = self.unit();

        let outcome = if p <= 0.2 && population.len() > 1 {
            let index = self.index(population.len());
            population.genes.remove(index);
            MutationOutcome::Removed { index }
        } else if p <= 0.5 || population.is_empty() {
            if population.len() < cap {
                let gene = self.random_gene(population.species, space);
                population.genes.push(gene);
                MutationOutcome::Added
            } else {
                MutationOutcome::Unchanged
            }
        } else {
            let index = self.index(population.len());
            let fields = self.mutate_fields(&mut population.genes[index], space);
            MutationOutcome::FieldsMutated { index, fields }
        };

        if outcome != MutationOutcome::Unchanged {
            population.invalidate();
        }
        outcome
    }

    /// Resample a weighted random subset of a gene's fields.
    fn mutate_fields(&mut self, gene: &mut NpcGene, space: &GeneSpace) -> Vec<MutatedField> {
        let mut fields: Vec<MutatedField> = Vec::with_capacity(FIELDS_PER_MUTATION);
        for _ in 0..FIELDS_PER_MUTATION {
            let field = match gene.kind {
                NpcKind::Vehicle(_) => VehicleField::WEIGHTS
                    .choose_weighted(&mut self.rng, |(_, w)| *w)
                    .map(|(f, _)| MutatedField::Vehicle(*f)),
                NpcKind::Walker(_) => WalkerField::WEIGHTS
                    .choose_weighted(&mut self.rng, |(_, w)| *w)
                    .map(|(f, _)| MutatedField::Walker(*f)),
            };
            if let Ok(field) = field
                && !fields.contains(&field)
            {
                fields.push(field);
            }
        }

        for field in &fields {
            match *field {
                MutatedField::Vehicle(f) => self.mutate_vehicle_field(gene, f, space),
                MutatedField::Walker(f) => self.mutate_walker_field(gene, f, space),
            }
        }
        fields
    }

    fn mutate_vehicle_field(&mut self, gene: &mut NpcGene, field: VehicleField, space: &GeneSpace) {
        match field {
            VehicleField::Start => gene.route.start = self.random_start(space),
            VehicleField::End => gene.route.end = self.random_end(space),
            VehicleField::StartTime => gene.start_time = self.random_start_time(space),
            VehicleField::Category => {
                let category = self.random_category();
                if let NpcKind::Vehicle(traits) = &mut gene.kind {
                    traits.category = category;
                }
            }
            VehicleField::InitialSpeed => {
                let speed = self.random_initial_speed(space);
                if let NpcKind::Vehicle(traits) = &mut gene.kind
                    && let VehicleMotion::Driving { initial_speed } = &mut traits.motion
                {
                    *initial_speed = speed;
                }
            }
            VehicleField::Motion => {
                let motion = self.random_vehicle_motion(space);
                if let NpcKind::Vehicle(traits) = &mut gene.kind {
                    traits.motion = motion;
                }
            }
            VehicleField::Profile => {
                let profile = self.random_profile();
                if let NpcKind::Vehicle(traits) = &mut gene.kind {
                    traits.profile = profile;
                }
            }
        }
    }

    fn mutate_walker_field(&mut self, gene: &mut NpcGene, field: WalkerField, space: &GeneSpace) {
        match field {
            WalkerField::Start => {
                let mut start = self.random_start(space);
                start.y = self.crossing_y(gene.route.end.y, space);
                gene.route.start = start;
            }
            WalkerField::End => {
                let mut end = self.random_end(space);
                end.y = self.crossing_y(gene.route.start.y, space);
                gene.route.end = end;
            }
            WalkerField::StartTime => gene.start_time = self.random_start_time(space),
            WalkerField::Motion => {
                let motion = self.random_walker_motion(space);
                if let NpcKind::Walker(traits) = &mut gene.kind {
                    traits.motion = motion;
                }
            }
            WalkerField::MaxSpeed => {
                let speed = self.random_walker_speed(space);
                if let NpcKind::Walker(traits) = &mut gene.kind
                    && let WalkerMotion::Walking { max_speed } = &mut traits.motion
                {
                    *max_speed = speed;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn space() -> GeneSpace {
        GeneSpace::default()
    }

    #[test]
    fn test_random_gene_within_extent() {
        let mut rng = GeneRng::new(42);
        let space = space();

        for _ in 0..200 {
            let gene = rng.random_gene(Species::Vehicle, &space);
            assert!(gene.route.start.x.abs() <= space.length / 2.0);
            assert!(gene.route.start.y.abs() <= space.width / 2.0);
            assert!(gene.route.end.x >= -space.length / 2.0);
            assert!(gene.route.end.x <= space.length * 1.5);
            assert!((0.0..=space.bounds.max_start_time).contains(&gene.start_time));
            let traits = gene.vehicle().unwrap();
            if let Some(speed) = traits.motion.initial_speed() {
                assert!((0.0..=space.bounds.max_initial_speed).contains(&speed));
            }
        }
    }

    #[test]
    fn test_walkers_cross_the_road() {
        let mut rng = GeneRng::new(7);
        let space = space();

        for _ in 0..200 {
            let gene = rng.random_gene(Species::Walker, &space);
            let lateral = (gene.route.start.y - gene.route.end.y).abs();
            assert!(lateral >= space.bounds.min_lateral_offset);
            if let Some(speed) = gene.walker().unwrap().motion.max_speed() {
                let (lo, hi) = space.bounds.walker_speed_bounds;
                assert!((lo..=hi).contains(&speed));
            }
        }
    }

    #[test]
    fn test_narrow_road_uses_far_edge() {
        let mut rng = GeneRng::new(3);
        let mut space = space();
        space.width = 4.0;

        let gene = rng.random_gene(Species::Walker, &space);
        assert!((gene.route.end.y.abs() - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_crossover_length_and_provenance() {
        let mut rng = GeneRng::new(42);
        let space = space();
        let p1 = Population::new(
            Species::Vehicle,
            0,
            0,
            (0..4).map(|_| rng.random_gene(Species::Vehicle, &space)).collect(),
        );
        let p2 = Population::new(
            Species::Vehicle,
            0,
            1,
            (0..2).map(|_| rng.random_gene(Species::Vehicle, &space)).collect(),
        );

        let child = rng.crossover(&p1, &p2, 1, 0).unwrap();
        assert_eq!(child.len(), 4);
        assert!(child.fitness.is_none());

        for i in 0..2 {
            let (c, a, b) = (&child.genes[i], &p1.genes[i], &p2.genes[i]);
            assert!(c.route.start == a.route.start || c.route.start == b.route.start);
            assert!(c.route.end == a.route.end || c.route.end == b.route.end);
            assert!(c.start_time == a.start_time || c.start_time == b.start_time);
            let (cv, av, bv) = (c.vehicle().unwrap(), a.vehicle().unwrap(), b.vehicle().unwrap());
            assert!(cv.category == av.category || cv.category == bv.category);
            assert!(cv.motion == av.motion || cv.motion == bv.motion);
            assert!(cv.profile == av.profile || cv.profile == bv.profile);
        }
        assert_eq!(child.genes[2..], p1.genes[2..]);
    }

    #[test]
    fn test_walker_crossover_keeps_crossing() {
        let space = space();

        for seed in 0..50 {
            let mut rng = GeneRng::new(seed);
            let parents: Vec<Population> = (0..2)
                .map(|i| {
                    let genes = (0..3).map(|_| rng.random_gene(Species::Walker, &space)).collect();
                    Population::new(Species::Walker, 0, i, genes)
                })
                .collect();

            let child = rng.crossover(&parents[0], &parents[1], 1, 0).unwrap();
            for (i, gene) in child.genes.iter().enumerate() {
                let lateral = (gene.route.start.y - gene.route.end.y).abs();
                assert!(lateral >= space.bounds.min_lateral_offset);
                assert!(gene.route == parents[0].genes[i].route || gene.route == parents[1].genes[i].route);
            }
        }
    }

    #[test]
    fn test_crossover_rejects_mixed_species() {
        let mut rng = GeneRng::new(1);
        let space = space();
        let walkers = rng.random_population(Species::Walker, 0, 0, &space);
        let vehicles = rng.random_population(Species::Vehicle, 0, 1, &space);

        assert_eq!(
            rng.crossover(&walkers, &vehicles, 1, 0),
            Err(VariationError::SpeciesMismatch {
                left: Species::Walker,
                right: Species::Vehicle
            })
        );
    }

    #[test]
    fn test_single_gene_never_removed() {
        let mut rng = GeneRng::new(11);
        let space = space();

        for _ in 0..500 {
            let mut pop = Population::new(
                Species::Walker,
                0,
                0,
                vec![rng.random_gene(Species::Walker, &space)],
            );
            let outcome = rng.mutate(&mut pop, &space);
            assert!(!matches!(outcome, MutationOutcome::Removed { .. }));
            assert!(!pop.is_empty());
        }
    }

    #[test]
    fn test_empty_population_gets_gene() {
        let mut rng = GeneRng::new(5);
        let space = space();
        let mut pop = Population::new(Species::Vehicle, 0, 0, Vec::new());

        assert_eq!(rng.mutate(&mut pop, &space), MutationOutcome::Added);
        assert_eq!(pop.len(), 1);
    }

    #[test]
    fn test_full_population_add_is_noop() {
        let mut rng = GeneRng::new(9);
        let space = space();
        let cap = space.caps.vehicles;

        let mut saw_unchanged = false;
        for _ in 0..200 {
            let genes = (0..cap)
                .map(|_| rng.random_gene(Species::Vehicle, &space))
                .collect();
            let mut pop = Population::new(Species::Vehicle, 0, 0, genes);
            pop.fitness = Some(Default::default());
            if rng.mutate(&mut pop, &space) == MutationOutcome::Unchanged {
                saw_unchanged = true;
                assert_eq!(pop.len(), cap);
                assert!(pop.is_evaluated());
            }
        }
        assert!(saw_unchanged);
    }

    #[test]
    fn test_field_mutation_keeps_species_and_invariants() {
        let mut rng = GeneRng::new(13);
        let space = space();

        let mut saw_fields = false;
        for _ in 0..300 {
            let mut pop = rng.random_population(Species::Vehicle, 0, 0, &space);
            if let MutationOutcome::FieldsMutated { index, fields } = rng.mutate(&mut pop, &space) {
                saw_fields = true;
                assert!(!fields.is_empty() && fields.len() <= FIELDS_PER_MUTATION);
                assert!(fields.iter().all(|f| matches!(f, MutatedField::Vehicle(_))));
                assert_eq!(pop.genes[index].species(), Species::Vehicle);
                assert!(!pop.is_evaluated());
            }
        }
        assert!(saw_fields);
    }

    #[test]
    fn test_weight_tables_sum_to_one() {
        let v: f32 = VehicleField::WEIGHTS.iter().map(|(_, w)| w).sum();
        let w: f32 = WalkerField::WEIGHTS.iter().map(|(_, w)| w).sum();
        assert!((v - 1.0).abs() < 1e-6);
        assert!((w - 1.0).abs() < 1e-6);
    }

    proptest! {
        #[test]
        fn prop_mutation_respects_cap(seed in any::<u64>(), rounds in 1usize..40) {
            let mut rng = GeneRng::new(seed);
            let space = space();
            for species in [Species::Walker, Species::Vehicle] {
                let cap = space.caps.cap(species);
                let mut pop = rng.random_population(species, 0, 0, &space);
                for _ in 0..rounds {
                    rng.mutate(&mut pop, &space);
                    prop_assert!(!pop.is_empty());
                    prop_assert!(pop.len() <= cap);
                    prop_assert!(pop.genes.iter().all(|g| g.species() == species));
                }
            }
        }

        #[test]
        fn prop_crossover_length(seed in any::<u64>()) {
            let mut rng = GeneRng::new(seed);
            let space = space();
            let a = rng.random_population(Species::Walker, 0, 0, &space);
            let b = rng.random_population(Species::Walker, 0, 1, &space);
            let child = rng.crossover(&a, &b, 1, 0).unwrap();
            prop_assert_eq!(child.len(), a.len().max(b.len()));
            prop_assert!(child.len() <= space.caps.walkers);
        }
    }
}
