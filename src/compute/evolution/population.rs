//! Population container: the set of NPC genes one species contributes to a
//! scenario.

use crate::schema::{FitnessVector, IndividualRecord, NpcGene, Species};

/// An ordered collection of genes for one species, bounded by a cap.
#[derive(Debug, Clone, PartialEq)]
pub struct Population {
    /// Identifier of the form `g{generation}_{index}`.
    pub id: String,
    /// Species every gene belongs to.
    pub species: Species,
    /// Generation this population was created in.
    pub generation: usize,
    /// The NPC genes. Order carries no meaning.
    pub genes: Vec<NpcGene>,
    /// Multi-objective fitness; `None` until evaluated.
    pub fitness: Option<FitnessVector>,
}

impl Population {
    pub fn new(species: Species, generation: usize, index: usize, genes: Vec<NpcGene>) -> Self {
        debug_assert!(genes.iter().all(|g| g.species() == species));
        Self {
            id: population_id(generation, index),
            species,
            generation,
            genes,
            fitness: None,
        }
    }

    pub fn len(&self) -> usize {
        self.genes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }

    pub fn is_evaluated(&self) -> bool {
        self.fitness.is_some()
    }

    /// Drop the fitness after the genes changed.
    pub fn invalidate(&mut self) {
        self.fitness = None;
    }

    /// Rename after being copied into a later generation.
    pub fn relabel(&mut self, generation: usize, index: usize) {
        self.generation = generation;
        self.id = population_id(generation, index);
    }

    pub fn to_record(&self) -> IndividualRecord {
        IndividualRecord {
            id: self.id.clone(),
            species: self.species,
            generation: self.generation,
            genes: self.genes.clone(),
            fitness: self.fitness,
        }
    }
}

fn population_id(generation: usize, index: usize) -> String {
    format!("g{generation}_{index}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Location, NpcKind, Route, WalkerMotion, WalkerTraits};

    fn walker() -> NpcGene {
        NpcGene {
            route: Route {
                start: Location::new(0.0, -6.0, 0.0),
                end: Location::new(0.0, 6.0, 0.0),
            },
            start_time: 0.0,
            kind: NpcKind::Walker(WalkerTraits {
                motion: WalkerMotion::Walking { max_speed: 1.4 },
            }),
        }
    }

    #[test]
    fn test_population_id_and_relabel() {
        let mut pop = Population::new(Species::Walker, 3, 7, vec![walker()]);
        assert_eq!(pop.id, "g3_7");
        assert!(!pop.is_evaluated());

        pop.fitness = Some(FitnessVector::default());
        pop.relabel(4, 1);
        assert_eq!(pop.id, "g4_1");
        assert!(pop.is_evaluated());

        pop.invalidate();
        assert!(!pop.is_evaluated());
    }

    #[test]
    fn test_to_record() {
        let pop = Population::new(Species::Walker, 0, 0, vec![walker(), walker()]);
        let record = pop.to_record();
        assert_eq!(record.genes.len(), 2);
        assert_eq!(record.species, Species::Walker);
        assert!(record.fitness.is_none());
    }
}
