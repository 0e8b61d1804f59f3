//! Pareto archive (hall of fame) of non-dominated populations.

use crate::schema::{ArchiveSnapshot, Objective, Species, species_objectives};

use super::nsga2::{crowding_distance, dominates};
use super::population::Population;

/// Running set of non-dominated populations for one species.
#[derive(Debug, Clone)]
pub struct ParetoArchive {
    species: Species,
    members: Vec<Population>,
    /// Maximum archive size; `None` keeps the whole front.
    max_size: Option<usize>,
}

impl ParetoArchive {
    /// Create a new archive.
    pub fn new(species: Species, max_size: Option<usize>) -> Self {
        Self {
            species,
            members: Vec::new(),
            max_size,
        }
    }

    fn objectives(&self) -> &'static [Objective] {
        species_objectives(self.species)
    }

    /// Merge evaluated candidates into the archive.
    ///
    /// Returns how many candidates were admitted.
    pub fn update<'a, I>(&mut self, candidates: I) -> usize
    where
        I: IntoIterator<Item = &'a Population>,
    {
        let objectives = self.objectives();
        let mut admitted = 0;

        for candidate in candidates {
            let Some(fitness) = candidate.fitness else {
                continue;
            };

            let rejected = self.members.iter().any(|m| {
                m.fitness.is_some_and(|mf| {
                    mf == fitness || dominates(&mf, &fitness, objectives)
                })
            });
            if rejected {
                continue;
            }

            self.members.retain(|m| {
                !m.fitness
                    .is_some_and(|mf| dominates(&fitness, &mf, objectives))
            });
            self.members.push(candidate.clone());
            admitted += 1;
        }

        self.trim();
        admitted
    }

    /// Drop the most crowded members until within `max_size`.
    fn trim(&mut self) {
        let Some(max_size) = self.max_size else {
            return;
        };
        let objectives = self.objectives();

        while self.members.len() > max_size {
            let fitness: Vec<_> = self.members.iter().filter_map(|m| m.fitness).collect();
            let front: Vec<usize> = (0..fitness.len()).collect();
            let crowding = crowding_distance(&fitness, &front, objectives);

            let most_crowded = crowding
                .iter()
                .enumerate()
                .min_by(|a, b| a.1.total_cmp(b.1))
                .map(|(i, _)| i);
            match most_crowded {
                Some(i) => {
                    self.members.remove(i);
                }
                None => break,
            }
        }
    }

    /// Get all members.
    pub fn members(&self) -> &[Population] {
        &self.members
    }

    /// Get archive size.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Check if archive is empty.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn species(&self) -> Species {
        self.species
    }

    /// Serializable copy of the current contents.
    pub fn snapshot(&self) -> ArchiveSnapshot {
        ArchiveSnapshot {
            species: self.species,
            members: self.members.iter().map(Population::to_record).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FitnessVector;

    fn candidate(index: usize, a: f32, b: f32) -> Population {
        let mut p = Population::new(Species::Vehicle, 0, index, Vec::new());
        p.fitness = Some(FitnessVector::new(a, b, 0.0, 0.0, 0.0));
        p
    }

    fn assert_mutually_non_dominated(archive: &ParetoArchive) {
        let objectives = species_objectives(archive.species());
        for a in archive.members() {
            for b in archive.members() {
                assert!(!dominates(
                    &a.fitness.unwrap(),
                    &b.fitness.unwrap(),
                    objectives
                ));
            }
        }
    }

    #[test]
    fn test_archive_add() {
        let mut archive = ParetoArchive::new(Species::Vehicle, None);
        let admitted = archive.update(&[candidate(0, 1.0, 4.0), candidate(1, 4.0, 1.0)]);
        assert_eq!(admitted, 2);
        assert_eq!(archive.len(), 2);
        assert_mutually_non_dominated(&archive);
    }

    #[test]
    fn test_dominated_member_evicted() {
        let mut archive = ParetoArchive::new(Species::Vehicle, None);
        archive.update(&[candidate(0, 3.0, 3.0), candidate(1, 1.0, 5.0)]);
        archive.update(&[candidate(2, 2.0, 2.0)]);

        let ids: Vec<_> = archive.members().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["g0_1", "g0_2"]);
        assert_mutually_non_dominated(&archive);
    }

    #[test]
    fn test_dominated_and_duplicate_rejected() {
        let mut archive = ParetoArchive::new(Species::Vehicle, None);
        archive.update(&[candidate(0, 1.0, 1.0)]);
        let admitted = archive.update(&[candidate(1, 2.0, 2.0), candidate(2, 1.0, 1.0)]);
        assert_eq!(admitted, 0);
        assert_eq!(archive.len(), 1);
    }

    #[test]
    fn test_unevaluated_ignored() {
        let mut archive = ParetoArchive::new(Species::Walker, None);
        let pop = Population::new(Species::Walker, 0, 0, Vec::new());
        assert_eq!(archive.update(&[pop]), 0);
        assert!(archive.is_empty());
    }

    #[test]
    fn test_archive_capacity() {
        let mut archive = ParetoArchive::new(Species::Vehicle, Some(3));
        let front: Vec<_> = (0..6)
            .map(|i| candidate(i, i as f32, 5.0 - i as f32))
            .collect();
        archive.update(&front);

        assert_eq!(archive.len(), 3);
        // Extremes carry infinite crowding distance and survive.
        let ids: Vec<_> = archive.members().iter().map(|m| m.id.clone()).collect();
        assert!(ids.contains(&"g0_0".to_string()));
        assert!(ids.contains(&"g0_5".to_string()));
    }

    #[test]
    fn test_snapshot() {
        let mut archive = ParetoArchive::new(Species::Vehicle, None);
        archive.update(&[candidate(0, 1.0, 1.0)]);
        let snapshot = archive.snapshot();
        assert_eq!(snapshot.species, Species::Vehicle);
        assert_eq!(snapshot.members.len(), 1);
        assert!(snapshot.members[0].fitness.is_some());
    }
}
