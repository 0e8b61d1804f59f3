//! Non-dominated sorting and crowding-distance selection (NSGA-II).
//!
//! All objectives are minimised.

use rayon::prelude::*;

use crate::schema::{FitnessVector, Objective};

use super::population::Population;

/// True if `a` Pareto-dominates `b` over the given objectives.
pub fn dominates(a: &FitnessVector, b: &FitnessVector, objectives: &[Objective]) -> bool {
    let mut strictly_better = false;
    for &o in objectives {
        let (x, y) = (a.get(o), b.get(o));
        if x > y {
            return false;
        }
        if x < y {
            strictly_better = true;
        }
    }
    strictly_better
}

/// Split fitness vectors into Pareto fronts, best first.
///
/// Returns indices into `fitness`.
pub fn non_dominated_sort(fitness: &[FitnessVector], objectives: &[Objective]) -> Vec<Vec<usize>> {
    let n = fitness.len();

    // For each point: how many dominate it, and which it dominates.
    let relations: Vec<(usize, Vec<usize>)> = (0..n)
        .into_par_iter()
        .map(|i| {
            let mut dominated_by = 0;
            let mut dominates_set = Vec::new();
            for j in 0..n {
                if i == j {
                    continue;
                }
                if dominates(&fitness[i], &fitness[j], objectives) {
                    dominates_set.push(j);
                } else if dominates(&fitness[j], &fitness[i], objectives) {
                    dominated_by += 1;
                }
            }
            (dominated_by, dominates_set)
        })
        .collect();

    let mut counts: Vec<usize> = relations.iter().map(|(c, _)| *c).collect();
    let mut fronts = Vec::new();
    let mut current: Vec<usize> = (0..n).filter(|&i| counts[i] == 0).collect();

    while !current.is_empty() {
        let mut next = Vec::new();
        for &i in &current {
            for &j in &relations[i].1 {
                counts[j] -= 1;
                if counts[j] == 0 {
                    next.push(j);
                }
            }
        }
        next.sort_unstable();
        fronts.push(current);
        current = next;
    }

    fronts
}

/// Crowding distance of each member of one front.
///
/// Boundary points get infinite distance. The result is aligned with `front`.
pub fn crowding_distance(
    fitness: &[FitnessVector],
    front: &[usize],
    objectives: &[Objective],
) -> Vec<f32> {
    let n = front.len();
    let mut distance = vec![0.0f32; n];
    if n <= 2 {
        distance.iter_mut().for_each(|d| *d = f32::INFINITY);
        return distance;
    }

    let mut order: Vec<usize> = (0..n).collect();
    for &o in objectives {
        order.sort_by(|&a, &b| {
            fitness[front[a]]
                .get(o)
                .total_cmp(&fitness[front[b]].get(o))
        });

        let lo = fitness[front[order[0]]].get(o);
        let hi = fitness[front[order[n - 1]]].get(o);
        distance[order[0]] = f32::INFINITY;
        distance[order[n - 1]] = f32::INFINITY;

        let span = hi - lo;
        if span <= f32::EPSILON {
            continue;
        }
        for k in 1..n - 1 {
            let prev = fitness[front[order[k - 1]]].get(o);
            let next = fitness[front[order[k + 1]]].get(o);
            distance[order[k]] += (next - prev) / span;
        }
    }

    distance
}

/// Select `k` indices from `pool` by NSGA-II.
///
/// Whole fronts are taken while they fit; the last partial front is
/// truncated by descending crowding distance. Unevaluated members rank
/// after every evaluated one.
pub fn select_indices(pool: &[Population], k: usize, objectives: &[Objective]) -> Vec<usize> {
    let (evaluated, unevaluated): (Vec<usize>, Vec<usize>) =
        (0..pool.len()).partition(|&i| pool[i].fitness.is_some());

    let fitness: Vec<FitnessVector> = evaluated
        .iter()
        .filter_map(|&i| pool[i].fitness)
        .collect();

    let mut chosen = Vec::with_capacity(k.min(pool.len()));
    for front in non_dominated_sort(&fitness, objectives) {
        if chosen.len() >= k {
            break;
        }
        let room = k - chosen.len();
        if front.len() <= room {
            chosen.extend(front.iter().map(|&f| evaluated[f]));
            continue;
        }

        let crowding = crowding_distance(&fitness, &front, objectives);
        let mut ranked: Vec<usize> = (0..front.len()).collect();
        ranked.sort_by(|&a, &b| crowding[b].total_cmp(&crowding[a]));
        chosen.extend(ranked.into_iter().take(room).map(|r| evaluated[front[r]]));
    }

    let room = k.saturating_sub(chosen.len());
    chosen.extend(unevaluated.into_iter().take(room));
    chosen
}

/// Truncate `pool` to `k` members by NSGA-II selection.
pub fn select_nsga2(pool: Vec<Population>, k: usize, objectives: &[Objective]) -> Vec<Population> {
    let mut keep = vec![false; pool.len()];
    for i in select_indices(&pool, k, objectives) {
        keep[i] = true;
    }
    pool.into_iter()
        .zip(keep)
        .filter_map(|(p, keep)| keep.then_some(p))
        .collect()
}
