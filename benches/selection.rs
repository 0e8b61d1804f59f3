//! Benchmarks for NSGA-II selection and gene variation.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use ms_fuzz::{
    compute::evolution::{GeneRng, GeneSpace, Population, non_dominated_sort, select_nsga2},
    schema::{FitnessVector, Objective, Species},
};

fn scored_pool(size: usize, seed: u64) -> Vec<Population> {
    let mut rng = GeneRng::new(seed);
    let space = GeneSpace::default();
    (0..size)
        .map(|i| {
            let mut population = rng.random_population(Species::Vehicle, 0, i, &space);
            population.fitness = Some(FitnessVector::new(
                rng.unit() * 50.0,
                -rng.unit() * 5.0,
                -rng.unit() * 2.0,
                rng.unit() * 30.0,
                rng.unit(),
            ));
            population
        })
        .collect()
}

fn bench_non_dominated_sort(c: &mut Criterion) {
    let mut group = c.benchmark_group("non_dominated_sort");

    for size in [20, 50, 100, 200, 400] {
        let fitness: Vec<FitnessVector> = scored_pool(size, 7)
            .iter()
            .filter_map(|p| p.fitness)
            .collect();

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| non_dominated_sort(black_box(&fitness), &Objective::ALL));
        });
    }

    group.finish();
}

fn bench_select_nsga2(c: &mut Criterion) {
    let mut group = c.benchmark_group("select_nsga2");

    for size in [20, 50, 100, 200] {
        let pool = scored_pool(size * 2, 11);

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &k| {
            b.iter(|| select_nsga2(black_box(pool.clone()), k, &Objective::ALL));
        });
    }

    group.finish();
}

fn bench_variation(c: &mut Criterion) {
    let space = GeneSpace::default();
    let mut rng = GeneRng::new(3);
    let left = rng.random_population(Species::Vehicle, 0, 0, &space);
    let right = rng.random_population(Species::Vehicle, 0, 1, &space);

    c.bench_function("crossover", |b| {
        b.iter(|| rng.crossover(black_box(&left), black_box(&right), 1, 0))
    });

    let mut walkers = GeneRng::new(5).random_population(Species::Walker, 0, 0, &space);
    let mut rng = GeneRng::new(9);
    c.bench_function("mutate", |b| {
        b.iter(|| rng.mutate(black_box(&mut walkers), &space))
    });
}

criterion_group!(
    benches,
    bench_non_dominated_sort,
    bench_select_nsga2,
    bench_variation
);
criterion_main!(benches);
