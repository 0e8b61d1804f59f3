//! ms-fuzz CLI - Run a co-evolutionary fuzzing campaign from JSON configuration.

#[cfg(feature = "dhat-heap")]
#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use ms_fuzz::{
    compute::{
        Campaign, EvaluationBridge, EvaluationWorker, FitnessSink, JsonDirSink, KinematicWorld,
        LogSink, evolution::CoEvolution,
    },
    schema::{EvolutionPhase, FuzzConfig, Location},
};

/// Cruise speed of the reference ego vehicle (m/s).
const EGO_SPEED: f32 = 8.0;

fn main() {
    #[cfg(feature = "dhat-heap")]
    let _profiler = dhat::Profiler::new_heap();

    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <config.json> [output_dir]", args[0]);
        eprintln!();
        eprintln!("Evolve adversarial NPC scenarios against the reference kinematic world.");
        eprintln!();
        eprintln!("Arguments:");
        eprintln!("  config.json  Path to fuzzing configuration file");
        eprintln!("  output_dir   Directory for per-generation JSON snapshots");
        eprintln!();
        eprintln!("Example configuration is generated with --example flag.");
        std::process::exit(1);
    }

    if args[1] == "--example" {
        print_example_config();
        return;
    }

    let config_path = PathBuf::from(&args[1]);
    let output_dir = args.get(2).map(PathBuf::from);

    // Load configuration
    let config_str = fs::read_to_string(&config_path).unwrap_or_else(|e| {
        eprintln!("Error reading config file: {}", e);
        std::process::exit(1);
    });

    let config: FuzzConfig = serde_json::from_str(&config_str).unwrap_or_else(|e| {
        eprintln!("Error parsing config: {}", e);
        std::process::exit(1);
    });

    if let Err(e) = config.validate() {
        eprintln!("Invalid config: {}", e);
        std::process::exit(1);
    }

    let (road, caps) = config.template.resolve();
    println!("ms-fuzz Co-Evolution");
    println!("====================");
    println!(
        "Segment: {}x{} m ({}), caps: {} walkers / {} vehicles",
        config.template.length, config.template.width, road, caps.walkers, caps.vehicles
    );
    println!(
        "Population: {} + {} offspring, {} generations",
        config.ga.population_size, config.ga.offspring_count, config.ga.max_generations
    );
    println!(
        "Scenario: {} ticks of {}s",
        config.drive.scenario_ticks, config.drive.fixed_delta_seconds
    );
    println!();

    let sink: Box<dyn FitnessSink> = match &output_dir {
        Some(dir) => match JsonDirSink::new(dir) {
            Ok(sink) => Box::new(sink),
            Err(e) => {
                eprintln!("Error creating output directory: {}", e);
                std::process::exit(1);
            }
        },
        None => Box::new(LogSink),
    };

    // Reference world: the ego enters the segment from behind.
    let origin = config.template.origin;
    let ego_start = Location::new(origin.x - config.template.length / 2.0, origin.y, origin.z);
    let world = Arc::new(
        KinematicWorld::new(config.drive.fixed_delta_seconds).with_ego(ego_start, EGO_SPEED),
    );

    let bridge = Arc::new(EvaluationBridge::new(config.bridge.clone()));
    let worker = EvaluationWorker::new(world, Arc::clone(&bridge), &config);

    let engine = CoEvolution::new(config, bridge)
        .unwrap_or_else(|e| {
            eprintln!("Error creating engine: {}", e);
            std::process::exit(1);
        })
        .with_sink(sink);

    println!("Running co-evolution...");
    let result = Campaign::new(engine, worker).run_with_callback(|progress| {
        if progress.phase == EvolutionPhase::Initializing {
            return;
        }
        println!(
            "  Generation {}/{}: {} evaluations, fronts {} / {}, best distance {:.2} m",
            progress.generation,
            progress.total_generations,
            progress.evaluations_completed,
            progress.walker_front_size,
            progress.vehicle_front_size,
            progress.best_min_distance
        );
    });

    let result = result.unwrap_or_else(|e| {
        eprintln!("Campaign failed: {}", e);
        std::process::exit(1);
    });

    println!();
    println!("Finished: {:?}", result.stats.stop_reason);
    println!("  Generations: {}", result.stats.generations);
    println!("  Evaluations: {}", result.stats.total_evaluations);
    println!("  Walker front: {}", result.walker_archive.members.len());
    println!("  Vehicle front: {}", result.vehicle_archive.members.len());
    if let Some(best) = result
        .vehicle_archive
        .members
        .iter()
        .chain(result.walker_archive.members.iter())
        .filter_map(|m| m.fitness.map(|f| (m, f)))
        .min_by(|a, b| a.1.min_distance().total_cmp(&b.1.min_distance()))
    {
        println!(
            "  Closest approach: {:.2} m ({} {}, {} NPCs)",
            best.1.min_distance(),
            best.0.species.label(),
            best.0.id,
            best.0.genes.len()
        );
    }
    println!("  Time: {:.2}s", result.stats.elapsed_seconds);
}

fn print_example_config() {
    let mut config = FuzzConfig::default();
    config.ga.max_generations = 10;
    config.ga.random_seed = Some(42);
    config.template.road_type = "multi-lane".to_string();

    match serde_json::to_string_pretty(&config) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing example config: {}", e),
    }
}
