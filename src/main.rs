use anyhow::Result;
use clap::{Parser, ValueEnum};
use log::{debug, info};
use std::time::Instant;

use megacity_traffic::{
    compute::{ComputeBackend, SimulationBackend},
    config::SimulationConfig,
    simulation::{constants::FIXED_TIMESTEP, PerformanceTracker, SimulationState, VehicleStage},
};

#[derive(Parser)]
#[command(name = "megacity-traffic")]
#[command(about = "Headless runner for the lane-occupancy traffic pipeline")]
struct Args {
    /// Simulation compute backend
    #[arg(short, long, value_enum, default_value_t = Backend::Parallel)]
    backend: Backend,

    /// Road network file
    #[arg(short, long, default_value = "network.toml")]
    network: String,

    /// Traffic settings file
    #[arg(short = 't', long, default_value = "traffic.toml")]
    settings: String,

    /// Random seed for reproducible runs, overrides the settings file
    #[arg(short, long)]
    seed: Option<u64>,

    /// Worker threads for the parallel backend
    #[arg(short = 'j', long)]
    threads: Option<usize>,

    /// Number of frames to simulate
    #[arg(short, long, default_value_t = 3600)]
    frames: u64,

    /// Frame delta in seconds
    #[arg(long, default_value_t = FIXED_TIMESTEP)]
    dt: f32,

    /// Enable verbose logging for detailed simulation progress
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum Backend {
    /// Single worker, tasks run in order
    Cpu,
    /// Rayon worker pool, independent tasks run concurrently
    Parallel,
}

fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::from_default_env()
        .filter_level(if args.verbose { log::LevelFilter::Debug } else { log::LevelFilter::Info })
        .init();
    info!("Starting Megacity traffic (headless)");

    let mut config = SimulationConfig::load_from_files(&args.network, &args.settings)?;
    if args.seed.is_some() {
        config.settings.random.seed = args.seed;
    }
    if args.threads.is_some() {
        config.settings.workers.threads = args.threads;
    }

    info!(
        "Loaded network '{}' with {} paths, {} vehicle types, {} cars max",
        config.network.network.name,
        config.network.network.paths.len(),
        config.settings.vehicles.len(),
        config.settings.simulation.max_cars
    );

    let timing_samples = config.settings.performance.timing_samples as usize;
    let threads = config.settings.worker_threads();
    let mut backend = match args.backend {
        Backend::Cpu => ComputeBackend::new_cpu(config.settings, Some(config.network))?,
        Backend::Parallel => ComputeBackend::new_parallel(config.settings, Some(config.network), threads)?,
    };

    info!("=== Simulation Configuration ===");
    info!("Compute: {} ({} workers)", backend.get_name(), backend.worker_count());
    info!("Frame delta: {:.4}s, movement step: {:.4}s", args.dt, FIXED_TIMESTEP);
    if let Some(seed) = args.seed {
        info!("Random Seed: {}", seed);
    }

    let mut state = SimulationState::new(args.dt);
    let mut tracker = PerformanceTracker::new(timing_samples);
    let started = Instant::now();

    for frame in 0..args.frames {
        tracker.start_frame();
        tracker.start_simulation();

        let report = backend.update(&mut state)?;

        tracker.end_simulation();
        tracker.end_frame();

        if report.deferred {
            debug!("Frame {}: setup pending", frame);
        }

        if frame % 60 == 59 {
            info!(
                "Frame {}: {} vehicles ({} switching lanes), avg speed {:.2}, sim {:.2}ms, {:.0} FPS",
                frame + 1,
                state.active_vehicles(),
                state.vehicles.count_in_stage(VehicleStage::SwitchingLanes),
                state.average_speed(),
                tracker.average_simulation_time().as_secs_f64() * 1000.0,
                tracker.fps()
            );
        }
    }

    let total = started.elapsed();
    info!("Simulation completed!");
    info!("Total time: {:.2}s for {} frames", total.as_secs_f64(), args.frames);
    info!("Simulated time: {:.1}s", state.time);
    info!(
        "Final vehicle count: {} active, {} spawned, {} despawned",
        state.active_vehicles(),
        state.total_spawned,
        state.total_despawned
    );
    info!("Speed distribution: {:?}", state.get_speed_distribution(8));

    Ok(())
}
